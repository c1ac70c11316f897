//! Tracing setup for host applications.

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE_PREFIX: &str = "grabdocs.log";

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG` (e.g. `RUST_LOG=grabdocs_core=debug`) and
/// defaults to `warn`. With a `log_dir`, output goes to a daily rolling file
/// and the returned guard must be kept alive to flush it; otherwise to stderr.
/// Fails if the process already has a global subscriber.
pub fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>, TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .try_init()?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .try_init()?;
            Ok(None)
        }
    }
}
