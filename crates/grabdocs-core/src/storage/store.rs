use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::{
    CredentialKey, FileBackend, KeyringBackend, StorageBackend, StorageError, StorageResult,
};

/// Upper bound for a single backend call.
/// Keychain prompts or a wedged secret service must not stall login/logout.
const STORAGE_OP_TIMEOUT_MS: u64 = 5000;

/// Outcome of a best-effort `clear_all`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClearReport {
    pub attempted: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Async key/value store over an ordered list of backends.
///
/// The first backend is preferred; later ones are fallbacks. Callers never
/// learn which backend answered.
pub struct CredentialStore {
    backends: Vec<Arc<dyn StorageBackend>>,
    op_timeout: Duration,
}

impl CredentialStore {
    pub fn new(preferred: Arc<dyn StorageBackend>, fallback: Arc<dyn StorageBackend>) -> Self {
        Self {
            backends: vec![preferred, fallback],
            op_timeout: Duration::from_millis(STORAGE_OP_TIMEOUT_MS),
        }
    }

    pub fn single(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backends: vec![backend],
            op_timeout: Duration::from_millis(STORAGE_OP_TIMEOUT_MS),
        }
    }

    /// OS keychain first, JSON file in the local data directory second.
    pub fn platform_default() -> StorageResult<Self> {
        let fallback = FileBackend::default_location()?;
        Ok(Self::new(Arc::new(KeyringBackend::new()), Arc::new(fallback)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Run one blocking backend call on the blocking pool, bounded by the timeout.
    async fn run<T, F>(&self, backend: &Arc<dyn StorageBackend>, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn StorageBackend) -> StorageResult<T> + Send + 'static,
    {
        let name = backend.name();
        let backend = Arc::clone(backend);
        let task = tokio::task::spawn_blocking(move || op(backend.as_ref()));
        match tokio::time::timeout(self.op_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(StorageError::Platform(format!("{} task failed: {}", name, e))),
            Err(_) => Err(StorageError::Timeout(name)),
        }
    }

    pub async fn get(&self, key: CredentialKey) -> StorageResult<Option<String>> {
        let mut answered = false;
        let mut last_error = None;

        for backend in &self.backends {
            match self.run(backend, move |b| b.get(key.as_str())).await {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => answered = true,
                Err(e) => {
                    debug!(backend = backend.name(), key = %key, error = %e, "Storage read failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(None),
        }
    }

    pub async fn set(&self, key: CredentialKey, value: &str) -> StorageResult<()> {
        let mut last_error = None;

        for (index, backend) in self.backends.iter().enumerate() {
            let owned = value.to_string();
            match self.run(backend, move |b| write_verified(b, key, &owned)).await {
                Ok(()) => {
                    debug!(backend = backend.name(), key = %key, "Stored credential");
                    if index > 0 {
                        // A value left in a preferred backend would shadow this one on read
                        self.remove_from(&self.backends[..index], key).await;
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(backend = backend.name(), key = %key, error = %e, "Storage write failed, trying next backend");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(StorageError::NoBackend))
    }

    /// Remove `key` from every backend. Succeeds if at least one backend
    /// answered; returns whether any of them held a value.
    pub async fn remove(&self, key: CredentialKey) -> StorageResult<bool> {
        let mut removed = false;
        let mut answered = false;
        let mut last_error = None;

        for backend in &self.backends {
            match self.run(backend, move |b| b.remove(key.as_str())).await {
                Ok(was_present) => {
                    answered = true;
                    removed |= was_present;
                }
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(removed),
        }
    }

    pub async fn has(&self, key: CredentialKey) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: CredentialKey) -> StorageResult<Option<T>> {
        match self.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StorageError::Encoding(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: CredentialKey, value: &T) -> StorageResult<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| StorageError::Encoding(format!("{}: {}", key, e)))?;
        self.set(key, &raw).await
    }

    /// Attempt removal of every key from every backend. Never fails; each
    /// failure is logged and counted.
    pub async fn clear_all(&self, keys: &[CredentialKey]) -> ClearReport {
        let mut report = ClearReport::default();

        for backend in &self.backends {
            for &key in keys {
                report.attempted += 1;
                match self.run(backend, move |b| b.remove(key.as_str())).await {
                    Ok(true) => {
                        report.removed += 1;
                        if key.is_legacy() {
                            debug!(backend = backend.name(), key = %key, "Removed credential left by an older release");
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        report.failed += 1;
                        warn!(backend = backend.name(), key = %key, error = %e, "Failed to clear credential");
                    }
                }
            }
        }

        debug!(
            attempted = report.attempted,
            removed = report.removed,
            failed = report.failed,
            "Credential store cleared"
        );
        report
    }

    async fn remove_from(&self, backends: &[Arc<dyn StorageBackend>], key: CredentialKey) {
        for backend in backends {
            if let Err(e) = self.run(backend, move |b| b.remove(key.as_str())).await {
                debug!(backend = backend.name(), key = %key, error = %e, "Could not remove shadowed credential");
            }
        }
    }
}

/// Write, then read the value back from the same backend. A keychain with no
/// platform store behind it accepts writes and keeps nothing.
fn write_verified(backend: &dyn StorageBackend, key: CredentialKey, value: &str) -> StorageResult<()> {
    backend.set(key.as_str(), value)?;
    match backend.get(key.as_str())? {
        Some(stored) if stored == value => Ok(()),
        _ => Err(StorageError::Platform(format!(
            "{} did not retain {}",
            backend.name(),
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use crate::test_support::{FailingBackend, ForgetfulBackend, SlowBackend};

    fn two_memory_backends() -> (CredentialStore, Arc<MemoryBackend>, Arc<MemoryBackend>) {
        let preferred = Arc::new(MemoryBackend::new());
        let fallback = Arc::new(MemoryBackend::new());
        let store = CredentialStore::new(preferred.clone(), fallback.clone());
        (store, preferred, fallback)
    }

    #[tokio::test]
    async fn test_set_targets_preferred_backend() {
        let (store, preferred, fallback) = two_memory_backends();

        store.set(CredentialKey::AuthToken, "token-1").await.unwrap();

        assert_eq!(preferred.get("auth_token").unwrap().as_deref(), Some("token-1"));
        assert!(fallback.is_empty());
        assert_eq!(store.get(CredentialKey::AuthToken).await.unwrap().as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn test_falls_back_when_preferred_unavailable() {
        let fallback = Arc::new(MemoryBackend::new());
        let store = CredentialStore::new(Arc::new(FailingBackend), fallback.clone());

        store.set(CredentialKey::User, "{\"id\":1}").await.unwrap();

        assert_eq!(fallback.get("user").unwrap().as_deref(), Some("{\"id\":1}"));
        assert_eq!(store.get(CredentialKey::User).await.unwrap().as_deref(), Some("{\"id\":1}"));
        assert!(store.remove(CredentialKey::User).await.unwrap());
        assert_eq!(store.get(CredentialKey::User).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unretained_write_routes_to_fallback() {
        let fallback = Arc::new(MemoryBackend::new());
        let store = CredentialStore::new(Arc::new(ForgetfulBackend), fallback.clone());

        store.set(CredentialKey::AuthToken, "token-1").await.unwrap();

        assert_eq!(fallback.get("auth_token").unwrap().as_deref(), Some("token-1"));
        assert_eq!(store.get(CredentialKey::AuthToken).await.unwrap().as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn test_unretained_write_without_fallback_is_an_error() {
        let store = CredentialStore::single(Arc::new(ForgetfulBackend));

        let result = store.set(CredentialKey::AuthToken, "token-1").await;
        assert!(matches!(result, Err(StorageError::Platform(_))));
    }

    #[tokio::test]
    async fn test_get_reads_fallback_when_preferred_is_empty() {
        let (store, _preferred, fallback) = two_memory_backends();
        fallback.set("session_id", "s-1").unwrap();

        assert_eq!(store.get(CredentialKey::SessionId).await.unwrap().as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_all_backends_failing_is_an_error() {
        let store = CredentialStore::new(Arc::new(FailingBackend), Arc::new(FailingBackend));

        assert!(store.get(CredentialKey::User).await.is_err());
        assert!(store.set(CredentialKey::User, "x").await.is_err());
        assert!(store.remove(CredentialKey::User).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_all_covers_every_backend() {
        let (store, preferred, fallback) = two_memory_backends();
        preferred.set("user", "a").unwrap();
        preferred.set("auth_token", "b").unwrap();
        fallback.set("user_data", "legacy").unwrap();
        fallback.set("login_data", "legacy").unwrap();
        preferred.set("remembered_username", "alice").unwrap();

        let report = store.clear_all(&CredentialKey::SESSION_KEYS).await;

        assert_eq!(report.attempted, CredentialKey::SESSION_KEYS.len() * 2);
        assert_eq!(report.removed, 4);
        assert_eq!(report.failed, 0);
        assert_eq!(preferred.len(), 1, "remembered username survives");
        assert!(fallback.is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_is_idempotent_and_tolerates_failures() {
        let fallback = Arc::new(MemoryBackend::new());
        fallback.set("auth_token", "t").unwrap();
        let store = CredentialStore::new(Arc::new(FailingBackend), fallback.clone());

        let first = store.clear_all(&CredentialKey::SESSION_KEYS).await;
        assert_eq!(first.failed, CredentialKey::SESSION_KEYS.len());
        assert_eq!(first.removed, 1);
        assert!(fallback.is_empty());

        let second = store.clear_all(&CredentialKey::SESSION_KEYS).await;
        assert_eq!(second.removed, 0);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let (store, _, _) = two_memory_backends();
        store.set_json(CredentialKey::User, &vec![1, 2, 3]).await.unwrap();
        let back: Option<Vec<i32>> = store.get_json(CredentialKey::User).await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));

        store.set(CredentialKey::User, "not json").await.unwrap();
        let bad: StorageResult<Option<Vec<i32>>> = store.get_json(CredentialKey::User).await;
        assert!(matches!(bad, Err(StorageError::Encoding(_))));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let store = CredentialStore::single(Arc::new(SlowBackend::new(Duration::from_millis(300))))
            .with_timeout(Duration::from_millis(20));

        let result = store.get(CredentialKey::User).await;
        assert!(matches!(result, Err(StorageError::Timeout("slow"))));
    }
}
