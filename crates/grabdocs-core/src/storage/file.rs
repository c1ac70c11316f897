//! Plain JSON-file backend, used when the OS keychain is unavailable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use super::{StorageBackend, StorageError, StorageResult};

/// Credentials file name inside the app data directory
const CREDENTIALS_FILE: &str = "credentials.json";

/// Application name used for the data directory path
const APP_NAME: &str = "grabdocs";

pub struct FileBackend {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<data_local_dir>/grabdocs/credentials.json`
    pub fn default_location() -> StorageResult<Self> {
        let data_dir = dirs::data_local_dir().ok_or_else(|| {
            StorageError::Platform("Could not find local data directory".to_string())
        })?;
        Ok(Self::new(data_dir.join(APP_NAME).join(CREDENTIALS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> StorageResult<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| StorageError::Platform("file backend lock poisoned".to_string()))
    }

    fn load(&self) -> StorageResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).map_err(|e| {
            StorageError::Encoding(format!("Failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.guard()?;
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.guard()?;
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.guard()?;
        let mut entries = match self.load() {
            Ok(entries) => entries,
            Err(StorageError::Encoding(e)) => {
                // Unreadable file: drop it whole
                warn!(path = %self.path.display(), error = %e, "Discarding corrupted credentials file");
                std::fs::remove_file(&self.path)?;
                return Ok(true);
            }
            Err(e) => return Err(e),
        };
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        if entries.is_empty() {
            std::fs::remove_file(&self.path)?;
        } else {
            self.save(&entries)?;
        }
        Ok(true)
    }
}
