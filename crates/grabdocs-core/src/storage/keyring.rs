use keyring::Entry;

use super::{StorageBackend, StorageError, StorageResult};

/// Keychain service name shared by every entry the app writes
const SERVICE_NAME: &str = "grabdocs-mobile";

/// Preferred backend: the OS credential store (Keychain, Credential Manager,
/// the kernel keyring on Linux) via `keyring`.
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> StorageResult<Entry> {
        Entry::new(&self.service, key)
            .map_err(|e| StorageError::Platform(format!("Failed to create keyring entry: {}", e)))
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for KeyringBackend {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::Platform(format!(
                "Failed to retrieve {} from keychain: {}",
                key, e
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| StorageError::Platform(format!("Failed to store {} in keychain: {}", key, e)))
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(StorageError::Platform(format!(
                "Failed to delete {} from keychain: {}",
                key, e
            ))),
        }
    }
}
