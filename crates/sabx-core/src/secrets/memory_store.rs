//! In-memory secret backend

use std::collections::HashMap;

use parking_lot::RwLock;

use super::traits::{SecretBackend, SecretStoreError, SecretStoreResult};

#[derive(Debug, Clone)]
struct MemoryItem {
    data: Vec<u8>,
    label: String,
}

/// In-memory secret backend for testing and embedding
///
/// Secrets are lost when the backend is dropped. Share one instance between
/// several stores by wrapping it in an `Arc`.
///
/// # Example
///
/// ```
/// use sabx_core::secrets::{MemoryBackend, SecretBackend};
///
/// let backend = MemoryBackend::new();
/// backend.set("profile/default/abc", b"sk-test", "sabx profile default API key").unwrap();
/// assert_eq!(backend.get("profile/default/abc").unwrap(), b"sk-test");
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    items: RwLock<HashMap<String, MemoryItem>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Label recorded for `key`, if any
    pub fn label(&self, key: &str) -> Option<String> {
        self.items.read().get(key).map(|item| item.label.clone())
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.items.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl SecretBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn set(&self, key: &str, data: &[u8], label: &str) -> SecretStoreResult<()> {
        self.items.write().insert(
            key.to_string(),
            MemoryItem {
                data: data.to_vec(),
                label: label.to_string(),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> SecretStoreResult<Vec<u8>> {
        self.items
            .read()
            .get(key)
            .map(|item| item.data.clone())
            .ok_or_else(|| SecretStoreError::not_found(key))
    }

    fn remove(&self, key: &str) -> SecretStoreResult<()> {
        self.items
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| SecretStoreError::not_found(key))
    }
}
