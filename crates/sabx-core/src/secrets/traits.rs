//! Core traits and types for secret storage

use std::sync::Arc;

use thiserror::Error;

use super::backend::BackendKind;
use crate::env::ALLOW_INSECURE_STORE;

/// Errors that can occur during secret store operations
#[derive(Error, Debug)]
pub enum SecretStoreError {
    /// No record under the derived key
    #[error("secret not found: {key}")]
    NotFound { key: String },

    /// None of the permitted backends could be opened
    #[error(
        "no secret backend available (tried: {tried}): {reason}; set {}=1 or rerun with \
         --allow-insecure-store to permit the encrypted file fallback",
        ALLOW_INSECURE_STORE
    )]
    NoBackendAvailable { tried: String, reason: String },

    /// A specific backend could not be opened
    #[error("{backend} backend unavailable: {reason}")]
    Unavailable { backend: BackendKind, reason: String },

    /// The backend belongs to another OS family
    #[error("{0} backend is not supported on this platform")]
    UnsupportedPlatform(BackendKind),

    /// The file backend could not obtain a passphrase
    #[error("passphrase unavailable: {0}")]
    Passphrase(String),

    /// Encryption or decryption failed (including a wrong passphrase)
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The backend reported an error
    #[error("{backend} backend error: {message}")]
    Backend { backend: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SecretStoreError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn backend(backend: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    /// Whether this is the "no record" condition (as opposed to a failure)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether no backend could be opened at all
    pub fn is_no_backend(&self) -> bool {
        matches!(self, Self::NoBackendAvailable { .. })
    }
}

pub type SecretStoreResult<T> = Result<T, SecretStoreError>;

/// A secret backend selected at open time
///
/// Implementations:
/// - `KeychainBackend`: native OS credential managers via the `keyring` crate
/// - `PassBackend`: the `pass` password manager
/// - `FileBackend`: encrypted files, opt-in only
/// - `MemoryBackend`: in-process map for tests and embedding
pub trait SecretBackend: Send + Sync {
    /// Name reported in logs and diagnostics
    fn name(&self) -> &str;

    /// Write or overwrite `key`
    ///
    /// `label` is a display string for backends that show items in a UI;
    /// backends without label support ignore it.
    fn set(&self, key: &str, data: &[u8], label: &str) -> SecretStoreResult<()>;

    /// Read `key`, returning [`SecretStoreError::NotFound`] when absent
    fn get(&self, key: &str) -> SecretStoreResult<Vec<u8>>;

    /// Remove `key`, returning [`SecretStoreError::NotFound`] when absent
    fn remove(&self, key: &str) -> SecretStoreResult<()>;
}

impl<T: SecretBackend + ?Sized> SecretBackend for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn set(&self, key: &str, data: &[u8], label: &str) -> SecretStoreResult<()> {
        (**self).set(key, data, label)
    }

    fn get(&self, key: &str) -> SecretStoreResult<Vec<u8>> {
        (**self).get(key)
    }

    fn remove(&self, key: &str) -> SecretStoreResult<()> {
        (**self).remove(key)
    }
}

impl<T: SecretBackend + ?Sized> SecretBackend for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn set(&self, key: &str, data: &[u8], label: &str) -> SecretStoreResult<()> {
        (**self).set(key, data, label)
    }

    fn get(&self, key: &str) -> SecretStoreResult<Vec<u8>> {
        (**self).get(key)
    }

    fn remove(&self, key: &str) -> SecretStoreResult<()> {
        (**self).remove(key)
    }
}
