//! Secret storage abstractions and implementations
//!
//! This module provides a pluggable secret storage system with:
//! - `SecretBackend` trait implemented by every storage mechanism
//! - Built-in backends: `KeychainBackend`, `PassBackend`, `FileBackend`, `MemoryBackend`
//! - `SecretStore`, which picks one backend at open time and addresses
//!   records by a key derived from `(profile, endpoint)`

mod backend;
mod file_store;
mod key;
mod keychain_store;
mod memory_store;
mod pass_store;
mod store;
mod traits;

pub use backend::{
    default_backends, describe, filter_file_backend, parse_backend_list,
    resolve_allowed_backends, uses_file_backend, BackendKind, UnknownBackend,
};
pub use file_store::{FileBackend, PassphraseSource};
pub use key::{derive_key, label_for, normalize_endpoint, sanitize_profile};
pub use keychain_store::KeychainBackend;
pub use memory_store::MemoryBackend;
pub use pass_store::PassBackend;
pub use store::{OpenOptions, SecretStore, SecretStoreOpener, SERVICE_NAME};
pub use traits::{SecretBackend, SecretStoreError, SecretStoreResult};
