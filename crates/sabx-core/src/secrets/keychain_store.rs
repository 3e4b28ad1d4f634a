//! Native OS credential managers
//!
//! Uses the `keyring` crate for:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KWallet) and the kernel keyring

use keyring::Entry;

use super::backend::BackendKind;
use super::traits::{SecretBackend, SecretStoreError, SecretStoreResult};

/// Account used to check whether the store answers at all
const PROBE_KEY: &str = "__sabx_availability_check__";

/// Secret backend backed by a native credential manager
///
/// Entries are namespaced by service name; with service `sabx` and a
/// derived key `profile/default/<digest>` the OS store shows an item for
/// service `sabx`, account `profile/default/<digest>`.
///
/// Secret Service items (GNOME Keyring, KWallet) carry the label passed to
/// [`SecretBackend::set`]. Keychain, Credential Manager and the kernel
/// keyring have no per-item label in `keyring`, so it is dropped there.
#[derive(Debug, Clone)]
pub struct KeychainBackend {
    kind: BackendKind,
    service: String,
}

impl KeychainBackend {
    /// Open `kind` under `service`, probing the store once
    ///
    /// The probe may trigger an OS unlock prompt. A failed probe is
    /// reported, never retried.
    pub fn open(kind: BackendKind, service: impl Into<String>) -> SecretStoreResult<Self> {
        if !kind.is_native() {
            return Err(SecretStoreError::Unavailable {
                backend: kind,
                reason: "not a native credential manager".to_string(),
            });
        }
        if !supported_on_this_platform(kind) {
            return Err(SecretStoreError::UnsupportedPlatform(kind));
        }

        let backend = Self {
            kind,
            service: service.into(),
        };
        backend.probe()?;
        Ok(backend)
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    fn probe(&self) -> SecretStoreResult<()> {
        tracing::debug!(backend = %self.kind, service = %self.service, "probing native keyring");
        match self.entry(PROBE_KEY, None)?.get_secret() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(keyring::Error::Ambiguous(_)) => Ok(()),
            Err(e) => {
                tracing::debug!(backend = %self.kind, error = %e, "native keyring unavailable");
                Err(SecretStoreError::Unavailable {
                    backend: self.kind,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn entry(&self, key: &str, label: Option<&str>) -> SecretStoreResult<Entry> {
        build_entry(self.kind, &self.service, key, label).map_err(|e| SecretStoreError::Unavailable {
            backend: self.kind,
            reason: format!("failed to create keyring entry: {e}"),
        })
    }

    fn map_error(&self, key: &str, err: keyring::Error) -> SecretStoreError {
        match err {
            keyring::Error::NoEntry => SecretStoreError::not_found(key),
            other => SecretStoreError::backend(self.kind.as_str(), other),
        }
    }
}

fn supported_on_this_platform(kind: BackendKind) -> bool {
    match kind {
        BackendKind::Keychain => cfg!(target_os = "macos"),
        BackendKind::WinCred => cfg!(target_os = "windows"),
        BackendKind::SecretService | BackendKind::KWallet | BackendKind::KeyCtl => {
            cfg!(target_os = "linux")
        }
        BackendKind::Pass | BackendKind::File => false,
    }
}

// KWallet implements the Secret Service API, so both go through the same
// credential type.
#[cfg(target_os = "linux")]
fn build_entry(
    kind: BackendKind,
    service: &str,
    key: &str,
    label: Option<&str>,
) -> keyring::Result<Entry> {
    use keyring::keyutils::KeyutilsCredential;

    match kind {
        BackendKind::KeyCtl => {
            let credential = KeyutilsCredential::new_with_target(None, service, key)?;
            Ok(Entry::new_with_credential(Box::new(credential)))
        }
        _ => {
            let credential = secret_service_credential(service, key, label)?;
            Ok(Entry::new_with_credential(Box::new(credential)))
        }
    }
}

#[cfg(target_os = "linux")]
fn secret_service_credential(
    service: &str,
    key: &str,
    label: Option<&str>,
) -> keyring::Result<keyring::secret_service::SsCredential> {
    let mut credential = keyring::secret_service::SsCredential::new_with_target(None, service, key)?;
    if let Some(label) = label.map(str::trim).filter(|l| !l.is_empty()) {
        credential.label = label.to_string();
    }
    Ok(credential)
}

#[cfg(not(target_os = "linux"))]
fn build_entry(
    _kind: BackendKind,
    service: &str,
    key: &str,
    _label: Option<&str>,
) -> keyring::Result<Entry> {
    Entry::new(service, key)
}

impl SecretBackend for KeychainBackend {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn set(&self, key: &str, data: &[u8], label: &str) -> SecretStoreResult<()> {
        tracing::debug!(backend = %self.kind, key, "writing keyring entry");
        self.entry(key, Some(label))?
            .set_secret(data)
            .map_err(|e| self.map_error(key, e))
    }

    fn get(&self, key: &str) -> SecretStoreResult<Vec<u8>> {
        tracing::debug!(backend = %self.kind, key, "reading keyring entry");
        self.entry(key, None)?
            .get_secret()
            .map_err(|e| self.map_error(key, e))
    }

    fn remove(&self, key: &str) -> SecretStoreResult<()> {
        tracing::debug!(backend = %self.kind, key, "removing keyring entry");
        self.entry(key, None)?
            .delete_credential()
            .map_err(|e| self.map_error(key, e))
    }
}
