//! The secret store: backend selection plus profile-keyed records

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use zeroize::Zeroizing;

use super::backend::{describe, resolve_allowed_backends, uses_file_backend, BackendKind};
use super::file_store::{FileBackend, PassphraseSource};
use super::keychain_store::KeychainBackend;
use super::key::{derive_key, label_for};
use super::pass_store::PassBackend;
use super::traits::{SecretBackend, SecretStoreError, SecretStoreResult};
use crate::env::{
    Environment, GENERIC_PASSPHRASES, KEYRING_FILE_DIR, KEYRING_PASSPHRASE,
};

/// Service name used to namespace every backend
pub const SERVICE_NAME: &str = "sabx";

/// How a [`SecretStore`] should be opened
///
/// Environment settings are folded in first by [`OpenOptions::from_env`];
/// the builder methods then override them.
///
/// ```
/// use sabx_core::env::Environment;
/// use sabx_core::secrets::OpenOptions;
///
/// let options = OpenOptions::from_env(&Environment::empty())
///     .allow_file_fallback(true)
///     .passphrase("hunter2");
/// assert!(options.resolved_backends().contains(&sabx_core::secrets::BackendKind::File));
/// ```
#[derive(Clone)]
pub struct OpenOptions {
    service: String,
    allow_file: bool,
    passphrase: Option<Zeroizing<String>>,
    allowed_backends: Vec<BackendKind>,
    file_dir: Option<PathBuf>,
    env: Environment,
}

impl OpenOptions {
    /// Options seeded from `env`
    pub fn from_env(env: &Environment) -> Self {
        let passphrase = env
            .get(KEYRING_PASSPHRASE)
            .map(|p| Zeroizing::new(p.to_string()));
        Self {
            service: SERVICE_NAME.to_string(),
            allow_file: env.allow_insecure_store(),
            passphrase,
            allowed_backends: Vec::new(),
            file_dir: env.get(KEYRING_FILE_DIR).map(PathBuf::from),
            env: env.clone(),
        }
    }

    /// Permit the encrypted file backend
    ///
    /// Enabling is sticky: once the environment or an earlier call has
    /// opted in, passing `false` does not revoke it.
    pub fn allow_file_fallback(mut self, enable: bool) -> Self {
        self.allow_file |= enable;
        self
    }

    /// Passphrase for the encrypted file backend; blank values are ignored
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        let passphrase = passphrase.into();
        if !passphrase.trim().is_empty() {
            self.passphrase = Some(Zeroizing::new(passphrase));
        }
        self
    }

    /// Directory for the encrypted file backend
    pub fn file_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if !dir.as_os_str().is_empty() {
            self.file_dir = Some(dir);
        }
        self
    }

    /// Explicit backend allow-list, bypassing environment and platform defaults
    pub fn allowed_backends(mut self, backends: impl IntoIterator<Item = BackendKind>) -> Self {
        self.allowed_backends = backends.into_iter().collect();
        self
    }

    /// Namespace for backend entries (defaults to [`SERVICE_NAME`])
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn allows_file_fallback(&self) -> bool {
        self.allow_file
    }

    /// The ordered backend list [`SecretStore::open`] will try
    pub fn resolved_backends(&self) -> Vec<BackendKind> {
        resolve_allowed_backends(&self.allowed_backends, &self.env, self.allow_file)
    }

    /// Passphrase source for the file backend: option, environment, then terminal
    pub fn passphrase_source(&self) -> PassphraseSource {
        if let Some(passphrase) = &self.passphrase {
            return PassphraseSource::Fixed(passphrase.clone());
        }
        match self.env.first_of(&GENERIC_PASSPHRASES) {
            Some(passphrase) => PassphraseSource::fixed(passphrase),
            None => PassphraseSource::Terminal,
        }
    }

    /// File backend directory: option, else `<config dir>/sabx/secrets`
    pub fn resolved_file_dir(&self) -> SecretStoreResult<PathBuf> {
        if let Some(dir) = &self.file_dir {
            return Ok(dir.clone());
        }
        dirs::config_dir()
            .map(|dir| dir.join(&self.service).join("secrets"))
            .ok_or_else(|| SecretStoreError::Unavailable {
                backend: BackendKind::File,
                reason: format!(
                    "no user configuration directory; set {KEYRING_FILE_DIR}"
                ),
            })
    }

    fn open_backend(&self, kind: BackendKind) -> SecretStoreResult<Box<dyn SecretBackend>> {
        match kind {
            BackendKind::File => {
                let dir = self.resolved_file_dir()?;
                Ok(Box::new(FileBackend::open(dir, self.passphrase_source())?))
            }
            BackendKind::Pass => Ok(Box::new(PassBackend::open(self.service.clone())?)),
            native => Ok(Box::new(KeychainBackend::open(native, self.service.clone())?)),
        }
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("service", &self.service)
            .field("allow_file", &self.allow_file)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("allowed_backends", &self.allowed_backends)
            .field("file_dir", &self.file_dir)
            .finish()
    }
}

/// Persists one secret per (profile, endpoint) pair in the selected backend
pub struct SecretStore {
    backend: Box<dyn SecretBackend>,
}

impl SecretStore {
    /// Resolve the backend list and open the first backend that works
    ///
    /// Fails with [`SecretStoreError::NoBackendAvailable`] when nothing
    /// could be opened and the file fallback was not permitted.
    pub fn open(options: &OpenOptions) -> SecretStoreResult<Self> {
        let backends = options.resolved_backends();
        tracing::debug!(backends = %describe(&backends), "opening secret store");

        let mut failures = Vec::new();
        for kind in &backends {
            match options.open_backend(*kind) {
                Ok(backend) => {
                    tracing::info!(backend = %kind, "secret store opened");
                    return Ok(Self { backend });
                }
                Err(err) => {
                    tracing::debug!(backend = %kind, error = %err, "backend unavailable");
                    failures.push(format!("{kind}: {err}"));
                }
            }
        }

        let reason = if failures.is_empty() {
            "no backends permitted".to_string()
        } else {
            failures.join("; ")
        };

        if uses_file_backend(&backends) {
            Err(SecretStoreError::backend(
                "keyring",
                format!("could not open any of {}: {reason}", describe(&backends)),
            ))
        } else {
            Err(SecretStoreError::NoBackendAvailable {
                tried: describe(&backends),
                reason,
            })
        }
    }

    /// Wrap an already opened backend
    pub fn with_backend(backend: impl SecretBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Name of the backend in use
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Store `secret` for `(profile, endpoint)`, replacing any previous value
    pub fn save(&self, profile: &str, endpoint: &str, secret: &str) -> SecretStoreResult<()> {
        let key = derive_key(profile, endpoint);
        tracing::debug!(backend = self.backend.name(), key = %key, "saving secret");
        self.backend.set(&key, secret.as_bytes(), &label_for(profile))
    }

    /// Load the secret for `(profile, endpoint)`
    ///
    /// Returns [`SecretStoreError::NotFound`] when nothing is stored.
    pub fn load(&self, profile: &str, endpoint: &str) -> SecretStoreResult<String> {
        let key = derive_key(profile, endpoint);
        let data = self.backend.get(&key)?;
        String::from_utf8(data).map_err(|_| {
            SecretStoreError::backend(self.backend.name(), "stored secret is not valid UTF-8")
        })
    }

    /// Remove the secret for `(profile, endpoint)`; absent records are fine
    pub fn delete(&self, profile: &str, endpoint: &str) -> SecretStoreResult<()> {
        let key = derive_key(profile, endpoint);
        match self.backend.remove(&key) {
            Err(err) if err.is_not_found() => {
                tracing::debug!(key = %key, "nothing to delete");
                Ok(())
            }
            other => other,
        }
    }
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretStore")
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// Opens a [`SecretStore`] on demand
///
/// The resolver and session operations only open a store when they
/// actually need one, so commands with explicit secrets never touch the OS
/// keyring. `allow_insecure_fallback` carries a profile's persisted policy.
pub trait SecretStoreOpener {
    fn open_store(&self, allow_insecure_fallback: bool) -> SecretStoreResult<SecretStore>;
}

impl SecretStoreOpener for OpenOptions {
    fn open_store(&self, allow_insecure_fallback: bool) -> SecretStoreResult<SecretStore> {
        SecretStore::open(&self.clone().allow_file_fallback(allow_insecure_fallback))
    }
}

/// Always hands out the same shared backend (tests and embedding)
impl<B: SecretBackend + 'static> SecretStoreOpener for Arc<B> {
    fn open_store(&self, _allow_insecure_fallback: bool) -> SecretStoreResult<SecretStore> {
        Ok(SecretStore::with_backend(Arc::clone(self)))
    }
}
