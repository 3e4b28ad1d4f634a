//! Backend identifiers and allow-list resolution

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::env::{Environment, GENERIC_KEYRING_BACKEND, KEYRING_BACKEND};

/// The secret backends sabx knows how to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// macOS Keychain
    Keychain,
    /// Windows Credential Manager
    WinCred,
    /// freedesktop Secret Service (GNOME Keyring, KeePassXC, ...)
    SecretService,
    /// KDE Wallet
    KWallet,
    /// Linux kernel keyring
    KeyCtl,
    /// `pass`, the standard unix password manager
    Pass,
    /// Encrypted files on disk
    File,
}

/// Accepted spellings for each backend
static BACKEND_ALIASES: Lazy<HashMap<&'static str, BackendKind>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("keychain", BackendKind::Keychain);
    m.insert("wincred", BackendKind::WinCred);
    m.insert("secret-service", BackendKind::SecretService);
    m.insert("secretservice", BackendKind::SecretService);
    m.insert("kwallet", BackendKind::KWallet);
    m.insert("keyctl", BackendKind::KeyCtl);
    m.insert("pass", BackendKind::Pass);
    m.insert("file", BackendKind::File);
    m
});

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Keychain => "keychain",
            BackendKind::WinCred => "wincred",
            BackendKind::SecretService => "secret-service",
            BackendKind::KWallet => "kwallet",
            BackendKind::KeyCtl => "keyctl",
            BackendKind::Pass => "pass",
            BackendKind::File => "file",
        }
    }

    /// Whether this is the OS-native family (everything but `pass` and `file`)
    pub fn is_native(&self) -> bool {
        !matches!(self, BackendKind::Pass | BackendKind::File)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a backend name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown secret backend: {0}")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        BACKEND_ALIASES
            .get(key.as_str())
            .copied()
            .ok_or(UnknownBackend(key))
    }
}

/// The native backends for the OS family this binary targets, in preference order
pub fn default_backends() -> Vec<BackendKind> {
    if cfg!(target_os = "macos") {
        vec![BackendKind::Keychain]
    } else if cfg!(target_os = "windows") {
        vec![BackendKind::WinCred]
    } else {
        vec![
            BackendKind::SecretService,
            BackendKind::KWallet,
            BackendKind::KeyCtl,
            BackendKind::Pass,
        ]
    }
}

/// Parse a comma-separated allow-list, skipping unknown names
///
/// The file backend is dropped unless `allow_file` is set.
pub fn parse_backend_list(raw: &str, allow_file: bool) -> Vec<BackendKind> {
    let parsed = raw
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .filter_map(|part| match part.parse::<BackendKind>() {
            Ok(kind) => Some(kind),
            Err(err) => {
                tracing::debug!(%err, "ignoring backend in allow-list");
                None
            }
        })
        .collect();
    filter_file_backend(parsed, allow_file)
}

/// Strip [`BackendKind::File`] unless the fallback was opted into, and drop duplicates
pub fn filter_file_backend(backends: Vec<BackendKind>, allow_file: bool) -> Vec<BackendKind> {
    let mut out: Vec<BackendKind> = Vec::with_capacity(backends.len());
    for backend in backends {
        if backend == BackendKind::File && !allow_file {
            continue;
        }
        if !out.contains(&backend) {
            out.push(backend);
        }
    }
    out
}

/// Resolve the ordered list of backends to try
///
/// 1. `explicit`, if non-empty
/// 2. `SABX_KEYRING_BACKEND`, then `KEYRING_BACKEND`
/// 3. [`default_backends`], with `file` appended when permitted
///
/// The file backend never survives unless `allow_file` is true.
pub fn resolve_allowed_backends(
    explicit: &[BackendKind],
    env: &Environment,
    allow_file: bool,
) -> Vec<BackendKind> {
    if !explicit.is_empty() {
        return filter_file_backend(explicit.to_vec(), allow_file);
    }

    if let Some(raw) = env.first_of(&[KEYRING_BACKEND, GENERIC_KEYRING_BACKEND]) {
        return parse_backend_list(raw, allow_file);
    }

    let mut backends = default_backends();
    if allow_file {
        backends.push(BackendKind::File);
    }
    backends
}

/// Whether the resolved list includes the encrypted file backend
pub fn uses_file_backend(backends: &[BackendKind]) -> bool {
    backends.contains(&BackendKind::File)
}

/// Render a list of backends for messages
pub fn describe(backends: &[BackendKind]) -> String {
    if backends.is_empty() {
        return "none".to_string();
    }
    backends
        .iter()
        .map(BackendKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
