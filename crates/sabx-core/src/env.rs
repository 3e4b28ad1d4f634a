//! Snapshot of the environment variables consumed by sabx
//!
//! Every component reads environment overrides through an [`Environment`]
//! value instead of `std::env` directly, so callers decide when the process
//! environment is captured and tests can supply their own.

use std::collections::HashMap;
use std::env;

/// Endpoint override
pub const BASE_URL: &str = "SABX_BASE_URL";
/// Secret (API key) override
pub const API_KEY: &str = "SABX_API_KEY";
/// Directory holding `config.yaml`
pub const CONFIG_DIR: &str = "SABX_CONFIG_DIR";
/// Comma-separated backend allow-list
pub const KEYRING_BACKEND: &str = "SABX_KEYRING_BACKEND";
/// Generic backend allow-list, consulted after [`KEYRING_BACKEND`]
pub const GENERIC_KEYRING_BACKEND: &str = "KEYRING_BACKEND";
/// Permits the encrypted file backend
pub const ALLOW_INSECURE_STORE: &str = "SABX_ALLOW_INSECURE_STORE";
/// Passphrase for the encrypted file backend
pub const KEYRING_PASSPHRASE: &str = "SABX_KEYRING_PASSPHRASE";
/// Generic passphrase variables, consulted in order after [`KEYRING_PASSPHRASE`]
pub const GENERIC_PASSPHRASES: [&str; 2] = ["KEYRING_FILE_PASSWORD", "KEYRING_PASSWORD"];
/// Directory for the encrypted file backend
pub const KEYRING_FILE_DIR: &str = "SABX_KEYRING_FILE_DIR";
/// Log filter directive for [`crate::logging::init`]
pub const LOG: &str = "SABX_LOG";
/// Mirror log output into a debug file
pub const DEBUG: &str = "SABX_DEBUG";

const CAPTURED: [&str; 12] = [
    BASE_URL,
    API_KEY,
    CONFIG_DIR,
    KEYRING_BACKEND,
    GENERIC_KEYRING_BACKEND,
    ALLOW_INSECURE_STORE,
    KEYRING_PASSPHRASE,
    GENERIC_PASSPHRASES[0],
    GENERIC_PASSPHRASES[1],
    KEYRING_FILE_DIR,
    LOG,
    DEBUG,
];

/// An immutable view of the environment variables sabx cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// An environment with no variables set
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the current process environment
    pub fn capture() -> Self {
        let vars = CAPTURED
            .iter()
            .filter_map(|name| env::var(name).ok().map(|value| (name.to_string(), value)))
            .collect();
        Self { vars }
    }

    /// Build an environment from explicit pairs
    ///
    /// ```
    /// use sabx_core::env::{Environment, BASE_URL};
    ///
    /// let env = Environment::from_pairs([(BASE_URL, "http://nas:8080")]);
    /// assert_eq!(env.get(BASE_URL), Some("http://nas:8080"));
    /// ```
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Return a copy with one more variable set
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Trimmed value of `name`, or `None` when unset or blank
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// First non-blank value among `names`
    pub fn first_of(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.get(name))
    }

    /// Whether `name` holds a truthy toggle (`1`, `true`, `yes`, `on`)
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).map(env_enabled).unwrap_or(false)
    }

    /// Whether the encrypted file fallback has been opted into
    pub fn allow_insecure_store(&self) -> bool {
        self.flag(ALLOW_INSECURE_STORE)
    }
}

/// Interpret a boolean toggle the way shells usually spell it.
pub fn env_enabled(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
