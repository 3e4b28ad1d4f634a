//! Configuration errors

use std::path::PathBuf;

/// Errors that can occur during configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no profile configured; run 'sabx login' to create one")]
    NoProfileConfigured,

    #[error("profile {0:?} not found")]
    ProfileNotFound(String),

    #[error("profile name must not be empty")]
    EmptyProfileName,

    #[error("invalid endpoint URL {value:?}: {reason}")]
    InvalidEndpoint { value: String, reason: String },

    #[error("cannot determine the user configuration directory; set SABX_CONFIG_DIR")]
    NoConfigDir,

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_endpoint(value: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidEndpoint {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
