//! Resolution errors

use std::fmt;

use crate::config::ConfigError;
use crate::env::{API_KEY, BASE_URL};
use crate::secrets::SecretStoreError;

use super::connection_resolver::ValueSource;

/// The piece of a connection that could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    Endpoint,
    ApiKey,
}

impl MissingField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingField::Endpoint => "endpoint URL",
            MissingField::ApiKey => "API key",
        }
    }

    fn hint(&self) -> String {
        match self {
            MissingField::Endpoint => {
                format!("run 'sabx login', pass --base-url or set {BASE_URL}")
            }
            MissingField::ApiKey => format!("run 'sabx login', pass --api-key or set {API_KEY}"),
        }
    }
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`super::ConnectionResolver::resolve`]
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no {field} configured; {hint}")]
    NotConfigured { field: MissingField, hint: String },

    #[error("profile {0:?} not found; run 'sabx login --profile {0}' or choose an existing profile")]
    ProfileNotFound(String),

    #[error("API key not found for profile {profile:?}: {source}")]
    MissingSecret {
        profile: String,
        #[source]
        source: SecretStoreError,
    },

    #[error("invalid endpoint from {origin}: {source}")]
    InvalidEndpoint {
        origin: ValueSource,
        #[source]
        source: ConfigError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ResolveError {
    pub fn not_configured(field: MissingField) -> Self {
        Self::NotConfigured {
            field,
            hint: field.hint(),
        }
    }

    /// The missing field, for [`ResolveError::NotConfigured`]
    pub fn missing_field(&self) -> Option<MissingField> {
        match self {
            Self::NotConfigured { field, .. } => Some(*field),
            _ => None,
        }
    }
}

pub type ResolveResult<T> = Result<T, ResolveError>;
