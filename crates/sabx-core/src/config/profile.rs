//! Profile records and endpoint canonicalization

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::{ConfigError, ConfigResult};

/// Placeholder shown instead of an inline secret
pub const REDACTED: &str = "********";

/// Profile name used when none is given
pub const DEFAULT_PROFILE: &str = "default";

/// Connection details for one remote instance
///
/// Older config files spelled the fields `base_url`, `api_key` and
/// `allow_insecure_store`; those names are still accepted on read.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Canonical endpoint, see [`normalize_endpoint_url`]
    #[serde(alias = "base_url")]
    pub endpoint_url: String,

    /// Plaintext secret, only present after an explicit opt-in
    #[serde(default, alias = "api_key", skip_serializing_if = "Option::is_none")]
    pub inline_secret: Option<String>,

    /// Whether the secret may live in the encrypted file backend
    #[serde(default, alias = "allow_insecure_store")]
    pub allow_insecure_fallback: bool,
}

impl Profile {
    /// Create a profile for `endpoint`, canonicalizing it
    pub fn new(endpoint: &str) -> ConfigResult<Self> {
        Ok(Self {
            endpoint_url: normalize_endpoint_url(endpoint)?,
            inline_secret: None,
            allow_insecure_fallback: false,
        })
    }

    pub fn with_inline_secret(mut self, secret: impl Into<String>) -> Self {
        self.inline_secret = Some(secret.into());
        self
    }

    pub fn with_insecure_fallback(mut self, allow: bool) -> Self {
        self.allow_insecure_fallback = allow;
        self
    }

    /// The inline secret, treating an empty string as absent
    pub fn inline_secret(&self) -> Option<&str> {
        self.inline_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Copy with the inline secret masked
    pub fn redacted(&self) -> Self {
        Self {
            inline_secret: self.inline_secret().map(|_| REDACTED.to_string()),
            ..self.clone()
        }
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("endpoint_url", &self.endpoint_url)
            .field("inline_secret", &self.inline_secret().map(|_| REDACTED))
            .field("allow_insecure_fallback", &self.allow_insecure_fallback)
            .finish()
    }
}

/// Canonicalize a user-supplied endpoint URL
///
/// Trims whitespace, defaults the scheme to `http://`, strips trailing
/// slashes and requires an absolute http(s) URL with a host.
///
/// ```
/// use sabx_core::config::normalize_endpoint_url;
///
/// assert_eq!(normalize_endpoint_url(" nas:8080/ ").unwrap(), "http://nas:8080");
/// assert!(normalize_endpoint_url("ftp://nas").is_err());
/// ```
pub fn normalize_endpoint_url(raw: &str) -> ConfigResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid_endpoint(raw, "endpoint is empty"));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let candidate = candidate.trim_end_matches('/').to_string();

    let parsed = Url::parse(&candidate).map_err(|e| ConfigError::invalid_endpoint(raw, e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::invalid_endpoint(
            raw,
            format!("unsupported scheme {:?}", parsed.scheme()),
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::invalid_endpoint(raw, "missing host"));
    }

    Ok(candidate)
}
