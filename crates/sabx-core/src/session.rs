//! Login and logout
//!
//! These are the only operations that create, change or delete profiles
//! and their secret records.

use std::fmt;

use crate::config::{normalize_endpoint_url, ConfigError, Profile, ProfileStore, DEFAULT_PROFILE};
use crate::env::Environment;
use crate::secrets::{SecretStoreError, SecretStoreOpener};

/// Errors from [`login`] and [`logout`]
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("an endpoint URL is required (e.g. http://localhost:8080)")]
    MissingEndpoint,

    #[error("an API key is required")]
    MissingSecret,

    #[error("profile {0:?} not found")]
    ProfileNotFound(String),

    #[error("failed to access the secret store: {0}")]
    SecretStore(#[from] SecretStoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Credentials and options for [`login`]
#[derive(Clone, Default)]
pub struct LoginRequest {
    /// Profile to create or update (defaults to `default`)
    pub profile: Option<String>,
    pub endpoint: String,
    pub secret: String,
    /// Make this profile the default even if another one is
    pub set_default: bool,
    /// Permit the encrypted file backend for this profile
    pub allow_insecure_fallback: bool,
    /// Keep the secret in plaintext in the config file
    pub store_in_config: bool,
}

impl LoginRequest {
    pub fn new(endpoint: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            secret: secret.into(),
            ..Self::default()
        }
    }

    pub fn profile(mut self, name: impl Into<String>) -> Self {
        self.profile = Some(name.into());
        self
    }

    pub fn set_default(mut self, enable: bool) -> Self {
        self.set_default = enable;
        self
    }

    pub fn allow_insecure_fallback(mut self, enable: bool) -> Self {
        self.allow_insecure_fallback = enable;
        self
    }

    pub fn store_in_config(mut self, enable: bool) -> Self {
        self.store_in_config = enable;
        self
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("profile", &self.profile)
            .field("endpoint", &self.endpoint)
            .field("secret", &"<redacted>")
            .field("set_default", &self.set_default)
            .field("allow_insecure_fallback", &self.allow_insecure_fallback)
            .field("store_in_config", &self.store_in_config)
            .finish()
    }
}

/// What [`login`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub profile: String,
    pub endpoint: String,
    /// Backend holding the secret; `None` when it went into the config file
    pub secret_backend: Option<String>,
    pub is_default: bool,
    pub allow_insecure_fallback: bool,
    /// Things the user should be told about
    pub warnings: Vec<String>,
}

/// Which profile [`logout`] acts on
#[derive(Debug, Clone, Default)]
pub struct LogoutRequest {
    /// Profile name; the stored default (or `default`) when absent
    pub profile: Option<String>,
    /// Delete the profile entry instead of only its credentials
    pub remove_profile: bool,
}

/// What [`logout`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutOutcome {
    pub profile: String,
    pub removed_profile: bool,
    pub warnings: Vec<String>,
}

/// Store credentials for a profile and save the config
///
/// The secret is written before the config, so a failed secret write never
/// leaves behind a profile that cannot authenticate.
pub fn login(
    profiles: &ProfileStore,
    secrets: &dyn SecretStoreOpener,
    env: &Environment,
    request: &LoginRequest,
) -> SessionResult<LoginOutcome> {
    if request.endpoint.trim().is_empty() {
        return Err(SessionError::MissingEndpoint);
    }
    let endpoint = normalize_endpoint_url(&request.endpoint)?;
    let secret = request.secret.trim();
    if secret.is_empty() {
        return Err(SessionError::MissingSecret);
    }
    let name = request
        .profile
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_PROFILE)
        .to_string();
    let allow_fallback = request.allow_insecure_fallback || env.allow_insecure_store();
    let stale_endpoint = profiles
        .get_profile(&name)
        .map(|p| stored_endpoint(&p))
        .filter(|old| *old != endpoint);
    let mut warnings = Vec::new();

    let secret_backend = if request.store_in_config {
        // Best effort: a record from an earlier login would otherwise shadow
        // the inline secret.
        match secrets.open_store(allow_fallback).and_then(|store| {
            store.delete(&name, &endpoint)?;
            match stale_endpoint.as_deref() {
                Some(old) => store.delete(&name, old),
                None => Ok(()),
            }
        }) {
            Ok(()) => {}
            Err(err) if err.is_no_backend() => {
                tracing::debug!(error = %err, "no secret backend to clean up");
            }
            Err(err) => {
                tracing::warn!(profile = %name, error = %err, "could not remove stored secret");
                warnings.push(format!("unable to remove secret store entry ({err})"));
            }
        }
        warnings.push("API key stored insecurely in the config file".to_string());
        None
    } else {
        let store = secrets.open_store(allow_fallback)?;
        store.save(&name, &endpoint, secret)?;
        if let Some(old) = stale_endpoint.as_deref() {
            if let Err(err) = store.delete(&name, old) {
                tracing::warn!(profile = %name, error = %err, "could not remove secret for previous endpoint");
            }
        }
        Some(store.backend_name().to_string())
    };

    let mut profile = Profile::new(&endpoint)?.with_insecure_fallback(allow_fallback);
    if request.store_in_config {
        profile = profile.with_inline_secret(secret);
    }
    profiles.set_profile(&name, profile)?;

    let is_default = request.set_default || profiles.default_profile().is_none();
    if is_default {
        profiles.set_default_profile(&name)?;
    }
    profiles.save()?;

    if allow_fallback {
        warnings.push(
            "encrypted file fallback enabled; consider disabling it on trusted hosts".to_string(),
        );
    }
    tracing::info!(profile = %name, endpoint = %endpoint, "saved profile");

    Ok(LoginOutcome {
        is_default: is_default || profiles.default_profile().as_deref() == Some(name.as_str()),
        profile: name,
        endpoint,
        secret_backend,
        allow_insecure_fallback: allow_fallback,
        warnings,
    })
}

/// Remove a profile's credentials, and optionally the profile itself
pub fn logout(
    profiles: &ProfileStore,
    secrets: &dyn SecretStoreOpener,
    request: &LogoutRequest,
) -> SessionResult<LogoutOutcome> {
    let name = request
        .profile
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| profiles.default_profile())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

    let profile = profiles
        .get_profile(&name)
        .ok_or_else(|| SessionError::ProfileNotFound(name.clone()))?;
    let mut warnings = Vec::new();

    match secrets
        .open_store(profile.allow_insecure_fallback)
        .and_then(|store| store.delete(&name, &stored_endpoint(&profile)))
    {
        Ok(()) => {}
        // Nothing can have been stored without a backend when the secret lives inline.
        Err(err) if err.is_no_backend() && profile.inline_secret().is_some() => {
            tracing::debug!(error = %err, "no secret backend; only clearing inline secret");
            warnings.push(format!("secret store not checked ({err})"));
        }
        Err(err) => return Err(err.into()),
    }

    if request.remove_profile {
        profiles.remove_profile(&name);
    } else {
        profiles.set_profile(
            &name,
            Profile {
                inline_secret: None,
                ..profile
            },
        )?;
    }
    profiles.save()?;
    tracing::info!(profile = %name, removed = request.remove_profile, "logged out");

    Ok(LogoutOutcome {
        profile: name,
        removed_profile: request.remove_profile,
        warnings,
    })
}

// Hand-edited entries may not be canonical yet; fall back to the raw value
// so the record written at login can still be found.
fn stored_endpoint(profile: &Profile) -> String {
    normalize_endpoint_url(&profile.endpoint_url)
        .unwrap_or_else(|_| profile.endpoint_url.trim().to_string())
}
