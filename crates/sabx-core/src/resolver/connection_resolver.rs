//! Connection resolution from overrides, environment and stored profiles
//!
//! Each field is resolved independently, highest priority first:
//! 1. Explicit overrides (command-line flags)
//! 2. Environment variables (`SABX_BASE_URL`, `SABX_API_KEY`)
//! 3. The active profile: stored endpoint, then the Secret Store record,
//!    then the profile's inline secret

use std::fmt;

use crate::config::{normalize_endpoint_url, ConfigError, Profile, ProfileStore, DEFAULT_PROFILE};
use crate::env::{Environment, API_KEY, BASE_URL};
use crate::secrets::{derive_key, SecretStoreError, SecretStoreOpener};

use super::error::{MissingField, ResolveError, ResolveResult};

/// Caller-supplied values that beat everything else
#[derive(Clone, Default)]
pub struct ConnectionOverrides {
    pub profile: Option<String>,
    pub endpoint: Option<String>,
    pub secret: Option<String>,
}

impl ConnectionOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(mut self, name: impl Into<String>) -> Self {
        self.profile = Some(name.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

impl fmt::Debug for ConnectionOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOverrides")
            .field("profile", &self.profile)
            .field("endpoint", &self.endpoint)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Explicit override
    Override,
    /// Environment variable
    Environment,
    /// The profile's stored endpoint
    Profile,
    /// The Secret Store record for the profile
    SecretStore,
    /// Plaintext secret stored on the profile
    InlineSecret,
}

impl ValueSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueSource::Override => "override",
            ValueSource::Environment => "environment",
            ValueSource::Profile => "profile",
            ValueSource::SecretStore => "secret store",
            ValueSource::InlineSecret => "inline secret",
        }
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved (profile, endpoint, secret) triple
///
/// Only constructed when both endpoint and secret are non-empty.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedConnection {
    profile: Option<String>,
    endpoint: String,
    secret: String,
    endpoint_source: ValueSource,
    secret_source: ValueSource,
}

impl ResolvedConnection {
    /// The resolved profile, if any profile was involved
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// The resolved profile name, or `default`
    pub fn profile_name(&self) -> &str {
        self.profile.as_deref().unwrap_or(DEFAULT_PROFILE)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn endpoint_source(&self) -> ValueSource {
        self.endpoint_source
    }

    pub fn secret_source(&self) -> ValueSource {
        self.secret_source
    }

    /// `(profile name, endpoint, secret)`
    pub fn into_parts(self) -> (String, String, String) {
        let profile = self.profile.unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        (profile, self.endpoint, self.secret)
    }
}

impl fmt::Debug for ResolvedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConnection")
            .field("profile", &self.profile_name())
            .field("endpoint", &self.endpoint)
            .field("endpoint_source", &self.endpoint_source)
            .field("secret", &"<redacted>")
            .field("secret_source", &self.secret_source)
            .finish()
    }
}

/// Combines overrides, the environment and stored profiles into one connection
///
/// The Secret Store is only opened when neither an override nor the
/// environment supplies the secret.
pub struct ConnectionResolver<'a> {
    profiles: &'a ProfileStore,
    secrets: &'a dyn SecretStoreOpener,
    env: &'a Environment,
}

impl<'a> ConnectionResolver<'a> {
    pub fn new(
        profiles: &'a ProfileStore,
        secrets: &'a dyn SecretStoreOpener,
        env: &'a Environment,
    ) -> Self {
        Self {
            profiles,
            secrets,
            env,
        }
    }

    /// Resolve the connection to use
    pub fn resolve(&self, overrides: &ConnectionOverrides) -> ResolveResult<ResolvedConnection> {
        let profile = self.resolve_profile(overrides.profile.as_deref())?;
        let profile_name = profile
            .as_ref()
            .map_or(DEFAULT_PROFILE, |(name, _)| name.as_str());
        let stored = profile.as_ref().map(|(_, p)| p);

        let picked = self.pick(overrides.endpoint.as_deref(), BASE_URL);

        // The file is hand-editable, so stored endpoints get the same
        // canonicalization as everything else.
        let stored_endpoint = match stored.map(|p| p.endpoint_url.trim()).filter(|e| !e.is_empty()) {
            Some(raw) => match normalize_endpoint_url(raw) {
                Ok(endpoint) => Some(endpoint),
                Err(source) if picked.is_none() => {
                    return Err(ResolveError::InvalidEndpoint {
                        origin: ValueSource::Profile,
                        source,
                    })
                }
                Err(err) => {
                    tracing::warn!(profile = profile_name, error = %err, "ignoring invalid stored endpoint");
                    None
                }
            },
            None => None,
        };

        let (endpoint, endpoint_source) = match picked {
            Some((raw, origin)) => {
                let endpoint = normalize_endpoint_url(raw)
                    .map_err(|source| ResolveError::InvalidEndpoint { origin, source })?;
                (endpoint, origin)
            }
            None => match &stored_endpoint {
                Some(endpoint) => (endpoint.clone(), ValueSource::Profile),
                None => return Err(ResolveError::not_configured(MissingField::Endpoint)),
            },
        };

        let (secret, secret_source) = match self.pick(overrides.secret.as_deref(), API_KEY) {
            Some((raw, origin)) => (raw.to_string(), origin),
            None => {
                let lookup_endpoint = stored_endpoint.as_deref().unwrap_or(&endpoint);
                self.lookup_secret(profile_name, stored, lookup_endpoint, profile.is_some())?
            }
        };

        tracing::debug!(
            profile = profile_name,
            endpoint = %endpoint,
            endpoint_source = %endpoint_source,
            secret_source = %secret_source,
            "resolved connection"
        );

        Ok(ResolvedConnection {
            profile: profile.map(|(name, _)| name),
            endpoint,
            secret,
            endpoint_source,
            secret_source,
        })
    }

    fn resolve_profile(&self, name_override: Option<&str>) -> ResolveResult<Option<(String, Profile)>> {
        match self.profiles.active_profile(name_override) {
            Ok(found) => Ok(Some(found)),
            Err(ConfigError::NoProfileConfigured) => Ok(None),
            Err(ConfigError::ProfileNotFound(name)) => Err(ResolveError::ProfileNotFound(name)),
            Err(other) => Err(other.into()),
        }
    }

    fn pick<'v>(&'v self, explicit: Option<&'v str>, var: &str) -> Option<(&'v str, ValueSource)> {
        if let Some(value) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
            return Some((value, ValueSource::Override));
        }
        self.env.get(var).map(|value| (value, ValueSource::Environment))
    }

    // Records are keyed by the profile's stored endpoint so an endpoint
    // override still finds the secret saved at login.
    fn lookup_secret(
        &self,
        profile_name: &str,
        profile: Option<&Profile>,
        lookup_endpoint: &str,
        has_profile: bool,
    ) -> ResolveResult<(String, ValueSource)> {
        let allow_file = profile.map_or(false, |p| p.allow_insecure_fallback);

        let loaded = self.secrets.open_store(allow_file).and_then(|store| {
            let secret = store.load(profile_name, lookup_endpoint)?;
            let secret = secret.trim();
            if secret.is_empty() {
                return Err(SecretStoreError::not_found(derive_key(profile_name, lookup_endpoint)));
            }
            tracing::debug!(backend = store.backend_name(), "secret loaded from store");
            Ok(secret.to_string())
        });

        match loaded {
            Ok(secret) => Ok((secret, ValueSource::SecretStore)),
            Err(err) => {
                if let Some(inline) = profile.and_then(Profile::inline_secret) {
                    tracing::debug!(error = %err, "secret store lookup failed; using inline secret");
                    return Ok((inline.to_string(), ValueSource::InlineSecret));
                }
                if !has_profile && err.is_not_found() {
                    return Err(ResolveError::not_configured(MissingField::ApiKey));
                }
                Err(ResolveError::MissingSecret {
                    profile: profile_name.to_string(),
                    source: err,
                })
            }
        }
    }
}

impl fmt::Debug for ConnectionResolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionResolver")
            .field("profiles", &self.profiles)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::Arc;

    use super::*;
    use crate::config::ConfigFile;
    use crate::secrets::{MemoryBackend, SecretStore, SecretStoreResult};

    struct Fixture {
        _dir: tempfile::TempDir,
        profiles: ProfileStore,
        backend: Arc<MemoryBackend>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let profiles = ProfileStore::with_config(dir.path().join("config.yaml"), ConfigFile::default());
        Fixture {
            _dir: dir,
            profiles,
            backend: Arc::new(MemoryBackend::new()),
        }
    }

    fn add_profile(fx: &Fixture, name: &str, endpoint: &str, secret: Option<&str>) {
        fx.profiles.set_profile(name, Profile::new(endpoint).unwrap()).unwrap();
        if let Some(secret) = secret {
            SecretStore::with_backend(Arc::clone(&fx.backend))
                .save(name, endpoint, secret)
                .unwrap();
        }
    }

    /// Opener that counts calls and always fails
    struct UnavailableOpener {
        calls: Cell<usize>,
    }

    impl SecretStoreOpener for UnavailableOpener {
        fn open_store(&self, _allow: bool) -> SecretStoreResult<SecretStore> {
            self.calls.set(self.calls.get() + 1);
            Err(SecretStoreError::NoBackendAvailable {
                tried: "secret-service".to_string(),
                reason: "dbus unreachable".to_string(),
            })
        }
    }

    #[test]
    fn test_override_endpoint_keeps_stored_secret() {
        let fx = fixture();
        add_profile(&fx, "default", "http://host:8080", Some("stored-secret"));
        fx.profiles.set_default_profile("default").unwrap();

        let env = Environment::empty();
        let resolver = ConnectionResolver::new(&fx.profiles, &fx.backend, &env);
        let conn = resolver
            .resolve(&ConnectionOverrides::new().endpoint("http://override:9090"))
            .unwrap();

        assert_eq!(conn.endpoint(), "http://override:9090");
        assert_eq!(conn.secret(), "stored-secret");
        assert_eq!(conn.endpoint_source(), ValueSource::Override);
        assert_eq!(conn.secret_source(), ValueSource::SecretStore);
        assert_eq!(conn.profile(), Some("default"));
    }

    #[test]
    fn test_empty_config_is_not_configured() {
        let fx = fixture();
        let env = Environment::empty();
        let resolver = ConnectionResolver::new(&fx.profiles, &fx.backend, &env);

        let err = resolver.resolve(&ConnectionOverrides::new()).unwrap_err();
        assert_eq!(err.missing_field(), Some(MissingField::Endpoint));
        assert!(err.to_string().contains("sabx login"));
    }

    #[test]
    fn test_environment_beats_profile_and_override_beats_environment() {
        let fx = fixture();
        add_profile(&fx, "home", "http://nas:8080", Some("stored"));
        fx.profiles.set_default_profile("home").unwrap();

        let env = Environment::from_pairs([(BASE_URL, "env-host:1234/"), (API_KEY, "env-key")]);
        let resolver = ConnectionResolver::new(&fx.profiles, &fx.backend, &env);

        let conn = resolver.resolve(&ConnectionOverrides::new()).unwrap();
        assert_eq!(conn.endpoint(), "http://env-host:1234");
        assert_eq!(conn.secret(), "env-key");
        assert_eq!(conn.endpoint_source(), ValueSource::Environment);
        assert_eq!(conn.secret_source(), ValueSource::Environment);

        let conn = resolver
            .resolve(&ConnectionOverrides::new().secret(" flag-key ").endpoint("  "))
            .unwrap();
        assert_eq!(conn.secret(), "flag-key");
        assert_eq!(conn.secret_source(), ValueSource::Override);
        assert_eq!(conn.endpoint_source(), ValueSource::Environment);
    }

    #[test]
    fn test_explicit_secret_skips_secret_store() {
        let fx = fixture();
        add_profile(&fx, "home", "http://nas:8080", None);
        fx.profiles.set_default_profile("home").unwrap();

        let opener = UnavailableOpener { calls: Cell::new(0) };
        let env = Environment::empty();
        let resolver = ConnectionResolver::new(&fx.profiles, &opener, &env);
        let conn = resolver
            .resolve(&ConnectionOverrides::new().secret("flag-key"))
            .unwrap();
        assert_eq!(conn.secret(), "flag-key");
        assert_eq!(opener.calls.get(), 0);
    }

    #[test]
    fn test_inline_secret_fallback() {
        let fx = fixture();
        fx.profiles
            .set_profile(
                "lab",
                Profile::new("http://lab:8080").unwrap().with_inline_secret("inline-key"),
            )
            .unwrap();

        let opener = UnavailableOpener { calls: Cell::new(0) };
        let env = Environment::empty();
        let resolver = ConnectionResolver::new(&fx.profiles, &opener, &env);
        let conn = resolver
            .resolve(&ConnectionOverrides::new().profile("lab"))
            .unwrap();
        assert_eq!(conn.secret(), "inline-key");
        assert_eq!(conn.secret_source(), ValueSource::InlineSecret);
        assert_eq!(opener.calls.get(), 1);
    }

    #[test]
    fn test_store_wins_over_inline_secret() {
        let fx = fixture();
        fx.profiles
            .set_profile(
                "lab",
                Profile::new("http://lab:8080").unwrap().with_inline_secret("inline-key"),
            )
            .unwrap();
        SecretStore::with_backend(Arc::clone(&fx.backend))
            .save("lab", "http://lab:8080", "store-key")
            .unwrap();

        let env = Environment::empty();
        let resolver = ConnectionResolver::new(&fx.profiles, &fx.backend, &env);
        let conn = resolver
            .resolve(&ConnectionOverrides::new().profile("lab"))
            .unwrap();
        assert_eq!(conn.secret(), "store-key");
    }

    #[test]
    fn test_missing_secret_names_profile_and_cause() {
        let fx = fixture();
        add_profile(&fx, "home", "http://nas:8080", None);
        fx.profiles.set_default_profile("home").unwrap();

        let opener = UnavailableOpener { calls: Cell::new(0) };
        let env = Environment::empty();
        let resolver = ConnectionResolver::new(&fx.profiles, &opener, &env);
        match resolver.resolve(&ConnectionOverrides::new()).unwrap_err() {
            ResolveError::MissingSecret { profile, source } => {
                assert_eq!(profile, "home");
                assert!(source.is_no_backend());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_profile_override() {
        let fx = fixture();
        add_profile(&fx, "home", "http://nas:8080", Some("k"));

        let env = Environment::empty();
        let resolver = ConnectionResolver::new(&fx.profiles, &fx.backend, &env);
        let err = resolver
            .resolve(&ConnectionOverrides::new().profile("nope"))
            .unwrap_err();
        assert!(matches!(err, ResolveError::ProfileNotFound(name) if name == "nope"));
    }

    #[test]
    fn test_no_profile_uses_default_record() {
        let fx = fixture();
        SecretStore::with_backend(Arc::clone(&fx.backend))
            .save("default", "http://nas:8080", "default-key")
            .unwrap();

        let env = Environment::from_pairs([(BASE_URL, "http://nas:8080")]);
        let resolver = ConnectionResolver::new(&fx.profiles, &fx.backend, &env);
        let conn = resolver.resolve(&ConnectionOverrides::new()).unwrap();
        assert_eq!(conn.profile(), None);
        assert_eq!(conn.profile_name(), "default");
        assert_eq!(conn.secret(), "default-key");

        let env = Environment::from_pairs([(BASE_URL, "http://other:8080")]);
        let resolver = ConnectionResolver::new(&fx.profiles, &fx.backend, &env);
        let err = resolver.resolve(&ConnectionOverrides::new()).unwrap_err();
        assert_eq!(err.missing_field(), Some(MissingField::ApiKey));
    }

    #[test]
    fn test_invalid_override_endpoint() {
        let fx = fixture();
        let env = Environment::empty();
        let resolver = ConnectionResolver::new(&fx.profiles, &fx.backend, &env);
        let err = resolver
            .resolve(&ConnectionOverrides::new().endpoint("ftp://nas").secret("k"))
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::InvalidEndpoint {
                origin: ValueSource::Override,
                ..
            }
        ));
    }

    #[test]
    fn test_hand_edited_endpoint_is_canonicalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "default_profile: home\nprofiles:\n  home:\n    endpoint_url: ' NAS:8080/ '\n",
        )
        .unwrap();
        let profiles = ProfileStore::load_from(&path).unwrap();
        let backend = Arc::new(MemoryBackend::new());
        SecretStore::with_backend(Arc::clone(&backend))
            .save("home", "http://NAS:8080", "stored")
            .unwrap();

        let env = Environment::empty();
        let conn = ConnectionResolver::new(&profiles, &backend, &env)
            .resolve(&ConnectionOverrides::new())
            .unwrap();
        assert_eq!(conn.endpoint(), "http://NAS:8080");
        assert_eq!(conn.endpoint_source(), ValueSource::Profile);
        assert_eq!(conn.secret(), "stored");
    }

    #[test]
    fn test_invalid_stored_endpoint() {
        let fx = fixture();
        fx.profiles
            .set_profile("home", Profile::new("http://nas:8080").unwrap())
            .unwrap();
        let mut config = fx.profiles.snapshot();
        config.profiles.get_mut("home").unwrap().endpoint_url = "ftp://nas".to_string();
        config.default_profile = Some("home".to_string());
        let profiles = ProfileStore::with_config(fx.profiles.path(), config);

        let env = Environment::empty();
        let resolver = ConnectionResolver::new(&profiles, &fx.backend, &env);
        let err = resolver
            .resolve(&ConnectionOverrides::new().secret("k"))
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::InvalidEndpoint {
                origin: ValueSource::Profile,
                ..
            }
        ));

        // An explicit endpoint still works around the broken entry.
        let conn = resolver
            .resolve(&ConnectionOverrides::new().endpoint("http://nas:8080").secret("k"))
            .unwrap();
        assert_eq!(conn.endpoint(), "http://nas:8080");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let fx = fixture();
        let env = Environment::empty();
        let resolver = ConnectionResolver::new(&fx.profiles, &fx.backend, &env);
        let conn = resolver
            .resolve(
                &ConnectionOverrides::new()
                    .endpoint("http://nas:8080")
                    .secret("super-secret"),
            )
            .unwrap();
        assert!(!format!("{conn:?}").contains("super-secret"));
        assert_eq!(
            conn.into_parts(),
            (
                "default".to_string(),
                "http://nas:8080".to_string(),
                "super-secret".to_string()
            )
        );
    }
}
