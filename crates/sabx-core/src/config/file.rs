//! File-based profile store (YAML)
//!
//! Profiles live in `config.yaml` under the sabx config directory. The file
//! is read once, edited in memory and written back atomically on `save()`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};
use super::paths::config_path;
use super::profile::{normalize_endpoint_url, Profile};
use crate::atomic::write_atomic;
use crate::env::Environment;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Profile used when none is named explicitly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    /// Profiles by name, sorted so saves are stable
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl ConfigFile {
    /// The default pointer, if set and pointing at an existing profile
    pub fn usable_default(&self) -> Option<&str> {
        self.default_profile
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty() && self.profiles.contains_key(*name))
    }

    fn redacted(&self) -> Self {
        Self {
            default_profile: self.default_profile.clone(),
            profiles: self
                .profiles
                .iter()
                .map(|(name, profile)| (name.clone(), profile.redacted()))
                .collect(),
        }
    }
}

/// Profile collection backed by a YAML file
///
/// # Example
///
/// ```no_run
/// use sabx_core::config::{Profile, ProfileStore};
/// use sabx_core::env::Environment;
///
/// let store = ProfileStore::load(&Environment::capture())?;
/// store.set_profile("home", Profile::new("http://nas:8080")?)?;
/// store.set_default_profile("home")?;
/// store.save()?;
/// # Ok::<(), sabx_core::config::ConfigError>(())
/// ```
pub struct ProfileStore {
    path: PathBuf,
    state: RwLock<ConfigFile>,
}

impl ProfileStore {
    /// Load `config.yaml` from the configured directory
    pub fn load(env: &Environment) -> ConfigResult<Self> {
        Self::load_from(config_path(env)?)
    }

    /// Load a specific file
    ///
    /// A missing or empty file yields an empty collection. Nothing is
    /// written until [`ProfileStore::save`].
    pub fn load_from(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        let config = read_config(&path)?;
        tracing::debug!(
            path = %path.display(),
            profiles = config.profiles.len(),
            "loaded profile config"
        );
        Ok(Self {
            path,
            state: RwLock::new(config),
        })
    }

    /// Wrap an in-memory collection that saves to `path`
    pub fn with_config(path: impl Into<PathBuf>, config: ConfigFile) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(config),
        }
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the config file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Copy of the current in-memory collection
    pub fn snapshot(&self) -> ConfigFile {
        self.state.read().clone()
    }

    /// Re-read the file, discarding unsaved changes
    pub fn reload(&self) -> ConfigResult<()> {
        let config = read_config(&self.path)?;
        *self.state.write() = config;
        Ok(())
    }

    /// Write the collection atomically (file 0600, directory 0700)
    pub fn save(&self) -> ConfigResult<()> {
        let content = {
            let state = self.state.read();
            serde_yaml::to_string(&*state)?
        };
        write_atomic(&self.path, content.as_bytes())
            .map_err(|e| ConfigError::io(&self.path, e))?;
        tracing::info!(path = %self.path.display(), "saved profile config");
        Ok(())
    }

    /// Insert or replace `name`, canonicalizing its endpoint
    pub fn set_profile(&self, name: &str, mut profile: Profile) -> ConfigResult<()> {
        let name = profile_key(name)?;
        profile.endpoint_url = normalize_endpoint_url(&profile.endpoint_url)?;
        self.state.write().profiles.insert(name, profile);
        Ok(())
    }

    pub fn get_profile(&self, name: &str) -> Option<Profile> {
        self.state.read().profiles.get(name.trim()).cloned()
    }

    /// Remove `name`, clearing the default pointer if it pointed there
    pub fn remove_profile(&self, name: &str) -> Option<Profile> {
        let name = name.trim();
        let mut state = self.state.write();
        let removed = state.profiles.remove(name);
        if removed.is_some() && state.default_profile.as_deref().map(str::trim) == Some(name) {
            state.default_profile = None;
        }
        removed
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.state.read().profiles.keys().cloned().collect()
    }

    /// The default profile name, or `None` when unset or stale
    pub fn default_profile(&self) -> Option<String> {
        self.state.read().usable_default().map(str::to_string)
    }

    /// Point the default at an existing profile
    pub fn set_default_profile(&self, name: &str) -> ConfigResult<()> {
        let name = profile_key(name)?;
        let mut state = self.state.write();
        if !state.profiles.contains_key(&name) {
            return Err(ConfigError::ProfileNotFound(name));
        }
        state.default_profile = Some(name);
        Ok(())
    }

    pub fn clear_default_profile(&self) {
        self.state.write().default_profile = None;
    }

    /// Resolve the profile to use
    ///
    /// A non-blank `name_override` wins over the stored default. Without
    /// either, [`ConfigError::NoProfileConfigured`] is returned.
    pub fn active_profile(&self, name_override: Option<&str>) -> ConfigResult<(String, Profile)> {
        let state = self.state.read();
        let name = match name_override.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => state
                .usable_default()
                .map(str::to_string)
                .ok_or(ConfigError::NoProfileConfigured)?,
        };
        let profile = state
            .profiles
            .get(&name)
            .cloned()
            .ok_or_else(|| ConfigError::ProfileNotFound(name.clone()))?;
        Ok((name, profile))
    }

    /// Export the collection as JSON with inline secrets masked
    pub fn export_json(&self) -> ConfigResult<String> {
        let redacted = self.state.read().redacted();
        Ok(serde_json::to_string_pretty(&redacted)?)
    }
}

impl std::fmt::Debug for ProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileStore")
            .field("path", &self.path)
            .field("exists", &self.exists())
            .field("profiles", &self.profile_names())
            .finish()
    }
}

fn profile_key(name: &str) -> ConfigResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ConfigError::EmptyProfileName);
    }
    Ok(name.to_string())
}

fn read_config(path: &Path) -> ConfigResult<ConfigFile> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ConfigFile::default()),
        Err(e) => return Err(ConfigError::io(path, e)),
    };
    if content.trim().is_empty() {
        return Ok(ConfigFile::default());
    }

    let config: ConfigFile = serde_yaml::from_str(&content)?;
    if let Some(name) = config.default_profile.as_deref() {
        if config.usable_default().is_none() && !name.trim().is_empty() {
            tracing::warn!(default_profile = name, "default profile does not exist; ignoring it");
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomic::StagedWrite;
    use tempfile::tempdir;

    fn profile(endpoint: &str) -> Profile {
        Profile::new(endpoint).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty_and_not_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sabx").join("config.yaml");
        let store = ProfileStore::load_from(&path).unwrap();

        assert!(store.profile_names().is_empty());
        assert_eq!(store.default_profile(), None);
        assert!(!store.exists());
        assert!(!path.parent().unwrap().exists());
    }

    #[test]
    fn test_empty_file_is_empty_collection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "\n  \n").unwrap();

        let store = ProfileStore::load_from(&path).unwrap();
        assert_eq!(store.snapshot(), ConfigFile::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let store = ProfileStore::load_from(&path).unwrap();

        store.set_profile("home", profile("nas:8080/")).unwrap();
        store
            .set_profile(
                "lab",
                profile("https://lab.example.com")
                    .with_inline_secret("abc123")
                    .with_insecure_fallback(true),
            )
            .unwrap();
        store.set_default_profile("home").unwrap();
        store.save().unwrap();

        let loaded = ProfileStore::load_from(&path).unwrap();
        assert_eq!(loaded.snapshot(), store.snapshot());
        assert_eq!(loaded.profile_names(), vec!["home", "lab"]);
        assert_eq!(loaded.default_profile().as_deref(), Some("home"));
        assert_eq!(
            loaded.get_profile("home").unwrap().endpoint_url,
            "http://nas:8080"
        );
    }

    #[test]
    fn test_yaml_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let store = ProfileStore::load_from(&path).unwrap();
        store.set_profile("home", profile("http://nas:8080")).unwrap();
        store.set_default_profile("home").unwrap();
        store.save().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("default_profile: home"));
        assert!(content.contains("endpoint_url: http://nas:8080"));
        assert!(content.contains("allow_insecure_fallback: false"));
        assert!(!content.contains("inline_secret"));
    }

    #[test]
    fn test_stale_default_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "default_profile: gone\nprofiles:\n  home:\n    endpoint_url: http://nas:8080\n",
        )
        .unwrap();

        let store = ProfileStore::load_from(&path).unwrap();
        assert_eq!(store.default_profile(), None);
        assert!(matches!(
            store.active_profile(None).unwrap_err(),
            ConfigError::NoProfileConfigured
        ));
        assert_eq!(store.active_profile(Some("home")).unwrap().0, "home");
    }

    #[test]
    fn test_active_profile() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::load_from(dir.path().join("config.yaml")).unwrap();
        assert!(matches!(
            store.active_profile(None).unwrap_err(),
            ConfigError::NoProfileConfigured
        ));

        store.set_profile("home", profile("http://nas:8080")).unwrap();
        store.set_profile("lab", profile("http://lab:8080")).unwrap();
        store.set_default_profile("home").unwrap();

        assert_eq!(store.active_profile(None).unwrap().0, "home");
        assert_eq!(store.active_profile(Some("  ")).unwrap().0, "home");
        assert_eq!(store.active_profile(Some(" lab ")).unwrap().0, "lab");
        assert!(matches!(
            store.active_profile(Some("missing")).unwrap_err(),
            ConfigError::ProfileNotFound(name) if name == "missing"
        ));
    }

    #[test]
    fn test_profile_names_are_case_sensitive() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::load_from(dir.path().join("config.yaml")).unwrap();
        store.set_profile("Home", profile("http://a:1")).unwrap();
        store.set_profile("home", profile("http://b:2")).unwrap();
        assert_eq!(store.profile_names(), vec!["Home", "home"]);
    }

    #[test]
    fn test_set_profile_validates() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::load_from(dir.path().join("config.yaml")).unwrap();

        let bad = Profile {
            endpoint_url: "ftp://nas".to_string(),
            inline_secret: None,
            allow_insecure_fallback: false,
        };
        assert!(matches!(
            store.set_profile("home", bad).unwrap_err(),
            ConfigError::InvalidEndpoint { .. }
        ));
        assert!(matches!(
            store.set_profile("  ", profile("http://nas:8080")).unwrap_err(),
            ConfigError::EmptyProfileName
        ));
        assert!(matches!(
            store.set_default_profile("missing").unwrap_err(),
            ConfigError::ProfileNotFound(_)
        ));
    }

    #[test]
    fn test_remove_profile_clears_default() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::load_from(dir.path().join("config.yaml")).unwrap();
        store.set_profile("home", profile("http://nas:8080")).unwrap();
        store.set_profile("lab", profile("http://lab:8080")).unwrap();
        store.set_default_profile("home").unwrap();

        assert!(store.remove_profile("lab").is_some());
        assert_eq!(store.default_profile().as_deref(), Some("home"));

        assert!(store.remove_profile("home").is_some());
        assert_eq!(store.snapshot().default_profile, None);
        assert!(store.remove_profile("home").is_none());
    }

    #[test]
    fn test_reload_discards_unsaved_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let store = ProfileStore::load_from(&path).unwrap();
        store.set_profile("home", profile("http://nas:8080")).unwrap();
        store.save().unwrap();

        store.set_profile("lab", profile("http://lab:8080")).unwrap();
        store.reload().unwrap();
        assert_eq!(store.profile_names(), vec!["home"]);
    }

    #[test]
    fn test_interrupted_save_keeps_original() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let store = ProfileStore::load_from(&path).unwrap();
        store.set_profile("home", profile("http://nas:8080")).unwrap();
        store.save().unwrap();
        let original = fs::read(&path).unwrap();

        // A write that never reaches the rename step.
        let staged = StagedWrite::stage(&path, b"default_profile: [broken").unwrap();
        drop(staged);

        assert_eq!(fs::read(&path).unwrap(), original);
        let loaded = ProfileStore::load_from(&path).unwrap();
        assert_eq!(loaded.profile_names(), vec!["home"]);
    }

    #[test]
    fn test_readers_never_see_partial_collection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let store = ProfileStore::load_from(&path).unwrap();
        store.set_profile("p0", profile("http://host0:8080")).unwrap();
        store.set_default_profile("p0").unwrap();
        store.save().unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 1..50 {
                    let name = format!("p{i}");
                    store
                        .set_profile(&name, profile(&format!("http://host{i}:8080")))
                        .unwrap();
                    store.set_default_profile(&name).unwrap();
                    store.save().unwrap();
                }
            });

            for _ in 0..3 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let snapshot = store.snapshot();
                        let default = snapshot.usable_default().unwrap();
                        assert!(snapshot.profiles.contains_key(default));
                        for (name, p) in &snapshot.profiles {
                            let i = &name[1..];
                            assert_eq!(p.endpoint_url, format!("http://host{i}:8080"));
                        }

                        let (name, active) = store.active_profile(None).unwrap();
                        assert_eq!(active.endpoint_url, format!("http://host{}:8080", &name[1..]));

                        // The file on disk is always a complete document.
                        let on_disk = ProfileStore::load_from(&path).unwrap().snapshot();
                        assert!(on_disk.usable_default().is_some());
                    }
                });
            }
        });

        let saved = ProfileStore::load_from(&path).unwrap();
        assert_eq!(saved.profile_names().len(), 50);
        assert_eq!(saved.default_profile().as_deref(), Some("p49"));
    }

    #[test]
    fn test_export_json_redacts_inline_secret() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::load_from(dir.path().join("config.yaml")).unwrap();
        store
            .set_profile("lab", profile("http://lab:8080").with_inline_secret("abc123"))
            .unwrap();

        let json = store.export_json().unwrap();
        assert!(!json.contains("abc123"));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["profiles"]["lab"]["endpoint_url"], "http://lab:8080");
        assert_eq!(value["profiles"]["lab"]["inline_secret"], "********");
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "profiles: [not, a, map").unwrap();
        assert!(matches!(
            ProfileStore::load_from(&path).unwrap_err(),
            ConfigError::Yaml(_)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("sabx").join("config.yaml");
        let store = ProfileStore::load_from(&path).unwrap();
        store.set_profile("home", profile("http://nas:8080")).unwrap();
        store.save().unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }
}
