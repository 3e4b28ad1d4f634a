//! Profile configuration
//!
//! - `Profile`: endpoint, optional inline secret and fallback policy
//! - `ProfileStore`: YAML-backed profile collection (`<config dir>/sabx/config.yaml`)

mod error;
mod file;
mod paths;
mod profile;

pub use error::{ConfigError, ConfigResult};
pub use file::{ConfigFile, ProfileStore};
pub use paths::{config_dir, config_path, APP_DIR, CONFIG_FILE_NAME};
pub use profile::{normalize_endpoint_url, Profile, DEFAULT_PROFILE, REDACTED};
