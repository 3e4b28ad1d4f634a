//! Config file location

use std::path::PathBuf;

use super::error::{ConfigError, ConfigResult};
use crate::env::{Environment, CONFIG_DIR};

/// Directory name under the platform config directory
pub const APP_DIR: &str = "sabx";
/// Profile file name
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// `SABX_CONFIG_DIR`, else `<user config dir>/sabx`
///
/// The user config dir is `~/.config` on Linux and
/// `~/Library/Application Support` on macOS.
pub fn config_dir(env: &Environment) -> ConfigResult<PathBuf> {
    if let Some(dir) = env.get(CONFIG_DIR) {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or(ConfigError::NoConfigDir)
}

/// Full path of `config.yaml`
pub fn config_path(env: &Environment) -> ConfigResult<PathBuf> {
    Ok(config_dir(env)?.join(CONFIG_FILE_NAME))
}
