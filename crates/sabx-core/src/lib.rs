//! sabx Core
//!
//! Credential and connection resolution for the sabx CLI.
//! This crate decides which endpoint and API key every authenticated
//! SABnzbd request uses, and where that key is kept between runs.
//!
//! ## Components
//!
//! - `secrets`: one API key per (profile, endpoint) in the OS keyring,
//!   `pass`, or an opt-in encrypted file
//! - `config`: named profiles in `config.yaml`, saved atomically
//! - `resolver`: overrides > environment > profile, field by field
//! - `session`: `login` / `logout`
//!
//! ```rust,no_run
//! use sabx_core::{ConnectionOverrides, ConnectionResolver, Environment, OpenOptions, ProfileStore};
//!
//! let env = Environment::capture();
//! let profiles = ProfileStore::load(&env)?;
//! let secrets = OpenOptions::from_env(&env);
//!
//! let conn = ConnectionResolver::new(&profiles, &secrets, &env)
//!     .resolve(&ConnectionOverrides::new().profile("home"))?;
//! println!("{} via {}", conn.endpoint(), conn.secret_source());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod atomic;
pub mod config;
pub mod env;
pub mod logging;
pub mod resolver;
pub mod secrets;
pub mod session;

// Re-export commonly used types
pub use env::Environment;

pub use secrets::{
    derive_key, BackendKind, OpenOptions, SecretBackend, SecretStore, SecretStoreError,
    SecretStoreOpener, SecretStoreResult,
};

pub use config::{ConfigError, ConfigFile, ConfigResult, Profile, ProfileStore};

pub use resolver::{
    ConnectionOverrides, ConnectionResolver, MissingField, ResolveError, ResolveResult,
    ResolvedConnection, ValueSource,
};

pub use session::{
    login, logout, LoginOutcome, LoginRequest, LogoutOutcome, LogoutRequest, SessionError,
    SessionResult,
};
