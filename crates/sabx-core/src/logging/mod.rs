//! Log output for sabx
//!
//! Library code only emits `tracing` events. Binaries call [`init`] once to
//! print them on stderr, filtered by `SABX_LOG` (default `warn`). With
//! `SABX_DEBUG` set, everything at debug level is also appended to a file
//! in the temp directory, which helps when stderr is not visible.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::env::{Environment, DEBUG, LOG};

/// Filter used when `SABX_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "warn";
/// Filter used when `SABX_DEBUG` is set and `SABX_LOG` is not
pub const DEBUG_FILTER: &str = "debug";

const DEBUG_LOG_FILE: &str = "sabx-debug.log";

/// Location of the debug log file
pub fn debug_log_path() -> PathBuf {
    std::env::temp_dir().join(DEBUG_LOG_FILE)
}

/// Build the stderr filter from `SABX_LOG`
pub fn filter_from_env(env: &Environment) -> EnvFilter {
    let fallback = if env.flag(DEBUG) {
        DEBUG_FILTER
    } else {
        DEFAULT_FILTER
    };
    match env.get(LOG) {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|err| {
            eprintln!("sabx: ignoring invalid {LOG} value {directives:?}: {err}");
            EnvFilter::new(fallback)
        }),
        None => EnvFilter::new(fallback),
    }
}

/// Install the global subscriber
///
/// Fails if a subscriber is already installed, so calling it twice is
/// harmless.
pub fn init(env: &Environment) -> Result<(), TryInitError> {
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(filter_from_env(env));

    let file_layer = if env.flag(DEBUG) {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(debug_log_path())
            .ok()
            .map(|file| {
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new(DEBUG_FILTER))
            })
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    tracing::debug!(debug_file = env.flag(DEBUG), "logging initialized");
    Ok(())
}
