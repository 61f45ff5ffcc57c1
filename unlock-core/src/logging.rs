//! Logging setup for the unlock binary.
//!
//! Verbosity flags pick the level. A non-empty `RUST_LOG` replaces them with
//! its own directives, except under `--quiet`, which always means errors
//! only.

use crate::{Result, error::UnlockError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Maps CLI verbosity flags onto a tracing level.
fn level_for(verbose: u8, quiet: bool) -> tracing::Level {
    match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    }
}

/// Builds the event filter from the flags and the `RUST_LOG` value, if any.
fn filter_for(verbose: u8, quiet: bool, directives: Option<&str>) -> Result<EnvFilter> {
    match directives.map(str::trim) {
        Some(directives) if !quiet && !directives.is_empty() => EnvFilter::try_new(directives)
            .map_err(|e| {
                UnlockError::configuration(format!(
                    "Invalid {} directives '{}': {}",
                    EnvFilter::DEFAULT_ENV,
                    directives,
                    e
                ))
            }),
        _ => Ok(EnvFilter::default()
            .add_directive(LevelFilter::from_level(level_for(verbose, quiet)).into())),
    }
}

/// Initializes structured logging based on verbosity level.
///
/// # Arguments
/// * `verbose` - Verbosity level (0=INFO, 1=DEBUG, 2+=TRACE)
/// * `quiet` - If true, only show ERROR level logs
///
/// # Errors
/// Returns a configuration error if `RUST_LOG` cannot be parsed or a global
/// subscriber is already installed.
///
/// # Example
/// ```rust,no_run
/// use unlock_core::logging::init_logging;
///
/// init_logging(1, false).expect("Failed to initialize logging");
/// ```
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = filter_for(verbose, quiet, directives.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| UnlockError::configuration(format!("Failed to initialize logging: {}", e)))
}
