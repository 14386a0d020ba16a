//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Switch the crate's log level when `controller.verbose` changes
//!
//! # Design Decisions
//! - `RUST_LOG` always wins over the settings file
//! - The filter sits behind a reload layer so it can change without a restart

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Filter directive for the given verbosity.
pub fn verbose_directive(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("warn,{CRATE_TARGET}={level}")
}

/// Handle to the installed log filter.
#[derive(Debug, Clone)]
pub struct LogControl {
    handle: reload::Handle<EnvFilter, Registry>,
    env_override: bool,
}

impl LogControl {
    /// Whether `RUST_LOG` pinned the filter at startup.
    pub fn is_env_override(&self) -> bool {
        self.env_override
    }

    /// Apply the verbosity setting. A no-op when `RUST_LOG` is set.
    pub fn set_verbose(&self, verbose: bool) -> Result<(), reload::Error> {
        if self.env_override {
            return Ok(());
        }
        self.handle.reload(EnvFilter::new(verbose_directive(verbose)))?;
        tracing::debug!(verbose, "Log level updated");
        Ok(())
    }
}

/// Install the global subscriber.
///
/// If a subscriber is already installed the returned control is detached
/// and `set_verbose` reports an error.
pub fn init_logging() -> LogControl {
    let (filter, env_override) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(verbose_directive(false)), false),
    };
    let (layer, handle) = reload::Layer::new(filter);

    if let Err(e) = tracing_subscriber::registry()
        .with(layer)
        .with(fmt::layer())
        .try_init()
    {
        tracing::warn!(error = %e, "Logging already initialized");
    }

    LogControl { handle, env_override }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_directive() {
        assert_eq!(verbose_directive(false), "warn,controller_config=info");
        assert_eq!(verbose_directive(true), "warn,controller_config=debug");
    }

    #[test]
    fn test_env_override_ignores_settings() {
        let (_, handle) = reload::Layer::<EnvFilter, Registry>::new(EnvFilter::new("info"));
        let control = LogControl {
            handle,
            env_override: true,
        };
        assert!(control.set_verbose(true).is_ok());
    }

    #[test]
    fn test_detached_control_reports_error() {
        let (layer, handle) = reload::Layer::<EnvFilter, Registry>::new(EnvFilter::new("info"));
        drop(layer);
        let control = LogControl {
            handle,
            env_override: false,
        };
        assert!(control.set_verbose(true).is_err());
    }
}
