//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the configuration registry
//! - Apply the logging verbosity and keep it in sync with reloads
//! - Start the reload coordinator
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Watchdogs start last, once every group is loaded

use std::sync::Arc;
use std::time::Duration;

use crate::config::keys::CONTROLLER_VERBOSE;
use crate::config::loader::ConfigError;
use crate::config::paths::PathResolver;
use crate::config::registry::ConfigRegistry;
use crate::observability::logging::LogControl;
use crate::watch::coordinator::ReloadCoordinator;

/// A loaded registry with its reload coordinator running.
#[derive(Debug)]
pub struct ConfigService {
    registry: Arc<ConfigRegistry>,
    coordinator: ReloadCoordinator,
}

impl ConfigService {
    pub fn registry(&self) -> &Arc<ConfigRegistry> {
        &self.registry
    }

    pub fn coordinator(&self) -> &ReloadCoordinator {
        &self.coordinator
    }

    /// Stop every watchdog. Returns once no reaction can run anymore.
    pub async fn shutdown(self) {
        self.coordinator.shutdown().await;
        tracing::info!("Configuration service stopped");
    }
}

/// Load the configuration and start watching it.
///
/// Must be called inside a Tokio runtime.
pub fn bootstrap(
    resolver: &PathResolver,
    poll_interval: Duration,
    logging: Option<LogControl>,
) -> Result<ConfigService, ConfigError> {
    let registry = Arc::new(ConfigRegistry::init(resolver)?);

    if let Some(logging) = logging {
        if let Err(e) = logging.set_verbose(registry.is_verbose()) {
            tracing::warn!(error = %e, "Failed to apply log level");
        }
        registry.add_settings_listener(move |settings| {
            let verbose = settings.controller.get_bool(CONTROLLER_VERBOSE)?;
            logging.set_verbose(verbose)?;
            Ok(())
        });
    }

    let coordinator = ReloadCoordinator::start(Arc::clone(&registry), poll_interval);
    tracing::info!(version = %registry.version(), "Configuration service started");

    Ok(ConfigService { registry, coordinator })
}
