//! Wires the file watchdogs to registry reloads.

use std::sync::Arc;
use std::time::Duration;

use crate::config::defaults::{ANNOUNCEMENT_CONF, POLICY_SCRIPT, SYSTEM_CONF};
use crate::config::registry::ConfigRegistry;
use crate::watch::watchdog::{FileWatchdog, WatchTarget, WatchdogState};

/// Owns the announcement, settings and policy script watchdogs.
pub struct ReloadCoordinator {
    watchdogs: Vec<FileWatchdog>,
}

impl ReloadCoordinator {
    /// Start all watchdogs. Must be called inside a Tokio runtime.
    pub fn start(registry: Arc<ConfigRegistry>, interval: Duration) -> Self {
        let mut watchdogs: Vec<FileWatchdog> = targets(&registry)
            .into_iter()
            .map(|target| FileWatchdog::new(target.with_interval(interval)))
            .collect();
        for watchdog in &mut watchdogs {
            watchdog.start();
        }
        tracing::info!(count = watchdogs.len(), "Reload coordinator started");
        Self { watchdogs }
    }

    pub fn states(&self) -> Vec<(String, WatchdogState)> {
        self.watchdogs
            .iter()
            .map(|w| (w.target().name().to_string(), w.state()))
            .collect()
    }

    /// Stop every watchdog and wait for each loop to exit.
    pub async fn shutdown(mut self) {
        for watchdog in &mut self.watchdogs {
            watchdog.stop().await;
        }
        tracing::info!("Reload coordinator stopped");
    }
}

fn targets(registry: &Arc<ConfigRegistry>) -> Vec<WatchTarget> {
    let home = registry.home();

    let announcement = {
        let registry = Arc::clone(registry);
        WatchTarget::new("announcement", home.sub_file(ANNOUNCEMENT_CONF), move || {
            registry.reload_announcement();
            Ok(())
        })
    };

    let settings = {
        let registry = Arc::clone(registry);
        WatchTarget::new("system", home.sub_file(SYSTEM_CONF), move || {
            registry.reload_settings()?;
            let failed = registry.listeners().notify(&registry.settings());
            if failed > 0 {
                tracing::warn!(failed, "Some settings listeners failed");
            }
            Ok(())
        })
    };

    let policy = {
        let registry = Arc::clone(registry);
        WatchTarget::new("policy", home.sub_file(POLICY_SCRIPT), move || {
            registry.invalidate_policy_script();
            Ok(())
        })
    };

    vec![announcement, settings, policy]
}

impl std::fmt::Debug for ReloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadCoordinator")
            .field("watchdogs", &self.states())
            .finish()
    }
}
