//! The process-wide configuration registry.
//!
//! # Responsibilities
//! - Resolve the roots and load every property group at startup
//! - Publish the settings groups atomically on reload
//! - Derive cross-cutting facts (cluster, dev and security mode)
//! - Hold file-backed text (announcement, policy script, templates)
//!
//! # Design Decisions
//! - Constructed once and shared through `Arc`; there is no global instance
//! - Controller, cluster and directory groups come from the same files and
//!   are swapped together as one [`SettingsSnapshot`]
//! - Cluster mode is computed at init and never re-derived: cluster
//!   topology is not hot-reloadable

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::content::{Announcement, FileCache};
use crate::config::defaults::{
    self, ANNOUNCEMENT_CONF, DATABASE_CONF, GIT_CONFIG_TEMPLATE, INTERNAL_PROPERTIES, NO_MORE_TEST_LOCK,
    POLICY_SCRIPT, SHUTDOWN_LOCK, SYSTEM_CONF, SYSTEM_EX_CONF,
};
use crate::config::keys::*;
use crate::config::loader::{load_group, merge_chain, ConfigError, PrecedenceChain, PropertySource};
use crate::config::paths::{AppNames, PathResolver, ProcessProperties, RootPath};
use crate::config::properties::{GroupKind, PropertyError, PropertyGroup, RawProperties};
use crate::watch::listeners::{ListenerError, ListenerSet};

/// Region reported when the process is not clustered.
pub const NONE_REGION: &str = "NONE";
pub const REGION_ATTR_KEY: &str = "region";
pub const SUBREGION_ATTR_KEY: &str = "subregion";

/// Settings published together on every reload of the main settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsSnapshot {
    pub controller: PropertyGroup,
    pub cluster: PropertyGroup,
    pub directory: PropertyGroup,
}

/// Host identity and region of this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeIdentity {
    pub host: String,
    /// Always holds `region` and `subregion`.
    pub region: BTreeMap<&'static str, String>,
}

pub struct ConfigRegistry {
    app: AppNames,
    home: RootPath,
    ex_home: RootPath,
    overrides: ProcessProperties,
    internal: PropertyGroup,
    database: PropertyGroup,
    settings: ArcSwap<SettingsSnapshot>,
    reload_lock: Mutex<()>,
    clustered: bool,
    announcement: ArcSwap<Announcement>,
    policy_script: FileCache,
    git_config_template: FileCache,
    listeners: ListenerSet,
}

impl ConfigRegistry {
    /// Resolve the roots and load every group.
    ///
    /// Any error here is fatal for the process.
    pub fn init(resolver: &PathResolver) -> Result<Self, ConfigError> {
        tracing::info!(app = resolver.app().name(), "Configuration is loading");

        let home = resolver.resolve_primary_root()?;
        let ex_home = resolver.resolve_extended_root();
        defaults::seed_primary_root(&home).map_err(|e| ConfigError::Io {
            path: home.path().to_path_buf(),
            source: e,
        })?;

        let overrides = resolver.properties().clone();
        let internal = load_group(GroupKind::Internal, &internal_chain(&overrides))?;
        let settings = load_settings(&home, &ex_home, &overrides)?;
        let clustered = resolve_cluster_mode(&settings.cluster);
        let announcement = Announcement::read(&home.sub_file(ANNOUNCEMENT_CONF));
        let database = load_group(GroupKind::Database, &database_chain(&home, &overrides))?;

        tracing::info!(
            home = %home.path().display(),
            ex_home = %ex_home.path().display(),
            ex_home_present = ex_home.is_present(),
            clustered,
            "Configuration loaded"
        );

        Ok(Self {
            app: resolver.app().clone(),
            policy_script: FileCache::new(home.sub_file(POLICY_SCRIPT)),
            git_config_template: FileCache::new(home.sub_file(GIT_CONFIG_TEMPLATE)),
            home,
            ex_home,
            overrides,
            internal,
            database,
            settings: ArcSwap::from_pointee(settings),
            reload_lock: Mutex::new(()),
            clustered,
            announcement: ArcSwap::from_pointee(announcement),
            listeners: ListenerSet::new(),
        })
    }

    /// Reload controller, cluster and directory settings.
    ///
    /// On failure the previously published snapshot stays in place.
    pub fn reload_settings(&self) -> Result<(), ConfigError> {
        let _guard = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match load_settings(&self.home, &self.ex_home, &self.overrides) {
            Ok(settings) => {
                self.settings.store(Arc::new(settings));
                tracing::info!("System configuration reloaded");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload system configuration, keeping current settings");
                Err(e)
            }
        }
    }

    /// Re-read the announcement file.
    pub fn reload_announcement(&self) {
        let announcement = Announcement::read(&self.home.sub_file(ANNOUNCEMENT_CONF));
        self.announcement.store(Arc::new(announcement));
    }

    pub fn app(&self) -> &AppNames {
        &self.app
    }

    pub fn home(&self) -> &RootPath {
        &self.home
    }

    pub fn ex_home(&self) -> &RootPath {
        &self.ex_home
    }

    /// Current settings. The returned snapshot never changes.
    pub fn settings(&self) -> Arc<SettingsSnapshot> {
        self.settings.load_full()
    }

    pub fn internal_properties(&self) -> &PropertyGroup {
        &self.internal
    }

    pub fn database_properties(&self) -> &PropertyGroup {
        &self.database
    }

    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    /// Register a callback run after every reload of the main settings file.
    pub fn add_settings_listener<F>(&self, listener: F)
    where
        F: Fn(&SettingsSnapshot) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.listeners.add(listener);
    }

    pub fn version(&self) -> String {
        self.internal.get_or(INTERNAL_VERSION, "UNKNOWN").to_string()
    }

    // Controller

    pub fn is_dev_mode(&self) -> bool {
        self.controller_flag(CONTROLLER_DEV_MODE)
    }

    pub fn is_security_enabled(&self) -> bool {
        !self.is_dev_mode() && self.controller_flag(CONTROLLER_SECURITY)
    }

    pub fn is_user_security_enabled(&self) -> bool {
        self.controller_flag(CONTROLLER_USER_SECURITY)
    }

    pub fn security_level(&self) -> String {
        self.settings()
            .controller
            .get_or(CONTROLLER_SECURITY_LEVEL, SECURITY_LEVEL_NORMAL)
            .to_string()
    }

    pub fn is_demo(&self) -> bool {
        self.controller_flag(CONTROLLER_DEMO_MODE)
    }

    pub fn is_plugin_supported(&self) -> bool {
        self.controller_flag(CONTROLLER_PLUGIN_SUPPORT)
    }

    pub fn is_sign_up_enabled(&self) -> bool {
        self.controller_flag(CONTROLLER_ALLOW_SIGN_UP)
    }

    pub fn is_usage_report_enabled(&self) -> bool {
        self.controller_flag(CONTROLLER_USAGE_REPORT)
    }

    pub fn is_verbose(&self) -> bool {
        self.controller_flag(CONTROLLER_VERBOSE)
    }

    pub fn is_statistics_enabled(&self) -> bool {
        self.controller_flag(CONTROLLER_ENABLE_STATISTICS)
    }

    pub fn help_url(&self) -> String {
        self.settings().controller.get_trimmed(CONTROLLER_HELP_URL)
    }

    pub fn controller_port(&self) -> Result<u16, PropertyError> {
        self.settings().controller.get_port(CONTROLLER_PORT)
    }

    pub fn monitor_port(&self) -> Result<u16, PropertyError> {
        self.settings().controller.get_port(CONTROLLER_MONITOR_PORT)
    }

    /// Time out in milliseconds between console and agent while preparing a test.
    pub fn inactive_client_timeout_ms(&self) -> Result<i64, PropertyError> {
        self.settings().controller.get_long(CONTROLLER_INACTIVE_CLIENT_TIMEOUT)
    }

    pub fn csv_separator(&self) -> &'static str {
        match self.settings().controller.get(CONTROLLER_CSV_SEPARATOR) {
            Some("tab") => "\t",
            Some("semicolon") => ";",
            _ => ",",
        }
    }

    // Cluster

    /// Cluster mode as decided at startup.
    pub fn is_clustered(&self) -> bool {
        self.clustered
    }

    pub fn cluster_mode(&self) -> String {
        self.settings().cluster.get_or(CLUSTER_MODE, CLUSTER_MODE_NONE).to_string()
    }

    /// Configured cluster member addresses.
    pub fn cluster_members(&self) -> Vec<String> {
        self.settings()
            .cluster
            .get_or(CLUSTER_MEMBERS, "")
            .split([',', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn is_invisible_region(&self) -> bool {
        let settings = self.settings();
        settings.cluster.get_bool(CLUSTER_HIDDEN_REGION).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid hidden region flag, treating as visible");
            false
        })
    }

    pub fn region(&self) -> String {
        if self.clustered {
            self.settings().cluster.get_trimmed(CLUSTER_REGION)
        } else {
            NONE_REGION.to_string()
        }
    }

    pub fn current_identity(&self) -> NodeIdentity {
        let mut region = BTreeMap::new();
        if self.clustered {
            let settings = self.settings();
            region.insert(REGION_ATTR_KEY, settings.cluster.get_trimmed(CLUSTER_REGION));
            region.insert(SUBREGION_ATTR_KEY, settings.cluster.get_trimmed(CLUSTER_SUBREGION));
            NodeIdentity {
                host: settings.cluster.get_trimmed(CLUSTER_HOST),
                region,
            }
        } else {
            region.insert(REGION_ATTR_KEY, NONE_REGION.to_string());
            region.insert(SUBREGION_ATTR_KEY, String::new());
            NodeIdentity {
                host: String::new(),
                region,
            }
        }
    }

    // File-backed content

    pub fn announcement(&self) -> Arc<Announcement> {
        self.announcement.load_full()
    }

    /// Content of the process and thread policy script.
    pub fn policy_script(&self) -> Arc<String> {
        self.policy_script.get()
    }

    pub fn invalidate_policy_script(&self) {
        self.policy_script.invalidate();
    }

    pub fn git_config_template(&self) -> Arc<String> {
        self.git_config_template.get()
    }

    /// Whether `no_more_test.lock` blocks further test executions.
    pub fn has_no_more_test_lock(&self) -> bool {
        self.ex_home.has_file(NO_MORE_TEST_LOCK)
    }

    pub fn has_shutdown_lock(&self) -> bool {
        self.ex_home.has_file(SHUTDOWN_LOCK)
    }

    fn controller_flag(&self, key: &str) -> bool {
        let settings = self.settings();
        settings.controller.get_bool(key).unwrap_or_else(|e| {
            let fallback = CONTROLLER_KEYS.default_for(key) == Some("true");
            tracing::warn!(error = %e, fallback, "Invalid controller flag, using default");
            fallback
        })
    }
}

impl std::fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("app", &self.app)
            .field("home", &self.home)
            .field("ex_home", &self.ex_home)
            .field("clustered", &self.clustered)
            .finish_non_exhaustive()
    }
}

fn overrides_source(overrides: &ProcessProperties) -> PropertySource {
    PropertySource::Inline {
        name: "process properties",
        values: overrides.values().clone(),
    }
}

fn root_fact_source(home: &RootPath) -> PropertySource {
    let mut values = RawProperties::new();
    values.insert(ROOT_HOME.to_string(), home.path().display().to_string());
    PropertySource::Inline {
        name: "root facts",
        values,
    }
}

fn internal_chain(overrides: &ProcessProperties) -> PrecedenceChain {
    PrecedenceChain::new()
        .then(PropertySource::Embedded {
            name: "internal",
            text: INTERNAL_PROPERTIES,
        })
        .then(overrides_source(overrides))
}

fn settings_chain(home: &RootPath, ex_home: &RootPath, overrides: &ProcessProperties) -> PrecedenceChain {
    let mut chain = PrecedenceChain::new()
        .then(PropertySource::File(home.sub_file(SYSTEM_CONF)))
        .then(root_fact_source(home));
    if ex_home.is_present() {
        chain = chain.then(PropertySource::FirstOf(vec![
            ex_home.sub_file(SYSTEM_EX_CONF),
            ex_home.sub_file(SYSTEM_CONF),
        ]));
    }
    chain.then(overrides_source(overrides))
}

fn database_chain(home: &RootPath, overrides: &ProcessProperties) -> PrecedenceChain {
    PrecedenceChain::new()
        .then(PropertySource::File(home.sub_file(DATABASE_CONF)))
        .then(root_fact_source(home))
        .then(overrides_source(overrides))
}

fn load_settings(home: &RootPath, ex_home: &RootPath, overrides: &ProcessProperties) -> Result<SettingsSnapshot, ConfigError> {
    let raw = merge_chain(&settings_chain(home, ex_home, overrides))?;
    let mut controller = PropertyGroup::from_raw(GroupKind::Controller, &raw);
    if controller.get_bool(CONTROLLER_DEV_MODE).unwrap_or(false) {
        for key in [
            CONTROLLER_AGENT_FORCE_UPDATE,
            CONTROLLER_ENABLE_AGENT_AUTO_APPROVAL,
            CONTROLLER_ENABLE_SCRIPT_CONSOLE,
        ] {
            controller.set(key, "true");
        }
    }
    Ok(SettingsSnapshot {
        controller,
        cluster: PropertyGroup::from_raw(GroupKind::Cluster, &raw),
        directory: PropertyGroup::from_raw(GroupKind::Directory, &raw),
    })
}

fn resolve_cluster_mode(cluster: &PropertyGroup) -> bool {
    let mode = cluster.get_or(CLUSTER_MODE, CLUSTER_MODE_NONE);
    let enabled = cluster.get_bool(CLUSTER_ENABLED).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Invalid cluster flag, treating as disabled");
        false
    });
    mode != CLUSTER_MODE_NONE || enabled
}
