//! Key translation tables.
//!
//! Every property group owns a fixed table mapping the logical key that the
//! rest of the process reads to its default value and to the legacy names it
//! may carry on disk. Raw keys are translated once, when a group is built,
//! so readers never deal with on-disk naming.

/// One logical key of a property group.
#[derive(Debug, Clone, Copy)]
pub struct KeySpec {
    /// Stable logical key.
    pub key: &'static str,
    /// Value used when no source provides the key.
    pub default: Option<&'static str>,
    /// Legacy on-disk names translated to `key`.
    pub aliases: &'static [&'static str],
}

const fn key(key: &'static str, default: Option<&'static str>, aliases: &'static [&'static str]) -> KeySpec {
    KeySpec { key, default, aliases }
}

/// Translation table for one group.
#[derive(Debug)]
pub struct KeyMapper {
    /// Key prefixes owned by the group. Raw keys outside them are ignored.
    pub namespaces: &'static [&'static str],
    pub specs: &'static [KeySpec],
}

impl KeyMapper {
    /// Translate a raw key to its logical name.
    ///
    /// Returns `None` when the key belongs to another group.
    pub fn translate<'a>(&self, raw: &'a str) -> Option<&'a str> {
        for spec in self.specs {
            if spec.aliases.contains(&raw) {
                return Some(spec.key);
            }
        }
        if self.namespaces.iter().any(|ns| raw.starts_with(ns)) {
            return Some(raw);
        }
        None
    }

    pub fn default_for(&self, key: &str) -> Option<&'static str> {
        self.specs.iter().find(|s| s.key == key).and_then(|s| s.default)
    }
}

/// Synthesized fact holding the primary root directory.
pub const ROOT_HOME: &str = "root.home";

// Controller settings.
pub const CONTROLLER_PORT: &str = "controller.port";
pub const CONTROLLER_MONITOR_PORT: &str = "controller.monitor_port";
pub const CONTROLLER_IP: &str = "controller.ip";
pub const CONTROLLER_DEV_MODE: &str = "controller.dev_mode";
pub const CONTROLLER_SECURITY: &str = "controller.security";
pub const CONTROLLER_SECURITY_LEVEL: &str = "controller.security_level";
pub const CONTROLLER_USER_SECURITY: &str = "controller.user_security";
pub const CONTROLLER_DEMO_MODE: &str = "controller.demo_mode";
pub const CONTROLLER_PLUGIN_SUPPORT: &str = "controller.plugin_support";
pub const CONTROLLER_ALLOW_SIGN_UP: &str = "controller.allow_sign_up";
pub const CONTROLLER_USAGE_REPORT: &str = "controller.usage_report";
pub const CONTROLLER_VERBOSE: &str = "controller.verbose";
pub const CONTROLLER_HELP_URL: &str = "controller.help_url";
pub const CONTROLLER_INACTIVE_CLIENT_TIMEOUT: &str = "controller.inactive_client_timeout";
pub const CONTROLLER_ENABLE_STATISTICS: &str = "controller.enable_statistics";
pub const CONTROLLER_CSV_SEPARATOR: &str = "controller.csv_separator";
pub const CONTROLLER_AGENT_FORCE_UPDATE: &str = "controller.agent_force_update";
pub const CONTROLLER_ENABLE_AGENT_AUTO_APPROVAL: &str = "controller.enable_agent_auto_approval";
pub const CONTROLLER_ENABLE_SCRIPT_CONSOLE: &str = "controller.enable_script_console";

pub const SECURITY_LEVEL_NORMAL: &str = "normal";

pub static CONTROLLER_KEYS: KeyMapper = KeyMapper {
    namespaces: &["controller.", "root."],
    specs: &[
        key(CONTROLLER_PORT, Some("16001"), &["controller.controller_port"]),
        key(CONTROLLER_MONITOR_PORT, Some("13243"), &["monitor.listen.port"]),
        key(CONTROLLER_IP, Some(""), &["ngrinder.controller.ip"]),
        key(CONTROLLER_DEV_MODE, Some("false"), &["testmode", "controller.is_dev_mode"]),
        key(CONTROLLER_SECURITY, Some("false"), &["security"]),
        key(CONTROLLER_SECURITY_LEVEL, Some(SECURITY_LEVEL_NORMAL), &[]),
        key(CONTROLLER_USER_SECURITY, Some("false"), &["user.security"]),
        key(CONTROLLER_DEMO_MODE, Some("false"), &["demo"]),
        key(CONTROLLER_PLUGIN_SUPPORT, Some("true"), &["pluginsupport"]),
        key(CONTROLLER_ALLOW_SIGN_UP, Some("false"), &["signup.enabled"]),
        key(CONTROLLER_USAGE_REPORT, Some("true"), &["usage.report"]),
        key(CONTROLLER_VERBOSE, Some("false"), &["verbose"]),
        key(CONTROLLER_HELP_URL, Some("https://github.com/naver/ngrinder/wiki"), &["ngrinder.help.url"]),
        key(CONTROLLER_INACTIVE_CLIENT_TIMEOUT, Some("600000"), &[]),
        key(CONTROLLER_ENABLE_STATISTICS, Some("true"), &[]),
        key(CONTROLLER_CSV_SEPARATOR, Some("comma"), &[]),
        key(CONTROLLER_AGENT_FORCE_UPDATE, Some("false"), &[]),
        key(CONTROLLER_ENABLE_AGENT_AUTO_APPROVAL, Some("true"), &[]),
        key(CONTROLLER_ENABLE_SCRIPT_CONSOLE, Some("false"), &[]),
    ],
};

// Cluster settings.
pub const CLUSTER_ENABLED: &str = "cluster.enabled";
pub const CLUSTER_MODE: &str = "cluster.mode";
pub const CLUSTER_MEMBERS: &str = "cluster.members";
pub const CLUSTER_HOST: &str = "cluster.host";
pub const CLUSTER_REGION: &str = "cluster.region";
pub const CLUSTER_SUBREGION: &str = "cluster.subregion";
pub const CLUSTER_HIDDEN_REGION: &str = "cluster.hidden_region";

pub const CLUSTER_MODE_NONE: &str = "none";

pub static CLUSTER_KEYS: KeyMapper = KeyMapper {
    namespaces: &["cluster."],
    specs: &[
        key(CLUSTER_ENABLED, Some("false"), &["cluster.enable"]),
        key(CLUSTER_MODE, Some(CLUSTER_MODE_NONE), &[]),
        key(CLUSTER_MEMBERS, Some(""), &["cluster.uris", "ngrinder.cluster.uris"]),
        key(CLUSTER_HOST, Some(""), &["cluster.host_ip"]),
        key(CLUSTER_REGION, Some(""), &["ngrinder.region"]),
        key(CLUSTER_SUBREGION, Some(""), &[]),
        key(CLUSTER_HIDDEN_REGION, Some("false"), &[]),
    ],
};

// Directory service (LDAP) settings.
pub const LDAP_ENABLED: &str = "ldap.enabled";
pub const LDAP_SERVER: &str = "ldap.server";
pub const LDAP_PORT: &str = "ldap.port";
pub const LDAP_BASE_DN: &str = "ldap.base_dn";
pub const LDAP_MANAGER_DN: &str = "ldap.manager_dn";
pub const LDAP_MANAGER_PASSWORD: &str = "ldap.manager_password";
pub const LDAP_USER_FILTER: &str = "ldap.user_filter";

pub static DIRECTORY_KEYS: KeyMapper = KeyMapper {
    namespaces: &["ldap."],
    specs: &[
        key(LDAP_ENABLED, Some("false"), &[]),
        key(LDAP_SERVER, None, &["ldap.url"]),
        key(LDAP_PORT, Some("389"), &[]),
        key(LDAP_BASE_DN, None, &[]),
        key(LDAP_MANAGER_DN, None, &[]),
        key(LDAP_MANAGER_PASSWORD, None, &[]),
        key(LDAP_USER_FILTER, Some("(CN={userId})"), &[]),
    ],
};

// Database settings.
pub const DATABASE_TYPE: &str = "database.type";
pub const DATABASE_URL: &str = "database.url";
pub const DATABASE_USERNAME: &str = "database.username";
pub const DATABASE_PASSWORD: &str = "database.password";
pub const DATABASE_UNIT_TEST: &str = "database.unit_test";

pub static DATABASE_KEYS: KeyMapper = KeyMapper {
    namespaces: &["database.", "root."],
    specs: &[
        key(DATABASE_TYPE, Some("h2"), &["database_type"]),
        key(DATABASE_URL, None, &["database_url"]),
        key(DATABASE_USERNAME, Some("admin"), &["database_username"]),
        key(DATABASE_PASSWORD, Some("admin"), &["database_password"]),
        key(DATABASE_UNIT_TEST, Some("false"), &[]),
    ],
};

// Internal, not user modifiable.
pub const INTERNAL_VERSION: &str = "internal.version";

pub static INTERNAL_KEYS: KeyMapper = KeyMapper {
    namespaces: &["internal."],
    specs: &[key(INTERNAL_VERSION, Some("UNKNOWN"), &["ngrinder.version"])],
};

static ALL_KEYS: [&KeyMapper; 5] = [
    &INTERNAL_KEYS,
    &CONTROLLER_KEYS,
    &CLUSTER_KEYS,
    &DIRECTORY_KEYS,
    &DATABASE_KEYS,
];

/// Resolve a legacy alias from any group to its logical key.
pub fn canonical_key(raw: &str) -> Option<&'static str> {
    ALL_KEYS
        .iter()
        .flat_map(|mapper| mapper.specs.iter())
        .find(|spec| spec.aliases.contains(&raw))
        .map(|spec| spec.key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_translates_to_logical_key() {
        assert_eq!(CONTROLLER_KEYS.translate("controller.controller_port"), Some(CONTROLLER_PORT));
        assert_eq!(CLUSTER_KEYS.translate("cluster.uris"), Some(CLUSTER_MEMBERS));
        assert_eq!(CONTROLLER_KEYS.translate("verbose"), Some(CONTROLLER_VERBOSE));
    }

    #[test]
    fn test_foreign_namespace_is_rejected() {
        assert_eq!(CONTROLLER_KEYS.translate("cluster.mode"), None);
        assert_eq!(CLUSTER_KEYS.translate("controller.port"), None);
        assert_eq!(CONTROLLER_KEYS.translate("controller.custom_thing"), Some("controller.custom_thing"));
    }

    #[test]
    fn test_canonical_key_spans_groups() {
        assert_eq!(canonical_key("database_url"), Some(DATABASE_URL));
        assert_eq!(canonical_key("ldap.url"), Some(LDAP_SERVER));
        assert_eq!(canonical_key("controller.port"), None);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(CONTROLLER_KEYS.default_for(CONTROLLER_SECURITY_LEVEL), Some("normal"));
        assert_eq!(DIRECTORY_KEYS.default_for(LDAP_SERVER), None);
        assert_eq!(DIRECTORY_KEYS.default_for("ldap.unknown"), None);
    }
}
