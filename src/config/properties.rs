//! Property groups and typed getters.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::config::keys::{
    KeyMapper, CLUSTER_KEYS, CONTROLLER_KEYS, DATABASE_KEYS, DIRECTORY_KEYS, INTERNAL_KEYS,
};

/// Raw merged key/value pairs, before they are split into groups.
pub type RawProperties = BTreeMap<String, String>;

/// Identity of a property group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Internal,
    Controller,
    Database,
    Cluster,
    Directory,
}

impl GroupKind {
    pub fn name(&self) -> &'static str {
        match self {
            GroupKind::Internal => "internal",
            GroupKind::Controller => "controller",
            GroupKind::Database => "database",
            GroupKind::Cluster => "cluster",
            GroupKind::Directory => "directory",
        }
    }

    /// Key table of the group.
    pub fn mapper(&self) -> &'static KeyMapper {
        match self {
            GroupKind::Internal => &INTERNAL_KEYS,
            GroupKind::Controller => &CONTROLLER_KEYS,
            GroupKind::Database => &DATABASE_KEYS,
            GroupKind::Cluster => &CLUSTER_KEYS,
            GroupKind::Directory => &DIRECTORY_KEYS,
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised by typed getters.
///
/// These are read-time errors and never affect the published group.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("{group} property '{key}' is not set")]
    Missing { group: GroupKind, key: String },

    #[error("{group} property '{key}' has invalid {expected} value '{value}'")]
    Invalid {
        group: GroupKind,
        key: String,
        value: String,
        expected: &'static str,
    },
}

/// One named, immutable set of settings.
///
/// Groups are never edited after publication; a reload builds a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyGroup {
    kind: GroupKind,
    values: BTreeMap<String, String>,
}

impl PropertyGroup {
    /// Build a group from merged raw properties, keeping only the keys the
    /// group owns.
    pub fn from_raw(kind: GroupKind, raw: &RawProperties) -> Self {
        let mapper = kind.mapper();
        let mut values = BTreeMap::new();
        for (key, value) in raw {
            if let Some(logical) = mapper.translate(key) {
                values.insert(logical.to_string(), value.clone());
            }
        }
        Self { kind, values }
    }

    pub fn empty(kind: GroupKind) -> Self {
        Self {
            kind,
            values: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether a source explicitly provided the key.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Value of `key`, falling back to the key table default.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .or_else(|| self.kind.mapper().default_for(key))
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Trimmed value, empty when unset.
    pub fn get_trimmed(&self, key: &str) -> String {
        self.get(key).map(str::trim).unwrap_or_default().to_string()
    }

    pub fn get_int(&self, key: &str) -> Result<i32, PropertyError> {
        self.parse_number(key, "integer")
    }

    pub fn get_long(&self, key: &str) -> Result<i64, PropertyError> {
        self.parse_number(key, "long")
    }

    pub fn get_port(&self, key: &str) -> Result<u16, PropertyError> {
        self.parse_number(key, "port")
    }

    /// Boolean value. An unset key reads as `false`.
    pub fn get_bool(&self, key: &str) -> Result<bool, PropertyError> {
        let Some(value) = self.get(key) else {
            return Ok(false);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" | "" => Ok(false),
            _ => Err(self.invalid(key, value, "boolean")),
        }
    }

    pub(crate) fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    fn parse_number<T: std::str::FromStr>(&self, key: &str, expected: &'static str) -> Result<T, PropertyError> {
        let value = self.get(key).ok_or_else(|| PropertyError::Missing {
            group: self.kind,
            key: key.to_string(),
        })?;
        value.trim().parse().map_err(|_| self.invalid(key, value, expected))
    }

    fn invalid(&self, key: &str, value: &str, expected: &'static str) -> PropertyError {
        PropertyError::Invalid {
            group: self.kind,
            key: key.to_string(),
            value: value.to_string(),
            expected,
        }
    }
}
