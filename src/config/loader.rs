//! Layered property loading from disk.
//!
//! A [`PrecedenceChain`] lists sources from lowest to highest priority.
//! Each source is read, its legacy keys are translated, and the result is
//! merged key by key over what came before.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::format::parse_settings;
use crate::config::keys::canonical_key;
use crate::config::properties::{GroupKind, PropertyGroup, RawProperties};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Parse error in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("Syntax error in {} at line {line}: {reason}", .path.display())]
    Syntax {
        path: PathBuf,
        line: usize,
        reason: &'static str,
    },

    #[error("Unsupported value for '{key}' in {}: {reason}", .path.display())]
    Unsupported {
        path: PathBuf,
        key: String,
        reason: &'static str,
    },

    #[error("Cannot create home directory {}: {source}", .path.display())]
    Home {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot determine the user home directory")]
    NoUserHome,
}

/// One input of a precedence chain.
#[derive(Debug, Clone)]
pub enum PropertySource {
    /// A settings file. A missing file contributes nothing.
    File(PathBuf),
    /// The first listed file that exists and holds at least one key.
    FirstOf(Vec<PathBuf>),
    /// In-memory pairs, e.g. synthesized facts or process overrides.
    Inline {
        name: &'static str,
        values: RawProperties,
    },
    /// Settings text compiled into the binary.
    Embedded {
        name: &'static str,
        text: &'static str,
    },
}

/// Ordered list of sources; later sources override earlier ones.
#[derive(Debug, Clone, Default)]
pub struct PrecedenceChain {
    sources: Vec<PropertySource>,
}

impl PrecedenceChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, source: PropertySource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn sources(&self) -> &[PropertySource] {
        &self.sources
    }
}

/// Merge every source of the chain into one raw map.
pub fn merge_chain(chain: &PrecedenceChain) -> Result<RawProperties, ConfigError> {
    let mut merged = RawProperties::new();
    for source in chain.sources() {
        let values = read_source(source)?;
        tracing::debug!(source = %describe(source), keys = values.len(), "Property source read");
        merged.extend(canonicalize(values));
    }
    Ok(merged)
}

/// Load one property group from a chain.
pub fn load_group(kind: GroupKind, chain: &PrecedenceChain) -> Result<PropertyGroup, ConfigError> {
    let merged = merge_chain(chain)?;
    Ok(PropertyGroup::from_raw(kind, &merged))
}

fn read_source(source: &PropertySource) -> Result<RawProperties, ConfigError> {
    match source {
        PropertySource::File(path) => Ok(read_file(path)?.unwrap_or_default()),
        PropertySource::FirstOf(paths) => {
            for path in paths {
                if let Some(values) = read_file(path)? {
                    if !values.is_empty() {
                        return Ok(values);
                    }
                }
            }
            Ok(RawProperties::new())
        }
        PropertySource::Inline { values, .. } => Ok(values.clone()),
        PropertySource::Embedded { name, text } => parse_settings(Path::new(name), text),
    }
}

fn read_file(path: &Path) -> Result<Option<RawProperties>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => parse_settings(path, &text).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn canonicalize(values: RawProperties) -> RawProperties {
    let mut out = RawProperties::new();
    // Aliases first, so a logical key in the same source takes priority.
    for (key, value) in &values {
        if let Some(logical) = canonical_key(key) {
            out.insert(logical.to_string(), value.clone());
        }
    }
    for (key, value) in values {
        if canonical_key(&key).is_none() {
            out.insert(key, value);
        }
    }
    out
}

fn describe(source: &PropertySource) -> String {
    match source {
        PropertySource::File(path) => path.display().to_string(),
        PropertySource::FirstOf(paths) => paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" | "),
        PropertySource::Inline { name, .. } | PropertySource::Embedded { name, .. } => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::keys::{CONTROLLER_PORT, DATABASE_URL};

    fn inline(pairs: &[(&str, &str)]) -> PropertySource {
        PropertySource::Inline {
            name: "test",
            values: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn test_later_source_wins_per_key() {
        let chain = PrecedenceChain::new()
            .then(inline(&[("controller.port", "100"), ("controller.ip", "10.0.0.1")]))
            .then(inline(&[("controller.port", "200")]));

        let group = load_group(GroupKind::Controller, &chain).unwrap();
        assert_eq!(group.get(CONTROLLER_PORT), Some("200"));
        assert_eq!(group.get("controller.ip"), Some("10.0.0.1"));
    }

    #[test]
    fn test_alias_in_later_source_overrides_logical_key() {
        let chain = PrecedenceChain::new()
            .then(inline(&[("controller.port", "100")]))
            .then(inline(&[("controller.controller_port", "300")]));

        let group = load_group(GroupKind::Controller, &chain).unwrap();
        assert_eq!(group.get(CONTROLLER_PORT), Some("300"));
    }

    #[test]
    fn test_logical_key_beats_alias_in_same_source() {
        let chain = PrecedenceChain::new().then(inline(&[
            ("database_url", "jdbc:old"),
            ("database.url", "jdbc:new"),
        ]));

        let group = load_group(GroupKind::Database, &chain).unwrap();
        assert_eq!(group.get(DATABASE_URL), Some("jdbc:new"));
    }

    #[test]
    fn test_missing_file_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let chain = PrecedenceChain::new()
            .then(PropertySource::File(dir.path().join("absent.conf")))
            .then(inline(&[("controller.port", "1")]));
        let merged = merge_chain(&chain).unwrap();
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_first_of_skips_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let preferred = dir.path().join("system-ex.conf");
        let fallback = dir.path().join("system.conf");
        std::fs::write(&preferred, "# nothing here\n").unwrap();
        std::fs::write(&fallback, "controller.port=7\n").unwrap();

        let chain = PrecedenceChain::new().then(PropertySource::FirstOf(vec![preferred.clone(), fallback]));
        assert_eq!(load_group(GroupKind::Controller, &chain).unwrap().get(CONTROLLER_PORT), Some("7"));

        std::fs::write(&preferred, "controller.port = 8\n").unwrap();
        assert_eq!(load_group(GroupKind::Controller, &chain).unwrap().get(CONTROLLER_PORT), Some("8"));
    }
}
