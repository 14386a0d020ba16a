//! Home directory resolution.
//!
//! # Responsibilities
//! - Pick the primary and extended roots from environment, process
//!   properties or the per-user default
//! - Expand `~/` and `./` prefixes and normalize the result
//! - Create the directories (fatal for primary, best-effort for extended)

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

use serde::Serialize;

use crate::config::loader::ConfigError;

/// Names derived from the application name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppNames {
    name: String,
}

impl AppNames {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// e.g. `CONTROLLER_HOME`
    pub fn home_env(&self) -> String {
        format!("{}_HOME", self.env_stem())
    }

    /// e.g. `CONTROLLER_EX_HOME`
    pub fn ex_home_env(&self) -> String {
        format!("{}_EX_HOME", self.env_stem())
    }

    /// e.g. `controller.home`
    pub fn home_property(&self) -> String {
        format!("{}.home", self.name)
    }

    /// e.g. `controller.ex_home`
    pub fn ex_home_property(&self) -> String {
        format!("{}.ex_home", self.name)
    }

    fn default_home_dir(&self) -> String {
        format!(".{}", self.name)
    }

    fn default_ex_home_dir(&self) -> String {
        format!(".{}_ex", self.name)
    }

    fn env_stem(&self) -> String {
        self.name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }
}

impl Default for AppNames {
    fn default() -> Self {
        Self::new("controller")
    }
}

/// Process-level properties, given on the command line as `-D key=value`.
///
/// They act both as a path source and as the highest-priority override of
/// every property group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessProperties {
    values: BTreeMap<String, String>,
}

impl ProcessProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Parse one `key=value` definition.
    pub fn parse_define(define: &str) -> Result<(String, String), String> {
        match define.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
            _ => Err(format!("expected key=value, got '{define}'")),
        }
    }
}

impl FromIterator<(String, String)> for ProcessProperties {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// A resolved configuration root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootPath {
    path: PathBuf,
    present: bool,
}

impl RootPath {
    pub fn new(path: PathBuf, present: bool) -> Self {
        Self { path, present }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory exists. An absent root provides no files.
    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn sub_file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Presence check of a file under the root.
    pub fn has_file(&self, name: &str) -> bool {
        self.present && self.sub_file(name).exists()
    }
}

/// Resolves the primary and extended roots.
#[derive(Debug, Clone)]
pub struct PathResolver {
    app: AppNames,
    env: HashMap<String, String>,
    properties: ProcessProperties,
    user_home: Option<PathBuf>,
    current_dir: PathBuf,
}

impl PathResolver {
    /// Resolver with no environment; homes are supplied explicitly.
    pub fn new(app: AppNames, properties: ProcessProperties, user_home: Option<PathBuf>, current_dir: PathBuf) -> Self {
        Self {
            app,
            env: HashMap::new(),
            properties,
            user_home,
            current_dir,
        }
    }

    /// Resolver reading the real process environment.
    pub fn from_process(app: AppNames, properties: ProcessProperties) -> Self {
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut resolver = Self::new(app, properties, dirs::home_dir(), current_dir);
        for name in [resolver.app.home_env(), resolver.app.ex_home_env()] {
            if let Ok(value) = std::env::var(&name) {
                resolver.env.insert(name, value);
            }
        }
        resolver
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn app(&self) -> &AppNames {
        &self.app
    }

    pub fn properties(&self) -> &ProcessProperties {
        &self.properties
    }

    /// Resolve and create the primary root. Failure is fatal.
    pub fn resolve_primary_root(&self) -> Result<RootPath, ConfigError> {
        let path = self.resolve_dir(
            &self.app.home_env(),
            &self.app.home_property(),
            &self.app.default_home_dir(),
        )?;
        fs::create_dir_all(&path).map_err(|e| ConfigError::Home {
            path: path.clone(),
            source: e,
        })?;
        tracing::info!(path = %path.display(), "Home directory resolved");
        Ok(RootPath::new(path, true))
    }

    /// Resolve the extended root. Never fails; the root may be absent.
    pub fn resolve_extended_root(&self) -> RootPath {
        let path = match self.resolve_dir(
            &self.app.ex_home_env(),
            &self.app.ex_home_property(),
            &self.app.default_ex_home_dir(),
        ) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "Extended home unresolvable, running without overrides");
                return RootPath::new(PathBuf::new(), false);
            }
        };
        if let Err(e) = fs::create_dir_all(&path) {
            tracing::debug!(path = %path.display(), error = %e, "Extended home could not be created");
        }
        let present = path.is_dir();
        tracing::info!(path = %path.display(), present, "Extended home directory resolved");
        RootPath::new(path, present)
    }

    fn resolve_dir(&self, env_name: &str, property: &str, default_dir: &str) -> Result<PathBuf, ConfigError> {
        let from_env = self.env.get(env_name).map(String::as_str).filter(|v| !v.is_empty());
        let from_property = self.properties.get(property).filter(|v| !v.is_empty());

        if let (Some(env), Some(prop)) = (from_env, from_property) {
            if env != prop {
                tracing::warn!(
                    env_name,
                    env_value = env,
                    property,
                    property_value = prop,
                    "Home path is ambiguous, the process property is accepted"
                );
            }
        }

        let raw = match from_property.or(from_env) {
            Some(value) => self.expand(value)?,
            None => self.user_home()?.join(default_dir),
        };
        let absolute = if raw.is_absolute() {
            raw
        } else {
            self.current_dir.join(raw)
        };
        Ok(normalize(&absolute))
    }

    fn expand(&self, value: &str) -> Result<PathBuf, ConfigError> {
        if let Some(rest) = strip_prefix(value, '~') {
            return Ok(self.user_home()?.join(rest));
        }
        if let Some(rest) = strip_prefix(value, '.') {
            return Ok(self.current_dir.join(rest));
        }
        Ok(PathBuf::from(value))
    }

    fn user_home(&self) -> Result<&Path, ConfigError> {
        self.user_home.as_deref().ok_or(ConfigError::NoUserHome)
    }
}

/// Strip `<lead>/` (or the platform separator) from the start of `value`.
fn strip_prefix(value: &str, lead: char) -> Option<&str> {
    let rest = value.strip_prefix(lead)?;
    rest.strip_prefix('/').or_else(|| rest.strip_prefix(MAIN_SEPARATOR))
}

/// Lexically resolve `.` and `..` segments.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
