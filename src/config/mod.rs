//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! PathResolver (paths.rs)
//!     → primary root + extended root
//!     → loader.rs merges each PrecedenceChain (later source wins)
//!       reading key=value files through format.rs
//!     → PropertyGroup per group, keys translated by keys.rs
//!     → ConfigRegistry (registry.rs) publishes groups
//!
//! On reload:
//!     watch::ReloadCoordinator detects a change
//!     → registry reloads the affected group
//!     → atomic swap of Arc<SettingsSnapshot>
//!     → readers observe either the old or the new snapshot
//! ```
//!
//! # Design Decisions
//! - Groups are immutable once published; changes require a full reload
//! - Every logical key has a default in its key table
//! - A broken file aborts only the reload that read it

pub mod content;
pub mod defaults;
pub mod format;
pub mod keys;
pub mod loader;
pub mod paths;
pub mod properties;
pub mod registry;

pub use content::Announcement;
pub use loader::{load_group, ConfigError, PrecedenceChain, PropertySource};
pub use paths::{AppNames, PathResolver, ProcessProperties, RootPath};
pub use properties::{GroupKind, PropertyError, PropertyGroup};
pub use registry::{ConfigRegistry, NodeIdentity, SettingsSnapshot};
