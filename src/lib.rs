//! Runtime configuration and live reload for the controller process.

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod probe;
pub mod watch;

pub use config::ConfigRegistry;
pub use lifecycle::{ConfigService, Shutdown};
pub use probe::MonitorProbe;
pub use watch::ReloadCoordinator;
