//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Resolve roots → Load registry → Apply log level → Start watchdogs
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Trigger each watchdog's Shutdown → Join loops
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then watchers
//! - Shutdown joins every background loop before returning
//! - Process exit gives abandoned blocking work a short grace period only

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{shutdown_runtime, Shutdown, ShutdownListener, BLOCKING_SHUTDOWN_GRACE};
pub use startup::{bootstrap, ConfigService};
