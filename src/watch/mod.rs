//! File watching and live reload.
//!
//! # Data Flow
//! ```text
//! FileWatchdog (watchdog.rs), one per file
//!     → polls modification time every interval
//!     → runs its WatchTarget reaction on change
//!
//! ReloadCoordinator (coordinator.rs):
//!     announcement.conf → registry.reload_announcement()
//!     system.conf       → registry.reload_settings() → ListenerSet::notify
//!     policy script     → registry.invalidate_policy_script()
//! ```
//!
//! # Design Decisions
//! - Polling instead of OS notifications: the three files are tiny and the
//!   interval is seconds
//! - Watchdogs are independent and share no state
//! - Listener failures are isolated per listener

pub mod coordinator;
pub mod listeners;
pub mod watchdog;

pub use coordinator::ReloadCoordinator;
pub use listeners::{ListenerError, ListenerSet};
pub use watchdog::{FileWatchdog, WatchError, WatchTarget, WatchdogState, DEFAULT_POLL_INTERVAL};
