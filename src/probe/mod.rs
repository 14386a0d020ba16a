//! Bounded remote status probing.
//!
//! # Data Flow
//! ```text
//! status(address)
//!     → parse_host + configured monitor port = ProbeTarget
//!     → BoundedProbe::run (semaphore-gated blocking worker, deadline)
//!         → cached handle or MonitorConnector::connect
//!         → MonitorConnector::fetch
//!     → ProbeResult → StatusEnvelope (JSON)
//! ```
//!
//! # Design Decisions
//! - Failures are values (`ProbeFailure`), not errors: an unreachable agent
//!   is a normal steady-state condition
//! - One handle per target, dropped on `close` or on the first failed fetch

pub mod bounded;
pub mod monitor;
pub mod tcp;

pub use bounded::{BoundedProbe, CancelFlag, FailureKind, ProbeError, ProbeFailure};
pub use monitor::{
    parse_host, MonitorConnector, MonitorProbe, PortSource, ProbeResult, ProbeSettings, ProbeTarget, StatusEnvelope,
};
pub use tcp::JsonLineConnector;
