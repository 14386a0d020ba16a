//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with key/value fields
//!     → logging.rs filter (RUST_LOG, else controller.verbose)
//!     → fmt layer on stdout
//! ```
//!
//! # Design Decisions
//! - Structured fields over formatted messages
//! - Verbosity follows the settings file on every reload

pub mod logging;

pub use logging::{init_logging, LogControl};
