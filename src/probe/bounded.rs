//! Deadline-bounded execution of blocking remote calls.
//!
//! # Responsibilities
//! - Run a blocking operation on a bounded set of worker threads
//! - Race it against a deadline covering both queueing and execution
//! - Report the outcome as a typed [`ProbeFailure`] instead of an error
//!
//! # Design Decisions
//! - Workers are Tokio blocking tasks gated by a semaphore
//! - A timed-out worker keeps its permit until it really finishes, so the
//!   number of live threads never exceeds the pool size
//! - Cancellation is cooperative through [`CancelFlag`]

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time;

/// Why a probe did not produce a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Unreachable,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Unreachable => "unreachable",
            FailureKind::Cancelled => "cancelled",
        })
    }
}

/// Typed probe outcome returned to callers in place of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{kind}: {message}")]
pub struct ProbeFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ProbeFailure {
    pub fn timeout(deadline: Duration) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: format!("no answer within {} ms", deadline.as_millis()),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Unreachable,
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: message.into(),
        }
    }
}

/// Errors raised inside a blocking probe operation.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("status query failed: {0}")]
    Query(String),

    #[error("probe cancelled")]
    Cancelled,
}

impl From<ProbeError> for ProbeFailure {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Cancelled => ProbeFailure::cancelled(err.to_string()),
            other => ProbeFailure::unreachable(other.to_string()),
        }
    }
}

/// Cancellation signal handed to a running operation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bounded worker pool with a per-call deadline.
#[derive(Debug, Clone)]
pub struct BoundedProbe {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl BoundedProbe {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Workers currently free.
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `op` on a worker and wait at most `deadline` for its result.
    ///
    /// On expiry the operation's [`CancelFlag`] is raised and its eventual
    /// result is discarded. The worker itself is not interrupted.
    pub async fn run<T, F>(&self, deadline: Duration, op: F) -> Result<T, ProbeFailure>
    where
        F: FnOnce(&CancelFlag) -> Result<T, ProbeError> + Send + 'static,
        T: Send + 'static,
    {
        let cancel = CancelFlag::new();
        let worker_cancel = cancel.clone();
        let permits = Arc::clone(&self.permits);

        let work = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| ProbeFailure::cancelled("probe pool is closed"))?;
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                op(&worker_cancel)
            });
            match handle.await {
                Ok(result) => result.map_err(ProbeFailure::from),
                Err(e) => Err(ProbeFailure::cancelled(format!("probe worker failed: {e}"))),
            }
        };

        match time::timeout(deadline, work).await {
            Ok(outcome) => outcome,
            Err(_) => {
                cancel.cancel();
                tracing::debug!(deadline_ms = deadline.as_millis() as u64, "Probe deadline expired");
                Err(ProbeFailure::timeout(deadline))
            }
        }
    }

    /// Refuse new work. Operations already running finish normally.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}
