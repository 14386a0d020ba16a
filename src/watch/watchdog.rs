//! Modification-time polling of a single file.
//!
//! # State Transitions
//! ```text
//! Idle → Running: start()
//! Running → Stopped: stop() (terminal, joins the task)
//! ```
//!
//! Reactions run on Tokio's blocking pool, one at a time per watchdog. A
//! reaction in progress when `stop()` is called finishes before it returns.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior};

use crate::config::loader::ConfigError;
use crate::lifecycle::shutdown::{Shutdown, ShutdownListener};

/// Poll interval used by every watched file unless overridden.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Failure reported by a reaction.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Reaction(String),
}

type Reaction = Arc<dyn Fn() -> Result<(), WatchError> + Send + Sync>;

/// A file to poll and what to do when it changes.
#[derive(Clone)]
pub struct WatchTarget {
    name: String,
    path: PathBuf,
    interval: Duration,
    reaction: Reaction,
}

impl WatchTarget {
    pub fn new<F>(name: impl Into<String>, path: PathBuf, reaction: F) -> Self
    where
        F: Fn() -> Result<(), WatchError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            path,
            interval: DEFAULT_POLL_INTERVAL,
            reaction: Arc::new(reaction),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for WatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchTarget")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Idle,
    Running,
    Stopped,
}

enum Inner {
    Idle,
    Running { shutdown: Shutdown, handle: JoinHandle<()> },
    Stopped,
}

/// Background poller for one [`WatchTarget`].
pub struct FileWatchdog {
    target: WatchTarget,
    inner: Inner,
}

impl FileWatchdog {
    pub fn new(target: WatchTarget) -> Self {
        Self {
            target,
            inner: Inner::Idle,
        }
    }

    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    pub fn state(&self) -> WatchdogState {
        match self.inner {
            Inner::Idle => WatchdogState::Idle,
            Inner::Running { .. } => WatchdogState::Running,
            Inner::Stopped => WatchdogState::Stopped,
        }
    }

    /// Start polling. Must be called inside a Tokio runtime.
    ///
    /// The file's current modification time is the baseline, so an
    /// unchanged file never fires.
    pub fn start(&mut self) {
        if !matches!(self.inner, Inner::Idle) {
            tracing::warn!(watchdog = %self.target.name, "Watchdog already started");
            return;
        }
        let baseline = modified_time(&self.target.path);
        let shutdown = Shutdown::new();
        let listener = shutdown.subscribe();
        let target = self.target.clone();
        let handle = tokio::spawn(poll_loop(target, baseline, listener));

        tracing::info!(
            watchdog = %self.target.name,
            path = %self.target.path.display(),
            interval_ms = self.target.interval.as_millis() as u64,
            "Watchdog started"
        );
        self.inner = Inner::Running { shutdown, handle };
    }

    /// Stop polling and wait for the loop to exit.
    ///
    /// No reaction runs once this returns.
    pub async fn stop(&mut self) {
        match std::mem::replace(&mut self.inner, Inner::Stopped) {
            Inner::Running { shutdown, handle } => {
                shutdown.trigger();
                if let Err(e) = handle.await {
                    tracing::error!(watchdog = %self.target.name, error = %e, "Watchdog task ended abnormally");
                }
                tracing::info!(watchdog = %self.target.name, "Watchdog stopped");
            }
            Inner::Idle | Inner::Stopped => {}
        }
    }
}

async fn poll_loop(target: WatchTarget, mut last_modified: Option<SystemTime>, mut shutdown: ShutdownListener) {
    let mut ticker = time::interval(target.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            _ = ticker.tick() => {
                let Some(modified) = modified_time(&target.path) else {
                    continue;
                };
                if last_modified.is_some_and(|last| modified <= last) {
                    continue;
                }
                // Reactions touch the disk and run listener code, so they go
                // to the blocking pool. Awaiting keeps them serialized.
                let reaction = target.clone();
                if let Err(e) = task::spawn_blocking(move || run_reaction(&reaction)).await {
                    tracing::error!(watchdog = %target.name, error = %e, "Reaction task did not complete");
                }
                // Recorded even after a failure, so a broken change is not
                // retried on every poll.
                last_modified = Some(modified);
            }
        }
    }
}

fn run_reaction(target: &WatchTarget) {
    tracing::info!(watchdog = %target.name, path = %target.path.display(), "Watched file changed");
    match panic::catch_unwind(AssertUnwindSafe(|| (target.reaction)())) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(watchdog = %target.name, error = %e, "Error while applying file change");
        }
        Err(_) => {
            tracing::error!(watchdog = %target.name, "Reaction panicked while applying file change");
        }
    }
}

/// Modification time, `None` when the file does not exist.
fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
