//! Settings reload listeners.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::registry::SettingsSnapshot;

/// Error a listener may report. It is logged, never propagated.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

type Listener = Arc<dyn Fn(&SettingsSnapshot) -> Result<(), ListenerError> + Send + Sync>;

/// Ordered set of callbacks run after a settings reload.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Listener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, listener: F)
    where
        F: Fn(&SettingsSnapshot) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every listener in registration order.
    ///
    /// A listener that fails or panics is logged and the next one still
    /// runs. Returns the number of failed listeners.
    pub fn notify(&self, snapshot: &SettingsSnapshot) -> usize {
        // Clone the list so a listener may register another one.
        let listeners: Vec<Listener> = self.listeners.read().unwrap_or_else(PoisonError::into_inner).clone();
        let mut failed = 0;
        for (index, listener) in listeners.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(snapshot))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    tracing::error!(listener = index, error = %e, "Settings listener failed");
                }
                Err(_) => {
                    failed += 1;
                    tracing::error!(listener = index, "Settings listener panicked");
                }
            }
        }
        failed
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet").field("len", &self.len()).finish()
    }
}
