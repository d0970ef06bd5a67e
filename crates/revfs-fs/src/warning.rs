use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use crate::error::FsError;

/// Callback receiving non-fatal conditions a provider reports.
pub type WarningFn = Arc<dyn Fn(&FsError) + Send + Sync>;

/// Per-filesystem warning sink.
///
/// Providers receive a clone at `create`/`open` time and report through
/// [`Warnings::emit`]. Until the caller installs a callback, warnings go to
/// the log.
#[derive(Clone, Default)]
pub struct Warnings {
    sink: Arc<RwLock<Option<WarningFn>>>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `f`, replacing any earlier callback.
    pub fn set(&self, f: WarningFn) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(f);
    }

    /// Remove the callback; later warnings are logged.
    pub fn clear(&self) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn emit(&self, warning: &FsError) {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sink {
            Some(f) => f(warning),
            None => warn!(warning = %warning, "filesystem warning"),
        }
    }
}

impl std::fmt::Debug for Warnings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let installed = self
            .sink
            .read()
            .map(|s| s.is_some())
            .unwrap_or(false);
        f.debug_struct("Warnings")
            .field("callback", &installed)
            .finish()
    }
}
