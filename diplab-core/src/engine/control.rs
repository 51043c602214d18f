//! Cooperative cancellation and iteration budget for a single run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bounds a simulation run. Checked once per hourly step.
///
/// The cancel flag is shared; clone the `Arc` into every run of a sweep to
/// stop them all from one place.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pub max_steps: Option<usize>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl RunControl {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Effective step budget: the tighter of this control's and `config_budget`.
    pub fn budget(&self, config_budget: Option<usize>) -> Option<usize> {
        match (self.max_steps, config_budget) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
