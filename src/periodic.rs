//!
//! Every-N-cycles action wrapper.
//!
//! Processes use [`Periodic`] to spread expensive recomputation over several
//! cycles: calls are no-ops (returning `None`) until `interval` cycles have
//! passed since the action last actually ran.

use crate::types::Cycle;

/// Wraps `action` so it runs at most once every `interval` cycles.
///
/// A fresh wrapper runs on its first call. The last-run cycle lives in the
/// wrapper; callers that need it across host restarts persist it themselves
/// via [`Periodic::last_run`] / [`Periodic::restore`].
pub struct Periodic<F> {
    interval: Cycle,
    last_run: Option<Cycle>,
    action: F,
}

impl<F> Periodic<F> {
    pub fn new(interval: Cycle, action: F) -> Self {
        Periodic { interval, last_run: None, action }
    }

    pub fn interval(&self) -> Cycle {
        self.interval
    }

    pub fn last_run(&self) -> Option<Cycle> {
        self.last_run
    }

    /// Reinstates a previously persisted last-run cycle.
    pub fn restore(&mut self, last_run: Option<Cycle>) {
        self.last_run = last_run;
    }

    /// Whether a call at `cycle` would run the action.
    pub fn is_due(&self, cycle: Cycle) -> bool {
        match self.last_run {
            None => true,
            Some(last) => cycle.saturating_sub(last) >= self.interval,
        }
    }

    /// Makes the next call run regardless of when the action last ran.
    pub fn reset(&mut self) {
        self.last_run = None;
    }

    /// Runs the action with `args` if it is due at `cycle`.
    pub fn call<A, R>(&mut self, cycle: Cycle, args: A) -> Option<R>
    where
        F: FnMut(A) -> R,
    {
        if !self.is_due(cycle) {
            return None;
        }
        self.last_run = Some(cycle);
        Some((self.action)(args))
    }
}

impl<F> std::fmt::Debug for Periodic<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Periodic")
            .field("interval", &self.interval)
            .field("last_run", &self.last_run)
            .finish_non_exhaustive()
    }
}
