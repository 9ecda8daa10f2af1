//!
//! CPU clock abstraction.
//!
//! The scheduler never reads time directly; it asks a [`CpuClock`] how much
//! compute the current cycle has consumed so far. Hosts plug in their own
//! meter, [`InstantClock`] measures wall time, and [`ManualClock`] is advanced
//! explicitly for deterministic simulations and tests.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

pub trait CpuClock {
    /// Milliseconds of compute consumed in the current cycle.
    fn used_ms(&self) -> f64;

    /// Called by the scheduler at the start of every tick.
    fn begin_cycle(&mut self) {}
}

/// Wall-clock meter, restarted at each cycle.
#[derive(Debug, Clone, Copy)]
pub struct InstantClock {
    origin: Instant,
}

impl Default for InstantClock {
    fn default() -> Self {
        InstantClock { origin: Instant::now() }
    }
}

impl CpuClock for InstantClock {
    fn used_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1_000.0
    }

    fn begin_cycle(&mut self) {
        self.origin = Instant::now();
    }
}

/// Clock advanced by hand. Clones share the same reading, so a runnable
/// holding a clone can "spend" time the scheduler then observes.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    used: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: f64) {
        self.used.set(self.used.get() + ms);
    }

    pub fn set(&self, ms: f64) {
        self.used.set(ms);
    }
}

impl CpuClock for ManualClock {
    fn used_ms(&self) -> f64 {
        self.used.get()
    }

    fn begin_cycle(&mut self) {
        self.used.set(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_clones_share_reading() {
        let mut clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance(2.5);
        handle.advance(1.0);
        assert_eq!(clock.used_ms(), 3.5);
        clock.begin_cycle();
        assert_eq!(handle.used_ms(), 0.0);
    }

    #[test]
    fn test_instant_clock_restarts() {
        let mut clock = InstantClock::default();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(clock.used_ms() >= 1.0);
        clock.begin_cycle();
        assert!(clock.used_ms() < 1_000.0);
    }
}
