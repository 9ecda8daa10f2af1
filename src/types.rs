//!
//! Shared scalar types and the per-cycle signals supplied by the host driver.

/// Discrete host cycle counter. Monotonically increasing.
pub type Cycle = u64;

/// Process priority. Lower numbers are more important; `0` is the most
/// critical band.
pub type Priority = u32;

/// Unique key of a process within a `Scheduler`.
pub type ProcessId = String;

/// Category label of a process, used to aggregate execution statistics.
pub type ProcessType = String;

/// Signals the host driver supplies once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HostSignals {
    /// Current cycle.
    pub cycle: Cycle,
    /// Remaining computational headroom. Drains under heavy use, refills when idle.
    pub reserve: f64,
    /// Hard per-cycle compute limit in milliseconds.
    pub cpu_limit_ms: f64,
    /// Optional external throttle; the budget never exceeds it when set.
    pub throttle_ms: Option<f64>,
}

impl HostSignals {
    pub fn new(cycle: Cycle, reserve: f64, cpu_limit_ms: f64) -> Self {
        HostSignals { cycle, reserve, cpu_limit_ms, throttle_ms: None }
    }

    /// Same signals with a throttle override applied.
    pub fn with_throttle(mut self, throttle_ms: f64) -> Self {
        self.throttle_ms = Some(throttle_ms);
        self
    }
}
