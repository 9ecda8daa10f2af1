//!
//! Kernel configuration.
//!
//! All fields have defaults, so a partial JSON document (or `{}`) is a valid
//! configuration. Values are checked by [`KernelConfig::validate`], which the
//! loaders call before returning.

use std::path::Path;

use crate::error::KernelError;
use crate::types::{Cycle, Priority};

/// Tunables for budgeting, brownout shedding, topics and failure handling.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Relative ttl (in cycles) applied by `Topics::publish`.
    pub default_ttl: Cycle,
    /// Floor of the budget multiplier applied to the host limit.
    pub min_budget_ratio: f64,
    /// Reserve level at which the deficit factor reaches zero.
    pub reserve_target: f64,
    /// Below this reserve the scheduler sheds non-essential priority bands.
    pub critical_reserve: f64,
    /// Processes with a priority number `>=` this are non-essential.
    pub nonessential_priority: Priority,
    /// A single run taking longer than this is flagged as slow.
    pub slow_process_ms: f64,
    /// Terminate a process after this many consecutive failed runs.
    /// `None` retries forever.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            default_ttl: 500,
            min_budget_ratio: 0.5,
            reserve_target: 10_000.0,
            critical_reserve: 1_000.0,
            nonessential_priority: 5,
            slow_process_ms: 10.0,
            max_consecutive_failures: Some(10),
        }
    }
}

impl KernelConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, KernelError> {
        let config: KernelConfig = serde_json::from_str(json)
            .map_err(|e| KernelError::Config(format!("Malformed configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, KernelError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| KernelError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), KernelError> {
        if self.default_ttl == 0 {
            return Err(KernelError::Config("default_ttl must be at least 1".into()));
        }
        if self.min_budget_ratio.is_nan() || self.min_budget_ratio <= 0.0 || self.min_budget_ratio > 1.0 {
            return Err(KernelError::Config(format!(
                "min_budget_ratio must be in (0, 1], got {}",
                self.min_budget_ratio
            )));
        }
        if self.reserve_target.is_nan() || self.reserve_target <= 0.0 {
            return Err(KernelError::Config("reserve_target must be positive".into()));
        }
        if self.critical_reserve.is_nan() || self.critical_reserve < 0.0 {
            return Err(KernelError::Config("critical_reserve must not be negative".into()));
        }
        if self.slow_process_ms.is_nan() || self.slow_process_ms < 0.0 {
            return Err(KernelError::Config("slow_process_ms must not be negative".into()));
        }
        if self.max_consecutive_failures == Some(0) {
            return Err(KernelError::Config(
                "max_consecutive_failures must be at least 1 (use null to disable)".into(),
            ));
        }
        Ok(())
    }

    /// Fraction of the reserve target that is currently missing, in `[0, 1]`.
    pub fn deficit_factor(&self, reserve: f64) -> f64 {
        ((self.reserve_target - reserve) / self.reserve_target).clamp(0.0, 1.0)
    }

    /// `limit × max(min_ratio, 1 − deficit)`, clamped to the throttle when one is set.
    pub fn budget_ms(&self, cpu_limit_ms: f64, reserve: f64, throttle_ms: Option<f64>) -> f64 {
        let ratio = (1.0 - self.deficit_factor(reserve)).max(self.min_budget_ratio);
        let budget = cpu_limit_ms * ratio;
        match throttle_ms {
            Some(throttle) => budget.min(throttle),
            None => budget,
        }
    }
}
