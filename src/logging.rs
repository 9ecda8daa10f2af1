//! Log output for hosts, built on `tracing-subscriber`.

use tracing_subscriber::EnvFilter;

use crate::error::KernelError;

/// Installs a global fmt subscriber. `RUST_LOG` wins over `default_filter`
/// when set, e.g. `init("colony_kernel=debug")`.
pub fn init(default_filter: &str) -> Result<(), KernelError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| KernelError::Config(format!("Invalid log filter '{}': {}", default_filter, e)))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| KernelError::Config(format!("Logging already initialised: {}", e)))
}
