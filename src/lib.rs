#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(deprecated)]

//!
//! Colony-Kernel is the execution kernel of an autonomous agent-management
//! platform.
//!
//! Each host cycle, hundreds of independently defined units of work
//! ("processes") are selected, run for a bounded slice of time, and
//! suspended or retired under a compute budget that follows the host's
//! reserve. The crate provides:
//!
//! - a cooperative, single-threaded [`Scheduler`] with priority ordering,
//!   anti-starvation fairness, time-pressure skipping and brownout shedding;
//! - the [`Process`] lifecycle (`Running`, `Sleeping`, `Terminated`) driven by
//!   [`Directive`]s returned from pluggable [`Runnable`]s;
//! - [`Topics`], the priority-ordered, ttl-bounded message bus that is the only
//!   channel between processes;
//! - [`Periodic`], an every-N-cycles action wrapper;
//! - the [`Kernel`] host driver tying these to a [`StateStore`].

// Shared scalar types and host signals.
pub mod types;

// Kernel error types.
pub mod error;

pub mod config;

pub mod clock;

pub mod topics;

pub mod periodic;

// Persisted cross-cycle state.
pub mod store;

// Scheduler, processes and the host driver.
pub mod kernel;

#[cfg(feature = "logging")]
pub mod logging;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use clock::{CpuClock, InstantClock, ManualClock};
pub use config::KernelConfig;
pub use error::{KernelError, ProcessError};
pub use kernel::{
    runnable_fn, Context, Directive, Kernel, Process, ProcessState, ProcessTypeStats, Runnable, Scheduler,
    TickReport,
};
pub use periodic::Periodic;
pub use store::{JsonFileStore, MemoryStore, StateStore};
pub use topics::{Request, TopicKey, Topics};
pub use types::{Cycle, HostSignals, Priority, ProcessId, ProcessType};
