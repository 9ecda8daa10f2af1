//!
//! Host driver: ties the scheduler, the topics bus and the persisted-state
//! store together behind a single per-cycle `tick`.
//!
//! Per cycle the kernel starts the clock, loads the store, moves the topics
//! to the host cycle and sweeps expired requests, runs the scheduler, then
//! saves the store. Load and sweep time count against the cycle budget.
//! Store failures are logged; a cycle always completes.

use crate::clock::{CpuClock, InstantClock};
use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::kernel::context::Context;
use crate::kernel::process::Process;
use crate::kernel::scheduler::{Scheduler, TickReport};
use crate::store::{MemoryStore, StateStore};
use crate::topics::Topics;
use crate::types::{Cycle, HostSignals};

/// The colony kernel.
#[derive(Debug)]
pub struct Kernel<C: CpuClock = InstantClock, S: StateStore = MemoryStore> {
    pub scheduler: Scheduler<C>,
    pub topics: Topics,
    pub store: S,
    last_cycle: Option<Cycle>,
}

impl Kernel<InstantClock, MemoryStore> {
    /// Wall-clock metering and an in-memory store.
    pub fn new(config: KernelConfig) -> Self {
        Self::with_parts(config, InstantClock::default(), MemoryStore::new())
    }
}

impl<C: CpuClock, S: StateStore> Kernel<C, S> {
    pub fn with_parts(config: KernelConfig, clock: C, store: S) -> Self {
        Kernel {
            topics: Topics::from_config(&config),
            scheduler: Scheduler::with_clock(config, clock),
            store,
            last_cycle: None,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        self.scheduler.config()
    }

    pub fn register_process(&mut self, process: Process) -> Result<(), KernelError> {
        self.scheduler.register_process(process)
    }

    pub fn unregister_process(&mut self, id: &str) -> Result<Process, KernelError> {
        self.scheduler.unregister_process(id)
    }

    pub fn has_process(&self, id: &str) -> bool {
        self.scheduler.has_process(id)
    }

    pub fn get_process(&self, id: &str) -> Option<&Process> {
        self.scheduler.get_process(id)
    }

    /// Cycle of the most recent tick.
    pub fn last_cycle(&self) -> Option<Cycle> {
        self.last_cycle
    }

    /// Runs one host cycle. Call exactly once per cycle with increasing cycle numbers.
    pub fn tick(&mut self, host: HostSignals) -> TickReport {
        let cycle = host.cycle;
        if let Some(last) = self.last_cycle {
            if cycle <= last {
                tracing::warn!(cycle, last, "Host cycle did not advance");
            }
        }
        self.last_cycle = Some(cycle);
        self.scheduler.begin_cycle(cycle);

        if let Err(err) = self.store.load(cycle) {
            tracing::error!(cycle, error = %err, "State load failed");
        }

        self.topics.set_cycle(cycle);
        self.topics.sweep_expired();

        let report = {
            let mut ctx = Context::new(host, &mut self.topics, &mut self.store);
            self.scheduler.tick(&mut ctx)
        };

        if let Err(err) = self.store.save(cycle) {
            tracing::error!(cycle, error = %err, "State save failed");
        }
        report
    }
}
