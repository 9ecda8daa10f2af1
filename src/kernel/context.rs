//! Per-cycle context handed to `Scheduler::tick` and every `Runnable::run`.
//!
//! It carries the host signals, the shared `Topics` bus, the persisted-state
//! store and a queue of processes spawned during the cycle. Nothing in the
//! kernel is reachable through globals.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::KernelError;
use crate::kernel::process::Process;
use crate::store::StateStore;
use crate::topics::Topics;
use crate::types::{Cycle, HostSignals};

pub struct Context<'a> {
    host: HostSignals,
    topics: &'a mut Topics,
    store: &'a mut dyn StateStore,
    spawned: Vec<Process>,
}

impl<'a> Context<'a> {
    /// Builds the context for `host.cycle`, moving the topics to that cycle.
    pub fn new(host: HostSignals, topics: &'a mut Topics, store: &'a mut dyn StateStore) -> Self {
        topics.set_cycle(host.cycle);
        Context { host, topics, store, spawned: Vec::new() }
    }

    pub fn host(&self) -> &HostSignals {
        &self.host
    }

    pub fn cycle(&self) -> Cycle {
        self.host.cycle
    }

    pub fn reserve(&self) -> f64 {
        self.host.reserve
    }

    pub fn topics(&self) -> &Topics {
        &*self.topics
    }

    pub fn topics_mut(&mut self) -> &mut Topics {
        &mut *self.topics
    }

    pub fn store(&self) -> &(dyn StateStore + 'a) {
        &*self.store
    }

    pub fn store_mut(&mut self) -> &mut (dyn StateStore + 'a) {
        &mut *self.store
    }

    /// Reads and deserializes a persisted value.
    pub fn load_state<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, KernelError> {
        match self.store.get(key) {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }

    pub fn save_state<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), KernelError> {
        let value = serde_json::to_value(value)?;
        self.store.set(key, value);
        Ok(())
    }

    /// Queues a process for registration once the current pass finishes.
    /// It first becomes eligible on the next cycle.
    pub fn spawn(&mut self, process: Process) {
        self.spawned.push(process);
    }

    pub fn spawned_len(&self) -> usize {
        self.spawned.len()
    }

    pub(crate) fn take_spawned(&mut self) -> Vec<Process> {
        std::mem::take(&mut self.spawned)
    }
}
