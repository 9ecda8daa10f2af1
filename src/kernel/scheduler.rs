//!
//! Cooperative scheduler.
//!
//! Once per cycle [`Scheduler::tick`] recomputes the cycle's budget from the
//! host reserve, orders the process table, runs every eligible process,
//! applies the returned directives and retires terminated processes.
//!
//! Work per cycle is best-effort bounded: a running process is never
//! interrupted, so one slow process can overrun the budget. The only lever
//! is refusing to start further skippable processes once it is spent.

use std::collections::{BTreeMap, HashMap};

use crate::clock::{CpuClock, InstantClock};
use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::kernel::context::Context;
use crate::kernel::process::{Process, ProcessState};
use crate::types::{Cycle, ProcessId, ProcessType};

/// Cumulative execution statistics for one process type.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProcessTypeStats {
    pub runs: u64,
    pub cpu_ms: f64,
    /// Skips for time pressure.
    pub skips: u64,
    pub failures: u64,
    pub slow_runs: u64,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TickReport {
    pub cycle: Cycle,
    pub budget_ms: f64,
    /// Reserve was below the critical mark; non-essential bands were shed.
    pub brownout: bool,
    pub ran: u32,
    /// Skippable processes passed over because the budget was spent.
    pub skipped: u32,
    /// Processes shed by brownout.
    pub shed: u32,
    pub woke: u32,
    pub slow: u32,
    pub failed: u32,
    /// Processes that entered Terminated this tick.
    pub terminated: u32,
    /// Processes physically removed from the table at the end of the tick.
    pub removed: u32,
    /// Processes registered from `Context::spawn`.
    pub spawned: u32,
    /// Time measured across all executions this tick.
    pub cpu_ms: f64,
    pub cpu_by_type: BTreeMap<ProcessType, f64>,
}

pub struct Scheduler<C: CpuClock = InstantClock> {
    config: KernelConfig,
    clock: C,
    processes: Vec<Process>,
    index: HashMap<ProcessId, usize>,
    budget_ms: f64,
    skipped_total: u64,
    stats: BTreeMap<ProcessType, ProcessTypeStats>,
    metered_cycle: Option<Cycle>,
}

impl Scheduler<InstantClock> {
    pub fn new(config: KernelConfig) -> Self {
        Self::with_clock(config, InstantClock::default())
    }
}

impl<C: CpuClock> Scheduler<C> {
    pub fn with_clock(config: KernelConfig, clock: C) -> Self {
        Scheduler {
            config,
            clock,
            processes: Vec::new(),
            index: HashMap::new(),
            budget_ms: 0.0,
            skipped_total: 0,
            stats: BTreeMap::new(),
            metered_cycle: None,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Adds a process to the table. Ids are unique: registering an id that
    /// is already present fails and leaves the existing process in place.
    pub fn register_process(&mut self, process: Process) -> Result<(), KernelError> {
        if self.index.contains_key(process.id()) {
            return Err(KernelError::DuplicateProcess(process.id().to_owned()));
        }
        tracing::debug!(
            process_id = process.id(),
            process_type = process.process_type(),
            priority = process.priority(),
            skippable = process.is_skippable(),
            "Process registered"
        );
        self.index.insert(process.id().to_owned(), self.processes.len());
        self.processes.push(process);
        Ok(())
    }

    /// Removes a process immediately and hands it back.
    pub fn unregister_process(&mut self, id: &str) -> Result<Process, KernelError> {
        let at = self.index.get(id).copied().ok_or_else(|| KernelError::ProcessNotFound(id.to_owned()))?;
        let process = self.processes.remove(at);
        self.reindex();
        tracing::debug!(process_id = id, "Process unregistered");
        Ok(process)
    }

    pub fn has_process(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get_process(&self, id: &str) -> Option<&Process> {
        self.index.get(id).map(|&at| &self.processes[at])
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Ids in table order (the run order of the last tick, then registrations).
    pub fn process_ids(&self) -> impl Iterator<Item = &str> {
        self.processes.iter().map(Process::id)
    }

    /// Budget computed by the most recent tick.
    pub fn budget_ms(&self) -> f64 {
        self.budget_ms
    }

    /// Total time-pressure skips since creation.
    pub fn skipped_total(&self) -> u64 {
        self.skipped_total
    }

    pub fn stats(&self) -> &BTreeMap<ProcessType, ProcessTypeStats> {
        &self.stats
    }

    pub fn stats_for(&self, process_type: &str) -> Option<&ProcessTypeStats> {
        self.stats.get(process_type)
    }

    /// Restarts the clock for `cycle`. Work done between this call and
    /// `tick` for the same cycle is charged to that cycle's budget; when it
    /// is not called, `tick` starts the meter itself.
    pub fn begin_cycle(&mut self, cycle: Cycle) {
        self.clock.begin_cycle();
        self.metered_cycle = Some(cycle);
    }

    /// Runs one cycle. Never fails; runnable failures are logged and counted.
    pub fn tick(&mut self, ctx: &mut Context<'_>) -> TickReport {
        let host = *ctx.host();
        let cycle = host.cycle;
        if self.metered_cycle != Some(cycle) {
            self.begin_cycle(cycle);
        }
        self.budget_ms = self.config.budget_ms(host.cpu_limit_ms, host.reserve, host.throttle_ms);
        let brownout = host.reserve < self.config.critical_reserve;

        let mut report = TickReport { cycle, budget_ms: self.budget_ms, brownout, ..TickReport::default() };
        if brownout {
            tracing::debug!(
                cycle,
                reserve = host.reserve,
                nonessential_priority = self.config.nonessential_priority,
                "Reserve critical, shedding non-essential processes"
            );
        }

        // Stable: equal keys keep their previous relative order.
        self.processes.sort_by_key(Process::sort_key);

        for process in self.processes.iter_mut() {
            if brownout && process.priority() >= self.config.nonessential_priority {
                report.shed += 1;
                continue;
            }

            // Sleepers that are not due yet are not waiting for budget.
            match process.state() {
                ProcessState::Terminated => continue,
                ProcessState::Sleeping { wake_cycle } if cycle < wake_cycle => continue,
                _ => {}
            }

            if process.is_skippable() && self.clock.used_ms() >= self.budget_ms {
                process.record_skip();
                self.stats.entry(process.process_type().to_owned()).or_default().skips += 1;
                report.skipped += 1;
                continue;
            }

            if process.wake_if_due(cycle) {
                tracing::trace!(process_id = process.id(), cycle, "Process woke");
                report.woke += 1;
            }

            let started = self.clock.used_ms();
            let outcome = process.execute(ctx);
            let elapsed_ms = (self.clock.used_ms() - started).max(0.0);

            report.ran += 1;
            report.cpu_ms += elapsed_ms;
            *report.cpu_by_type.entry(process.process_type().to_owned()).or_default() += elapsed_ms;
            let stats = self.stats.entry(process.process_type().to_owned()).or_default();
            stats.runs += 1;
            stats.cpu_ms += elapsed_ms;

            if elapsed_ms > self.config.slow_process_ms {
                stats.slow_runs += 1;
                report.slow += 1;
                tracing::warn!(
                    process_id = process.id(),
                    process_type = process.process_type(),
                    cycle,
                    elapsed_ms,
                    threshold_ms = self.config.slow_process_ms,
                    "Slow process"
                );
            }

            match outcome {
                Ok(directive) => {
                    process.apply(directive, cycle);
                    if process.is_terminated() {
                        report.terminated += 1;
                    }
                }
                Err(err) => {
                    stats.failures += 1;
                    report.failed += 1;
                    tracing::error!(
                        process_id = process.id(),
                        process_type = process.process_type(),
                        cycle,
                        consecutive_failures = process.consecutive_failures(),
                        error = %err,
                        "Process failed"
                    );
                    if let Some(limit) = self.config.max_consecutive_failures {
                        if process.consecutive_failures() >= limit {
                            tracing::warn!(
                                process_id = process.id(),
                                process_type = process.process_type(),
                                limit,
                                "Terminating process after repeated failures"
                            );
                            process.terminate();
                            report.terminated += 1;
                        }
                    }
                }
            }
        }

        let before = self.processes.len();
        self.processes.retain(|p| !p.is_terminated());
        report.removed = (before - self.processes.len()) as u32;
        self.reindex();

        for process in ctx.take_spawned() {
            let id = process.id().to_owned();
            match self.register_process(process) {
                Ok(()) => report.spawned += 1,
                Err(err) => tracing::warn!(process_id = %id, error = %err, "Spawned process dropped"),
            }
        }

        self.skipped_total += u64::from(report.skipped);
        self.metered_cycle = None;
        tracing::debug!(
            cycle,
            budget_ms = report.budget_ms,
            used_ms = self.clock.used_ms(),
            ran = report.ran,
            skipped = report.skipped,
            shed = report.shed,
            failed = report.failed,
            removed = report.removed,
            "Tick complete"
        );
        report
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (at, process) in self.processes.iter().enumerate() {
            self.index.insert(process.id().to_owned(), at);
        }
    }
}

impl<C: CpuClock> std::fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("processes", &self.processes)
            .field("budget_ms", &self.budget_ms)
            .field("skipped_total", &self.skipped_total)
            .finish_non_exhaustive()
    }
}
