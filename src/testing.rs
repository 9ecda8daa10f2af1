//! Test helpers: scripted runnables, a shared run log and a kernel bed driven
//! by a `ManualClock`.
//!
//! Compiled for unit tests and behind the `test-utils` feature.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::clock::ManualClock;
use crate::config::KernelConfig;
use crate::error::ProcessError;
use crate::kernel::{Context, Directive, Kernel, Process, Runnable, TickReport};
use crate::store::MemoryStore;
use crate::types::{Cycle, HostSignals, Priority, ProcessId};

/// Reserve at the default target: full budget, no brownout.
pub const HEALTHY_RESERVE: f64 = 10_000.0;
/// Default per-cycle host limit used by the helpers.
pub const CPU_LIMIT_MS: f64 = 20.0;

/// Signals for a healthy host at `cycle`.
pub fn host(cycle: Cycle) -> HostSignals {
    HostSignals::new(cycle, HEALTHY_RESERVE, CPU_LIMIT_MS)
}

/// Signals for a host whose reserve is empty.
pub fn starved_host(cycle: Cycle) -> HostSignals {
    HostSignals::new(cycle, 0.0, CPU_LIMIT_MS)
}

/// Shared record of `(process id, cycle)` executions, in execution order.
#[derive(Debug, Clone, Default)]
pub struct RunLog(Rc<RefCell<Vec<(ProcessId, Cycle)>>>);

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, id: &str, cycle: Cycle) {
        self.0.borrow_mut().push((id.to_owned(), cycle));
    }

    /// Cycles at which `id` executed.
    pub fn runs_of(&self, id: &str) -> Vec<Cycle> {
        self.0.borrow().iter().filter(|(p, _)| p == id).map(|&(_, c)| c).collect()
    }

    /// Ids executed at `cycle`, in order.
    pub fn order_at(&self, cycle: Cycle) -> Vec<ProcessId> {
        self.0.borrow().iter().filter(|&&(_, c)| c == cycle).map(|(p, _)| p.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// What a [`Probe`] does on one run.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Continue,
    Sleep(Cycle),
    Terminate,
    Fail(String),
    Panic(String),
}

/// Runnable that logs each run, optionally spends clock time, and follows
/// a script of [`Step`]s before falling back to a default step.
pub struct Probe {
    id: ProcessId,
    log: RunLog,
    clock: Option<(ManualClock, f64)>,
    script: VecDeque<Step>,
    fallback: Step,
}

impl Probe {
    pub fn new(id: impl Into<ProcessId>, log: &RunLog) -> Self {
        Probe { id: id.into(), log: log.clone(), clock: None, script: VecDeque::new(), fallback: Step::Continue }
    }

    /// Every run advances `clock` by `ms`.
    pub fn costing(mut self, clock: &ManualClock, ms: f64) -> Self {
        self.clock = Some((clock.clone(), ms));
        self
    }

    /// Appends a one-off step to the script.
    pub fn then(mut self, step: Step) -> Self {
        self.script.push_back(step);
        self
    }

    /// Step used once the script is exhausted.
    pub fn always(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }
}

impl Runnable for Probe {
    fn run(&mut self, ctx: &mut Context<'_>) -> Result<Directive, ProcessError> {
        self.log.record(&self.id, ctx.cycle());
        if let Some((clock, ms)) = &self.clock {
            clock.advance(*ms);
        }
        match self.script.pop_front().unwrap_or_else(|| self.fallback.clone()) {
            Step::Continue => Ok(Directive::Continue),
            Step::Sleep(n) => Ok(Directive::Sleep(n)),
            Step::Terminate => Ok(Directive::Terminate),
            Step::Fail(msg) => Err(ProcessError::Failed(msg)),
            Step::Panic(msg) => panic!("{}", msg),
        }
    }
}

/// Kernel on a manual clock plus a run log shared by its probes.
pub struct TestBed {
    pub kernel: Kernel<ManualClock, MemoryStore>,
    pub clock: ManualClock,
    pub log: RunLog,
}

impl TestBed {
    pub fn new(config: KernelConfig) -> Self {
        #[cfg(feature = "logging")]
        init_test_logging();
        let clock = ManualClock::new();
        TestBed {
            kernel: Kernel::with_parts(config, clock.clone(), MemoryStore::new()),
            clock,
            log: RunLog::new(),
        }
    }

    /// Registers a probe process; `script` customises the probe.
    pub fn add(
        &mut self,
        id: &str,
        priority: Priority,
        skippable: bool,
        script: impl FnOnce(Probe) -> Probe,
    ) -> &mut Self {
        let probe = script(Probe::new(id, &self.log));
        let process = Process::new(id, "probe", priority, probe).with_skippable(skippable);
        if let Err(err) = self.kernel.register_process(process) {
            panic!("test bed registration failed: {}", err);
        }
        self
    }

    pub fn tick(&mut self, cycle: Cycle) -> TickReport {
        self.kernel.tick(host(cycle))
    }

    pub fn tick_with(&mut self, host: HostSignals) -> TickReport {
        self.kernel.tick(host)
    }
}

impl Default for TestBed {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

/// Routes `tracing` output to the test harness. Safe to call repeatedly.
#[cfg(feature = "logging")]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
