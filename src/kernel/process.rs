//!
//! Process: a `Runnable` plus identity, priority, skippability and a
//! three-state lifecycle.
//!
//! ```text
//! Running  --Continue-->          Running
//! Running  --Sleep(n)-->          Sleeping(now + n)
//! Running  --Terminate/failure--> Terminated
//! Sleeping --wake cycle reached-> Running
//! Terminated is absorbing.
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::ProcessError;
use crate::kernel::context::Context;
use crate::kernel::runtime::{Directive, Runnable};
use crate::types::{Cycle, Priority, ProcessId, ProcessType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProcessState {
    Running,
    Sleeping { wake_cycle: Cycle },
    Terminated,
}

/// A scheduled unit of work. Owned by the `Scheduler` it is registered with.
pub struct Process {
    id: ProcessId,
    process_type: ProcessType,
    priority: Priority,
    skippable: bool,
    state: ProcessState,
    last_run: Option<Cycle>,
    skip_count: u64,
    consecutive_failures: u32,
    runnable: Box<dyn Runnable>,
}

impl Process {
    /// New Running process. Skippable unless changed with [`Process::with_skippable`].
    pub fn new(
        id: impl Into<ProcessId>,
        process_type: impl Into<ProcessType>,
        priority: Priority,
        runnable: impl Runnable + 'static,
    ) -> Self {
        Process {
            id: id.into(),
            process_type: process_type.into(),
            priority,
            skippable: true,
            state: ProcessState::Running,
            last_run: None,
            skip_count: 0,
            consecutive_failures: 0,
            runnable: Box::new(runnable),
        }
    }

    /// Non-skippable processes run even when the cycle budget is spent.
    pub fn with_skippable(mut self, skippable: bool) -> Self {
        self.skippable = skippable;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn process_type(&self) -> &str {
        &self.process_type
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn is_skippable(&self) -> bool {
        self.skippable
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }

    pub fn is_sleeping(&self) -> bool {
        matches!(self.state, ProcessState::Sleeping { .. })
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ProcessState::Terminated
    }

    /// Cycle of the most recent execution, `None` if it never ran.
    pub fn last_run(&self) -> Option<Cycle> {
        self.last_run
    }

    /// Times this process was passed over for lack of budget. Only counts
    /// cycles in which it was ready to run; a sleeper that is not due yet
    /// is never counted.
    pub fn skip_count(&self) -> u64 {
        self.skip_count
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Scheduler ordering key: priority, then non-skippable first, then
    /// longest-waiting first.
    pub(crate) fn sort_key(&self) -> (Priority, bool, Option<Cycle>) {
        (self.priority, self.skippable, self.last_run)
    }

    pub(crate) fn record_skip(&mut self) {
        self.skip_count += 1;
    }

    /// Sleeping → Running once `cycle` reaches the wake cycle.
    pub(crate) fn wake_if_due(&mut self, cycle: Cycle) -> bool {
        match self.state {
            ProcessState::Sleeping { wake_cycle } if cycle >= wake_cycle => {
                self.state = ProcessState::Running;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn terminate(&mut self) {
        self.state = ProcessState::Terminated;
    }

    /// Applies a directive returned at `cycle`. No effect once Terminated.
    pub(crate) fn apply(&mut self, directive: Directive, cycle: Cycle) {
        if self.is_terminated() {
            return;
        }
        self.state = match directive {
            Directive::Continue => ProcessState::Running,
            Directive::Sleep(n) => ProcessState::Sleeping { wake_cycle: cycle.saturating_add(n) },
            Directive::Terminate => ProcessState::Terminated,
        };
    }

    /// Runs the runnable once, converting a panic into `ProcessError::Panicked`.
    /// Updates `last_run` and the consecutive-failure count.
    pub(crate) fn execute(&mut self, ctx: &mut Context<'_>) -> Result<Directive, ProcessError> {
        let runnable = &mut self.runnable;
        let outcome = match catch_unwind(AssertUnwindSafe(|| runnable.run(ctx))) {
            Ok(result) => result,
            Err(payload) => Err(ProcessError::Panicked(panic_message(payload.as_ref()))),
        };
        self.last_run = Some(ctx.cycle());
        match outcome {
            Ok(_) => self.consecutive_failures = 0,
            Err(_) => self.consecutive_failures = self.consecutive_failures.saturating_add(1),
        }
        outcome
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("process_type", &self.process_type)
            .field("priority", &self.priority)
            .field("skippable", &self.skippable)
            .field("state", &self.state)
            .field("last_run", &self.last_run)
            .field("skip_count", &self.skip_count)
            .field("consecutive_failures", &self.consecutive_failures)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::runtime::runnable_fn;
    use crate::store::MemoryStore;
    use crate::topics::Topics;
    use crate::types::HostSignals;

    fn idle() -> Process {
        Process::new("p", "test", 1, runnable_fn(|_ctx: &mut Context<'_>| Ok(Directive::Continue)))
    }

    #[test]
    fn test_new_process_defaults() {
        let process = idle();
        assert!(process.is_running());
        assert!(process.is_skippable());
        assert_eq!(process.last_run(), None);
        assert!(!idle().with_skippable(false).is_skippable());
    }

    #[test]
    fn test_directive_transitions() {
        let mut process = idle();
        process.apply(Directive::Sleep(4), 10);
        assert_eq!(process.state(), ProcessState::Sleeping { wake_cycle: 14 });

        assert!(!process.wake_if_due(13));
        assert!(process.is_sleeping());
        assert!(process.wake_if_due(14));
        assert!(process.is_running());

        process.apply(Directive::Continue, 15);
        assert!(process.is_running());
        process.apply(Directive::Terminate, 16);
        assert!(process.is_terminated());
    }

    #[test]
    fn test_terminated_is_absorbing() {
        let mut process = idle();
        process.terminate();
        process.apply(Directive::Continue, 1);
        assert!(process.is_terminated());
        process.apply(Directive::Sleep(1), 2);
        assert!(process.is_terminated());
        assert!(!process.wake_if_due(100));
    }

    #[test]
    fn test_execute_catches_panic() {
        let mut topics = Topics::default();
        let mut store = MemoryStore::new();
        let mut ctx = Context::new(HostSignals::new(7, 10_000.0, 20.0), &mut topics, &mut store);

        let mut process = Process::new(
            "boom",
            "test",
            0,
            runnable_fn(|_ctx: &mut Context<'_>| -> Result<Directive, ProcessError> { panic!("kaboom") }),
        );
        let result = process.execute(&mut ctx);
        assert_eq!(result, Err(ProcessError::Panicked("kaboom".into())));
        assert_eq!(process.consecutive_failures(), 1);
        assert_eq!(process.last_run(), Some(7));
        assert!(process.is_running(), "failure leaves the state untouched");
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut topics = Topics::default();
        let mut store = MemoryStore::new();
        let mut ctx = Context::new(HostSignals::new(1, 10_000.0, 20.0), &mut topics, &mut store);

        let mut fail = true;
        let mut process = Process::new(
            "flaky",
            "test",
            0,
            runnable_fn(move |_ctx: &mut Context<'_>| {
                if fail {
                    fail = false;
                    Err(ProcessError::failed("first run"))
                } else {
                    Ok(Directive::Continue)
                }
            }),
        );
        assert!(process.execute(&mut ctx).is_err());
        assert_eq!(process.consecutive_failures(), 1);
        assert_eq!(process.execute(&mut ctx), Ok(Directive::Continue));
        assert_eq!(process.consecutive_failures(), 0);
    }
}
