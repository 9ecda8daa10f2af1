//! Runnable abstraction.
//!
//! A `Runnable` is the pluggable unit of work a `Process` executes once per
//! eligible cycle. It reads and writes shared state only through the
//! `Context` it is handed, and tells the scheduler what to do next through
//! the returned `Directive`.

use crate::error::ProcessError;
use crate::kernel::context::Context;
use crate::types::Cycle;

/// Lifecycle directive returned by a runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Directive {
    /// Stay Running; eligible again next cycle.
    Continue,
    /// Sleep until `now + n`.
    Sleep(Cycle),
    /// Retire the process. It never runs again.
    Terminate,
}

/// Trait implemented by units of work.
///
/// Returning `Err` (or panicking) is an unexpected failure: it is logged with
/// the process identity and the process keeps its current state, to be
/// retried on its next eligible cycle. Work that no longer applies should
/// return `Ok(Directive::Terminate)` instead.
pub trait Runnable {
    fn run(&mut self, ctx: &mut Context<'_>) -> Result<Directive, ProcessError>;
}

impl<R: Runnable + ?Sized> Runnable for Box<R> {
    fn run(&mut self, ctx: &mut Context<'_>) -> Result<Directive, ProcessError> {
        (**self).run(ctx)
    }
}

/// Adapts a closure into a `Runnable`.
pub struct FnRunnable<F>(F);

impl<F> Runnable for FnRunnable<F>
where
    F: FnMut(&mut Context<'_>) -> Result<Directive, ProcessError>,
{
    fn run(&mut self, ctx: &mut Context<'_>) -> Result<Directive, ProcessError> {
        (self.0)(ctx)
    }
}

/// Builds a runnable from a closure.
pub fn runnable_fn<F>(f: F) -> FnRunnable<F>
where
    F: FnMut(&mut Context<'_>) -> Result<Directive, ProcessError>,
{
    FnRunnable(f)
}
