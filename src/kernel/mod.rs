pub mod context;
pub mod core;
pub mod process;
pub mod runtime;
pub mod scheduler;


// Re-export the primary types so `crate::kernel::*` paths stay short.
pub use self::core::Kernel;
pub use context::Context;
pub use process::{Process, ProcessState};
pub use runtime::{runnable_fn, Directive, FnRunnable, Runnable};
pub use scheduler::{ProcessTypeStats, Scheduler, TickReport};
