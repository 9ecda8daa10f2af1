#![no_main]

use libfuzzer_sys::fuzz_target;
use colony_kernel::{
    runnable_fn, Context, Directive, HostSignals, Kernel, KernelConfig, ManualClock, MemoryStore, Process,
    ProcessError,
};

#[derive(Debug, Clone, arbitrary::Arbitrary)]
enum Action {
    Continue,
    Sleep(u8),
    Terminate,
    Fail,
}

#[derive(Debug, Clone, arbitrary::Arbitrary)]
struct FuzzProcess {
    priority: u8,
    skippable: bool,
    cost_ms: u8,
    script: Vec<Action>,
}

#[derive(Debug, Clone, arbitrary::Arbitrary)]
struct FuzzInput {
    processes: Vec<FuzzProcess>,
    cycles: Vec<(u16, u8, Option<u8>)>,
}

fuzz_target!(|input: FuzzInput| {
    let clock = ManualClock::new();
    let mut kernel = Kernel::with_parts(KernelConfig::default(), clock.clone(), MemoryStore::new());

    for (n, entry) in input.processes.into_iter().take(64).enumerate() {
        let clock = clock.clone();
        let mut script = entry.script.into_iter().cycle().take(256);
        let cost = f64::from(entry.cost_ms) / 10.0;
        let process = Process::new(
            format!("p{}", n),
            "fuzz",
            u32::from(entry.priority),
            runnable_fn(move |_ctx: &mut Context<'_>| {
                clock.advance(cost);
                match script.next() {
                    None | Some(Action::Continue) => Ok(Directive::Continue),
                    Some(Action::Sleep(n)) => Ok(Directive::Sleep(u64::from(n))),
                    Some(Action::Terminate) => Ok(Directive::Terminate),
                    Some(Action::Fail) => Err(ProcessError::failed("scripted")),
                }
            }),
        )
        .with_skippable(entry.skippable);
        kernel.register_process(process).expect("unique ids");
    }

    let mut cycle = 0u64;
    for (reserve, limit, throttle) in input.cycles.into_iter().take(64) {
        cycle += 1;
        let before = kernel.scheduler.len();
        let mut host = HostSignals::new(cycle, f64::from(reserve), f64::from(limit));
        if let Some(t) = throttle {
            host = host.with_throttle(f64::from(t));
        }
        let report = kernel.tick(host);
        assert!(report.budget_ms <= f64::from(limit) + f64::EPSILON);
        assert!(report.ran as usize + report.skipped as usize + report.shed as usize <= before);
        assert_eq!(kernel.scheduler.len(), before - report.removed as usize);
        assert!(kernel.scheduler.process_ids().all(|id| !kernel.get_process(id).map_or(true, Process::is_terminated)));
    }
});
