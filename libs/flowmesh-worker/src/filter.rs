use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flowmesh_core::{FlowResult, FrameSet};
use flowmesh_telemetry::MetricSpec;

/// Lets `process()` request graceful shutdown without returning early —
/// "the worker accepts this at any point within `process()`" (§4.4). The
/// worker checks the flag after every `process()` call regardless of what
/// was returned.
#[derive(Clone, Default)]
pub struct ExitHandle(Arc<AtomicBool>);

impl ExitHandle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Request graceful shutdown after the current tick completes.
    pub fn exit(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn was_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// `process()`'s return value, reinterpreted by the worker's tick loop
/// (§4.4 step 4, §9 "process() may return a callable"):
///
/// - `Produced` — a frame set to publish this tick.
/// - `Empty` — produce nothing this tick; counters still advance (§8).
/// - `Deferred` — a zero-argument callable whose own result is reinterpreted
///   the same way (the source's "deferred-produce" pattern).
/// - `Stop` — clean exit (the source's `return False`).
pub enum ProcessOutcome {
    Produced(FrameSet),
    Empty,
    Deferred(Box<dyn FnOnce() -> ProcessOutcome + Send>),
    Stop,
}

impl ProcessOutcome {
    /// Resolves any chain of `Deferred` callables down to a terminal
    /// `Produced` / `Empty` / `Stop`.
    pub fn resolve(self) -> ProcessOutcome {
        let mut outcome = self;
        loop {
            match outcome {
                ProcessOutcome::Deferred(f) => outcome = f(),
                terminal => return terminal,
            }
        }
    }
}

/// One filter instance's business logic (external collaborators implement
/// this; concrete filters — camera readers, detectors, visualizers — are
/// out of scope here, §1). The worker drives a `Box<dyn Filter>` through its
/// lifecycle.
pub trait Filter: Send {
    /// Called once on `SETUP`. An error here is fatal to the worker (§4.4,
    /// §7 "Setup errors").
    fn setup(&mut self) -> FlowResult<()> {
        Ok(())
    }

    /// Called once per released tick. `exit` lets the filter request
    /// graceful shutdown mid-call without early-returning.
    fn process(&mut self, frames: &FrameSet, exit: &ExitHandle) -> FlowResult<ProcessOutcome>;

    /// Declarative metrics this filter wants recorded per tick (§4.7). Most
    /// filters have none.
    fn metric_specs(&self) -> Vec<MetricSpec> {
        Vec::new()
    }

    /// Called once while `DRAINING`, before endpoints close.
    fn teardown(&mut self) {}
}
