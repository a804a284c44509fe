/// The per-filter lifecycle state machine (§4.4).
///
/// `INIT→SETUP` happens on worker start after config normalization;
/// `SETUP→RUNNING` once the router sees its first releasable tick (or
/// immediately for a sources-less producer); `RUNNING→DRAINING` on upstream
/// end-of-stream, an external stop signal, `exit_after`, or the filter
/// calling `exit()`; `DRAINING→EXITED` once outputs are flushed and
/// endpoints closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Init,
    Setup,
    Running,
    Draining,
    Exited,
}

/// Why the worker entered `DRAINING` — used for logging and to pick the exit
/// code (§7 "a single failure triggers pipeline-wide stop based on
/// `prop_exit`" is a runner-level decision; this is the worker-local reason).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainReason {
    UpstreamEndOfStream(String),
    StopSignal,
    ExitAfterDeadline,
    FilterRequestedExit,
    FilterReturnedFalse,
    RepeatedProcessFailure(i64),
}
