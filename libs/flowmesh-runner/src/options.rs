use std::time::Duration;

/// Which neighbors get a graceful-stop signal when one worker ends (§4.6).
/// "Upstream" means the peers this worker reads from (its `sources`);
/// "downstream" means the peers that declare this worker as one of theirs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropExit {
    All,
    None,
    Upstream,
    Downstream,
}

impl Default for PropExit {
    fn default() -> Self {
        PropExit::All
    }
}

/// Whether the runner hard-terminates still-running peers once `exit_time`
/// elapses after the first worker's graceful stop (§4.6). `None` disables
/// the cap entirely — the runner waits as long as it takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopExit {
    All,
    None,
}

impl Default for StopExit {
    fn default() -> Self {
        StopExit::All
    }
}

/// Runner-wide shutdown policy knobs (§4.6).
#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    pub prop_exit: PropExit,
    pub stop_exit: StopExit,
    pub exit_time: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self { prop_exit: PropExit::default(), stop_exit: StopExit::default(), exit_time: Duration::from_secs(10) }
    }
}
