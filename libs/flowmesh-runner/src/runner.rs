use std::collections::HashMap;

use flowmesh_core::FilterConfig;
use flowmesh_worker::{Filter, StepOutcome, Worker};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::RunnerError;
use crate::graph::{self, DependencyGraph};
use crate::meters::build_meter_providers;
use crate::options::{PropExit, RunnerOptions, StopExit};

/// One filter's config plus its business-logic implementation — the unit
/// `Runner`/`SteppedRunner` take a list of (§4.6 "launches a list of
/// `(filter-class, config)` tuples").
pub type RunnerEntry = (FilterConfig, Box<dyn Filter>);

/// The multi-process runner (component F). In this typed-library rendition
/// "process" is a long-lived `tokio` task per worker rather than an OS
/// process — see DESIGN.md's Open Question note: a `Box<dyn Filter>` cannot
/// cross a real process boundary without its own IPC story, and §9 already
/// directs "coroutines in the source are replaced by tasks + channels".
/// Each worker still only talks to its peers through the transport (§5), so
/// the isolation that matters — no shared mutable state outside the wire —
/// holds regardless of the task/process distinction.
pub struct Runner;

impl Runner {
    /// Starts every entry, wires bare filter-id references (§4.6, via
    /// [`graph::resolve_references`]), and drives the whole pipeline to
    /// completion: readiness gating happens inside each `Worker::build`
    /// (publishers with `outputs_required` block until their subscribers
    /// connect, §4.2); shutdown propagation and the exit deadline are
    /// handled here. Returns one exit code per entry, in declaration order
    /// (§4.6 "Return value").
    pub async fn run_multi(entries: Vec<RunnerEntry>, options: RunnerOptions) -> Result<Vec<i32>, RunnerError> {
        let mut configs: Vec<FilterConfig> = entries.iter().map(|(c, _)| c.clone()).collect();
        let graph = graph::resolve_references(&mut configs)?;
        let order: Vec<String> = configs.iter().map(|c| c.id.clone()).collect();

        let (otel_provider, other_provider) = build_meter_providers();
        let otel_meter = otel_provider.meter("flowmesh");
        let other_meter = other_provider.meter("flowmesh");

        let root_token = CancellationToken::new();
        let tokens: HashMap<String, CancellationToken> =
            order.iter().map(|id| (id.clone(), root_token.child_token())).collect();

        let mut join_set: JoinSet<(String, i32)> = JoinSet::new();
        for (config, (_, filter)) in configs.into_iter().zip(entries.into_iter()) {
            let id = config.id.clone();
            let token = tokens[&id].clone();
            let otel_meter = otel_meter.clone();
            let other_meter = other_meter.clone();
            join_set.spawn(async move {
                let worker = match Worker::build(config, filter, &otel_meter, &other_meter).await {
                    Ok(w) => w,
                    Err(e) => {
                        tracing::error!(filter = %id, error = %e, "setup failed, worker will not run");
                        return (id, 1);
                    }
                };
                let code = worker.run(token).await;
                (id, code)
            });
        }

        let mut exit_codes: HashMap<String, i32> = HashMap::new();
        let mut deadline: Option<Instant> = None;
        let mut signal_received = false;

        while exit_codes.len() < order.len() {
            let sleep = async {
                match deadline {
                    Some(d) => tokio::time::sleep_until(d).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;

                _ = sleep, if deadline.is_some() => {
                    if matches!(options.stop_exit, StopExit::All) {
                        tracing::warn!("exit_time elapsed with workers still running, hard-terminating");
                        join_set.abort_all();
                        while join_set.join_next().await.is_some() {}
                        for id in &order {
                            exit_codes.entry(id.clone()).or_insert(HARD_KILL_CODE);
                        }
                    }
                    deadline = None;
                }

                _ = external_stop_requested(), if !signal_received => {
                    signal_received = true;
                    tracing::info!("received stop signal, propagating graceful shutdown to all workers");
                    for token in tokens.values() {
                        token.cancel();
                    }
                    deadline.get_or_insert_with(|| Instant::now() + options.exit_time);
                }

                res = join_set.join_next(), if !join_set.is_empty() => {
                    let Some(res) = res else { continue };
                    match res {
                        Ok((id, code)) => {
                            exit_codes.insert(id.clone(), code);
                            propagate(&options, &graph, &id, &tokens);
                            if deadline.is_none() && exit_codes.len() < order.len() {
                                deadline = Some(Instant::now() + options.exit_time);
                            }
                        }
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => tracing::warn!(error = %e, "worker task panicked"),
                    }
                }
            }
        }

        Ok(order.iter().map(|id| exit_codes.get(id).copied().unwrap_or(HARD_KILL_CODE)).collect())
    }
}

const HARD_KILL_CODE: i32 = 137;

fn propagate(options: &RunnerOptions, graph: &DependencyGraph, ended: &str, tokens: &HashMap<String, CancellationToken>) {
    let cancel = |id: &str| {
        if let Some(t) = tokens.get(id) {
            t.cancel();
        }
    };
    match options.prop_exit {
        PropExit::None => {}
        PropExit::All => {
            for id in tokens.keys() {
                cancel(id);
            }
        }
        PropExit::Upstream => graph.upstream_of(ended).for_each(|id| cancel(id)),
        PropExit::Downstream => graph.downstream_of(ended).for_each(|id| cancel(id)),
    }
}

/// Waits for SIGINT (`ctrl_c`, portable) or, on unix, SIGTERM — "`SIGINT`/
/// `SIGTERM` on the runner → graceful stop to all workers" (§4.6).
async fn external_stop_requested() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler, only SIGINT will be honored");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Drives a set of already-built workers one tick at a time, used for
/// deterministic tests (§4.6 "a stepped runner whose `step()` drives workers
/// for a single tick each"). Unlike [`Runner`], readiness/shutdown
/// propagation policy is the test's responsibility — call [`SteppedRunner::stop_all`]
/// to simulate an external stop signal.
pub struct SteppedRunner {
    order: Vec<String>,
    workers: HashMap<String, Worker>,
    tokens: HashMap<String, CancellationToken>,
    exit_codes: HashMap<String, i32>,
}

impl SteppedRunner {
    pub async fn build(entries: Vec<RunnerEntry>) -> Result<Self, RunnerError> {
        let mut configs: Vec<FilterConfig> = entries.iter().map(|(c, _)| c.clone()).collect();
        graph::resolve_references(&mut configs)?;

        let (otel_provider, other_provider) = build_meter_providers();
        let otel_meter = otel_provider.meter("flowmesh-stepped");
        let other_meter = other_provider.meter("flowmesh-stepped");

        let order: Vec<String> = configs.iter().map(|c| c.id.clone()).collect();
        let tokens: HashMap<String, CancellationToken> =
            order.iter().map(|id| (id.clone(), CancellationToken::new())).collect();

        // Built concurrently, not one at a time: a producer whose
        // `outputs_required` names this test's consumer would otherwise
        // deadlock waiting on a subscriber that hasn't been built yet (§4.6
        // "starts all workers near-simultaneously and lets publishers gate
        // themselves").
        let mut join_set: JoinSet<(String, Result<Worker, flowmesh_worker::WorkerError>)> = JoinSet::new();
        for (config, (_, filter)) in configs.into_iter().zip(entries.into_iter()) {
            let id = config.id.clone();
            let otel_meter = otel_meter.clone();
            let other_meter = other_meter.clone();
            join_set.spawn(async move {
                let result = Worker::build(config, filter, &otel_meter, &other_meter).await;
                (id, result)
            });
        }
        let mut workers = HashMap::with_capacity(order.len());
        while let Some(res) = join_set.join_next().await {
            let (id, result) = res.expect("worker build task panicked");
            workers.insert(id, result?);
        }

        Ok(Self { order, workers, tokens, exit_codes: HashMap::new() })
    }

    /// Simulates the runner's external-stop-signal path (§4.6) for every
    /// worker that has not already exited.
    pub fn stop_all(&self) {
        for token in self.tokens.values() {
            token.cancel();
        }
    }

    pub fn state_of(&self, id: &str) -> Option<flowmesh_worker::WorkerState> {
        self.workers.get(id).map(Worker::state)
    }

    /// Drives every still-running worker through exactly one `step_once`.
    /// Returns `None` while any worker remains alive; `Some(codes)` in
    /// declaration order once all have exited.
    pub async fn step(&mut self) -> Option<Vec<i32>> {
        for id in self.order.clone() {
            if self.exit_codes.contains_key(&id) {
                continue;
            }
            let worker = self.workers.get_mut(&id).expect("worker present for every declared id");
            let token = self.tokens.get(&id).expect("token present for every declared id").clone();
            if let StepOutcome::Exited(code) = worker.step_once(&token).await {
                self.exit_codes.insert(id, code);
            }
        }
        if self.order.iter().all(|id| self.exit_codes.contains_key(id)) {
            Some(self.order.iter().map(|id| self.exit_codes[id]).collect())
        } else {
            None
        }
    }
}
