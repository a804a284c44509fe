use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;

use flowmesh_core::{EndpointUrl, FilterConfig, FlowError, Frame, FrameSet, Scheme};
use flowmesh_router::{Router, RouterOutcome};
use flowmesh_telemetry::TelemetryRegistry;
use flowmesh_transport::{BalanceMode, NetPublisher, NetSource, WireTick};
use opentelemetry::metrics::Meter;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::filter::{ExitHandle, Filter, ProcessOutcome};
use crate::sidechannel::{self, MetricsSample};
use crate::state::{DrainReason, WorkerState};
use crate::stats::Stats;

const OUTPUT_QUEUE_CAPACITY: usize = 8;

/// Repeated `process()` failures against the same frame ID above this count
/// drain the worker (§4.4 "same frame-ID triggers repeated failure above a
/// threshold" — the exact count is left to the implementation; see
/// DESIGN.md).
const PROCESS_FAILURE_THRESHOLD: u32 = 5;

/// What one `Worker::step_once` call produced — lets both the free-running
/// `run()` loop and a stepped runner's `step()` (§4.6) drive the same tick
/// body one iteration at a time.
#[derive(Debug)]
pub enum StepOutcome {
    Continue,
    Exited(i32),
}

/// One running filter instance: a `Router` assembling ticks from
/// `config.sources`, a `Filter` turning each tick into zero or more output
/// frames, and the publishers that carry those frames onward (component D).
pub struct Worker {
    config: FilterConfig,
    filter: Box<dyn Filter>,
    router: Router,
    outputs: Vec<(EndpointUrl, NetPublisher)>,
    metrics_sidecar: Option<(EndpointUrl, NetPublisher)>,
    telemetry: TelemetryRegistry,
    stats: Stats,
    state: WorkerState,
    tick_seq: u64,
    output_rr: usize,
    sources_timeout: Duration,
    setup_done: bool,
    consecutive_failures: HashMap<i64, u32>,
    last_metrics_at: Instant,
    synthetic_frame_id: i64,
    last_lat_in: f64,
    last_lat_out: f64,
}

impl Worker {
    /// Wires `config.sources`/`config.outputs` to live transports and builds
    /// the telemetry registry from the filter's declared `MetricSpec`s.
    /// `otel_meter`/`other_meter` are supplied by the caller (the runner),
    /// which owns the process-wide `MeterProvider`s (§4.6, §4.7 SUPPLEMENT).
    pub async fn build(
        config: FilterConfig,
        filter: Box<dyn Filter>,
        otel_meter: &Meter,
        other_meter: &Meter,
    ) -> Result<Self, WorkerError> {
        let mut sources = Vec::with_capacity(config.sources.len());
        for raw in &config.sources {
            let url = EndpointUrl::parse(raw)?;
            let source = connect_source(&url, &config.id).await?;
            sources.push((raw.clone(), url, source));
        }
        let router = Router::new(sources, config.sources_balance, config.mq_msgid_sync);

        let required: HashSet<String> = config.outputs_required.iter().cloned().collect();
        let mode = if config.outputs_balance { BalanceMode::Balanced } else { BalanceMode::Ordinary };
        let mut outputs = Vec::with_capacity(config.outputs.len());
        for raw in &config.outputs {
            let url = EndpointUrl::parse(raw)?;
            let publisher = bind_output(&url, required.clone(), mode).await?;
            outputs.push((url, publisher));
        }

        let metrics_sidecar = match &config.outputs_metrics {
            Some(raw) => {
                let url = EndpointUrl::parse(raw)?;
                let publisher = bind_output(&url, HashSet::new(), BalanceMode::Ordinary).await?;
                Some((url, publisher))
            }
            None => None,
        };

        let telemetry = TelemetryRegistry::new(otel_meter, other_meter, filter.metric_specs())?;

        // Block startup until every `outputs_required` subscriber has
        // connected, so the first released ticks are not dropped (§4.2, §4.6).
        for (_, publisher) in &outputs {
            publisher.wait_ready().await;
        }

        let sources_timeout = Duration::from_millis(config.sources_timeout);

        Ok(Self {
            config,
            filter,
            router,
            outputs,
            metrics_sidecar,
            telemetry,
            stats: Stats::new(),
            state: WorkerState::Init,
            tick_seq: 0,
            output_rr: 0,
            sources_timeout,
            setup_done: false,
            consecutive_failures: HashMap::new(),
            last_metrics_at: Instant::now(),
            synthetic_frame_id: 0,
            last_lat_in: 0.0,
            last_lat_out: 0.0,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Runs the tick loop to completion (§4.4) and returns a process-style
    /// exit code. `shutdown` is the external stop signal (SIGINT/SIGTERM
    /// relayed by the runner, or a sibling worker's propagated failure).
    pub async fn run(mut self, shutdown: CancellationToken) -> i32 {
        loop {
            match self.step_once(&shutdown).await {
                StepOutcome::Continue => {}
                StepOutcome::Exited(code) => return code,
            }
        }
    }

    /// Drives exactly one release/process/publish cycle (§4.6 "stepped
    /// runner whose `step()` drives workers for a single tick each"). The
    /// first call also runs `SETUP`. Returns `Exited` once the worker has
    /// drained and torn down; `Continue` otherwise, including on a bare
    /// `sources_timeout` with nothing releasable.
    pub async fn step_once(&mut self, shutdown: &CancellationToken) -> StepOutcome {
        if !self.setup_done {
            self.setup_done = true;
            self.state = WorkerState::Setup;
            if let Err(e) = self.filter.setup() {
                tracing::error!(filter = %self.config.id, error = %e, "setup failed");
                return StepOutcome::Exited(1);
            }
            if self.router.is_sourceless() {
                self.state = WorkerState::Running;
            }
        }

        if shutdown.is_cancelled() {
            return self.drain(DrainReason::StopSignal);
        }
        if let Some(deadline) = self.config.exit_after {
            if flowmesh_core::util::now_secs() >= deadline {
                return self.drain(DrainReason::ExitAfterDeadline);
            }
        }

        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return self.drain(DrainReason::StopSignal),
            outcome = self.router.next_tick(self.sources_timeout) => outcome,
        };

        let frames = match outcome {
            RouterOutcome::Timeout => return StepOutcome::Continue,
            RouterOutcome::EndOfStream(id) => return self.drain(DrainReason::UpstreamEndOfStream(id)),
            RouterOutcome::Tick(frames) => frames,
        };

        if self.state == WorkerState::Setup {
            self.state = WorkerState::Running;
        }

        let tick_started = Instant::now();
        self.last_lat_in = compute_in_latency(&frames);

        let exit_handle = ExitHandle::new();
        let mut drain_reason: Option<DrainReason> = None;
        let mut out_frames = FrameSet::new();
        match self.filter.process(&frames, &exit_handle) {
            Ok(outcome) => match outcome.resolve() {
                ProcessOutcome::Produced(fs) => {
                    self.consecutive_failures.clear();
                    out_frames = fs;
                }
                ProcessOutcome::Empty => {
                    self.consecutive_failures.clear();
                }
                ProcessOutcome::Stop => {
                    drain_reason = Some(DrainReason::FilterReturnedFalse);
                }
                ProcessOutcome::Deferred(_) => unreachable!("resolve() strips Deferred"),
            },
            Err(e) => {
                let id = representative_frame_id(&frames).unwrap_or(self.synthetic_frame_id);
                tracing::error!(filter = %self.config.id, frame_id = id, error = %e, "process() failed, dropping tick");
                let count = self.consecutive_failures.entry(id).or_insert(0);
                *count += 1;
                if *count > PROCESS_FAILURE_THRESHOLD {
                    drain_reason = Some(DrainReason::RepeatedProcessFailure(id));
                }
            }
        }

        if drain_reason.is_none() && exit_handle.was_requested() {
            drain_reason = Some(DrainReason::FilterRequestedExit);
        }

        if self.config.outputs_filter {
            let frame_id = representative_frame_id(&frames).unwrap_or_else(|| {
                let v = self.synthetic_frame_id;
                self.synthetic_frame_id += 1;
                v
            });
            out_frames.insert(flowmesh_core::topic::FILTER.to_string(), sidechannel::filter_frame(frame_id));
        }

        for frame in out_frames.values() {
            self.telemetry.record(frame.data());
        }

        self.publish(&out_frames);
        self.last_lat_out = tick_started.elapsed().as_secs_f64();

        if self.last_metrics_at.elapsed().as_secs_f64() >= self.config.metrics_interval {
            self.last_metrics_at = Instant::now();
            let (cpu, mem) = self.stats.sample_process();
            let sample = MetricsSample {
                ts: flowmesh_core::util::now_secs(),
                fps: self.stats.fps(),
                cpu,
                mem,
                lat_in: self.last_lat_in,
                lat_out: self.last_lat_out,
                uptime_count: self.stats.uptime_count(),
                frame_count: self.stats.frame_count(),
                megapx_count: self.stats.megapx_count(),
            };
            let extra = self.config.extra_metrics.clone();
            let metrics_frame = sidechannel::metrics_frame(&sample, &extra);
            self.publish_metrics(metrics_frame);
        }

        let megapixels: f64 = frames
            .values()
            .filter_map(|f| f.image())
            .map(|img| (img.width as f64 * img.height as f64) / 1_000_000.0)
            .sum();
        self.stats.record_tick(megapixels);

        match drain_reason {
            Some(reason) => self.drain(reason),
            None => StepOutcome::Continue,
        }
    }

    fn drain(&mut self, reason: DrainReason) -> StepOutcome {
        self.state = WorkerState::Draining;
        self.filter.teardown();
        tracing::info!(filter = %self.config.id, reason = ?reason, "draining");
        for (_, publisher) in &self.outputs {
            publisher.shutdown();
        }
        if let Some((_, publisher)) = &self.metrics_sidecar {
            publisher.shutdown();
        }
        self.state = WorkerState::Exited;
        let code = match reason {
            DrainReason::RepeatedProcessFailure(_) => 2,
            _ => 0,
        };
        StepOutcome::Exited(code)
    }

    /// Publishes `frames` to every output (or, under `outputs_balance`, to
    /// exactly one round-robin output), applying each output URL's own
    /// topic map the same way a subscriber URL would (§4.2, §4.3) — a
    /// `_metrics`/`_filter` topic only crosses an output that names it
    /// explicitly or subscribes via `*`.
    fn publish(&mut self, frames: &FrameSet) {
        if frames.is_empty() || self.outputs.is_empty() {
            return;
        }
        self.tick_seq += 1;
        let msg_id = self.tick_seq;

        if self.config.outputs_balance && self.outputs.len() > 1 {
            let idx = self.output_rr % self.outputs.len();
            self.output_rr = self.output_rr.wrapping_add(1);
            let (url, publisher) = &self.outputs[idx];
            publish_one(publisher, url, frames, msg_id);
            return;
        }
        for (url, publisher) in &self.outputs {
            publish_one(publisher, url, frames, msg_id);
        }
    }

    /// `outputs_metrics` sends `_metrics` to its own dedicated sidecar
    /// publisher instead of merging it into the main output set (§6).
    fn publish_metrics(&mut self, frame: Frame) {
        let mut set = FrameSet::new();
        set.insert(flowmesh_core::topic::METRICS.to_string(), frame);
        if self.metrics_sidecar.is_some() {
            self.tick_seq += 1;
            let msg_id = self.tick_seq;
            let (url, publisher) = self.metrics_sidecar.as_ref().expect("checked is_some above");
            publish_one(publisher, url, &set, msg_id);
        } else {
            self.publish(&set);
        }
    }
}

fn publish_one(publisher: &NetPublisher, url: &EndpointUrl, frames: &FrameSet, msg_id: u64) {
    let mut filtered = FrameSet::new();
    for (topic, frame) in frames {
        if let Some(renamed) = url.resolve(topic) {
            filtered.insert(renamed, frame.clone());
        }
    }
    if filtered.is_empty() {
        return;
    }
    match WireTick::from_frame_set(msg_id, &filtered) {
        Ok(tick) => publisher.publish(tick),
        Err(e) => tracing::warn!(error = %e, "failed to encode outgoing tick"),
    }
}

fn representative_frame_id(frames: &FrameSet) -> Option<i64> {
    frames.values().find_map(|f| f.metadata().id)
}

fn compute_in_latency(frames: &FrameSet) -> f64 {
    let now = flowmesh_core::util::now_secs();
    frames.values().map(|f| (now - f.metadata().ts).max(0.0)).fold(0.0_f64, f64::max)
}

async fn connect_source(url: &EndpointUrl, id: &str) -> Result<NetSource, WorkerError> {
    match url.scheme {
        Scheme::Tcp => {
            let port = url
                .port
                .ok_or_else(|| FlowError::config(format!("tcp source '{}' missing port", url.authority)))?;
            Ok(NetSource::connect_tcp(url.authority.clone(), port, id.to_string()).await)
        }
        Scheme::Ipc => Ok(NetSource::bind_ipc(PathBuf::from(&url.authority)).await?),
        Scheme::Ref => Err(unresolved_reference(&url.authority).into()),
    }
}

async fn bind_output(url: &EndpointUrl, required: HashSet<String>, mode: BalanceMode) -> Result<NetPublisher, WorkerError> {
    match url.scheme {
        Scheme::Tcp => {
            let port = url
                .port
                .ok_or_else(|| FlowError::config(format!("tcp output '{}' missing port", url.authority)))?;
            Ok(NetPublisher::bind_tcp(&url.authority, port, required, mode, OUTPUT_QUEUE_CAPACITY).await?)
        }
        Scheme::Ipc => Ok(NetPublisher::connect_ipc(PathBuf::from(&url.authority), mode, OUTPUT_QUEUE_CAPACITY).await?),
        Scheme::Ref => Err(unresolved_reference(&url.authority).into()),
    }
}

fn unresolved_reference(authority: &str) -> FlowError {
    FlowError::setup(format!(
        "bare filter reference '{authority}' must be resolved to a concrete endpoint before the worker starts"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmesh_core::{FrameData, Metadata};
    use serde_json::json;

    fn frames_with_id(id: i64) -> FrameSet {
        let mut fs = FrameSet::new();
        fs.insert("main".into(), Frame::data_only(Metadata::now(Some(id)), FrameData::new()));
        fs
    }

    #[test]
    fn representative_id_falls_back_when_absent() {
        let mut fs = FrameSet::new();
        fs.insert("main".into(), Frame::data_only(Metadata::now(None), FrameData::new()));
        assert_eq!(representative_frame_id(&fs), None);

        let with_id = frames_with_id(9);
        assert_eq!(representative_frame_id(&with_id), Some(9));
    }

    #[test]
    fn in_latency_is_never_negative() {
        let mut fs = FrameSet::new();
        let future_ts = flowmesh_core::util::now_secs() + 10.0;
        fs.insert(
            "main".into(),
            Frame::data_only(Metadata { ts: future_ts, id: None, extra: Default::default() }, FrameData::new()),
        );
        assert_eq!(compute_in_latency(&fs), 0.0);
    }

    #[test]
    fn metrics_set_carries_the_reserved_topic_key() {
        let mut set = FrameSet::new();
        set.insert(flowmesh_core::topic::METRICS.to_string(), Frame::data_only(Metadata::now(None), FrameData::new()));
        assert!(set.contains_key(flowmesh_core::topic::METRICS));
        let _ = json!(1);
    }
}
