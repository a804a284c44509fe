//! End-to-end scenarios driving real `Worker`s over real loopback TCP
//! sockets through a `SteppedRunner`, one release/process/publish cycle at a
//! time (§8 "seed test" scenarios). Each filter here is a minimal stand-in
//! for the external collaborators the fabric itself never implements (§1).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use flowmesh_core::{topic, FilterConfig, Frame, FrameData, FrameSet, FlowResult, Metadata, MqLog};
use flowmesh_runner::{RunnerEntry, SteppedRunner};
use flowmesh_worker::{ExitHandle, Filter, ProcessOutcome, WorkerState};
use serde_json::{json, Map};

fn cfg(id: &str, sources: Vec<&str>, outputs: Vec<&str>) -> FilterConfig {
    FilterConfig {
        id: id.into(),
        sources: sources.into_iter().map(String::from).collect(),
        sources_balance: false,
        sources_timeout: 2_000,
        sources_low_latency: false,
        outputs: outputs.into_iter().map(String::from).collect(),
        outputs_balance: false,
        outputs_timeout: 1_000,
        outputs_required: vec![],
        outputs_metrics: None,
        outputs_jpg: false,
        outputs_filter: true,
        exit_after: None,
        environment: BTreeMap::new(),
        log_path: None,
        metrics_interval: 10.0,
        extra_metrics: Map::new(),
        mq_log: MqLog::Pretty,
        mq_msgid_sync: true,
    }
}

async fn run_to_completion(mut runner: SteppedRunner) -> Vec<i32> {
    loop {
        if let Some(codes) = runner.step().await {
            return codes;
        }
    }
}

/// Emits `count` 0..limit on `main`, one per tick, then stops.
struct CountingProducer {
    next: i64,
    limit: i64,
}

impl CountingProducer {
    fn new(limit: i64) -> Self {
        Self { next: 0, limit }
    }
}

impl Filter for CountingProducer {
    fn process(&mut self, _frames: &FrameSet, _exit: &ExitHandle) -> FlowResult<ProcessOutcome> {
        if self.next >= self.limit {
            return Ok(ProcessOutcome::Stop);
        }
        let mut data = FrameData::new();
        data.insert("count".into(), json!(self.next));
        let mut fs = FrameSet::new();
        fs.insert(topic::MAIN.to_string(), Frame::data_only(Metadata::now(Some(self.next)), data));
        self.next += 1;
        Ok(ProcessOutcome::Produced(fs))
    }
}

/// Records the `count` field of whatever arrives on `topic`, produces nothing.
struct Recorder {
    topic: &'static str,
    seen: Arc<Mutex<Vec<i64>>>,
}

impl Filter for Recorder {
    fn process(&mut self, frames: &FrameSet, _exit: &ExitHandle) -> FlowResult<ProcessOutcome> {
        if let Some(count) = frames.get(self.topic).and_then(|f| f.data().get("count")).and_then(|v| v.as_i64()) {
            self.seen.lock().expect("recorder mutex poisoned").push(count);
        }
        Ok(ProcessOutcome::Empty)
    }
}

/// Forwards `main` unchanged, adding `offset` to `count` — stands in for a
/// transform stage between a producer and a joiner.
struct Offset {
    offset: i64,
}

impl Filter for Offset {
    fn process(&mut self, frames: &FrameSet, _exit: &ExitHandle) -> FlowResult<ProcessOutcome> {
        let mut fs = FrameSet::new();
        if let Some(frame) = frames.get(topic::MAIN) {
            let count = frame.data().get("count").and_then(|v| v.as_i64()).unwrap_or(0);
            let mut data = FrameData::new();
            data.insert("count".into(), json!(count + self.offset));
            fs.insert(topic::MAIN.to_string(), Frame::data_only(frame.metadata().clone(), data));
        }
        Ok(ProcessOutcome::Produced(fs))
    }
}

/// Joins two renamed sibling topics into one recorded pair.
struct PairJoiner {
    left: &'static str,
    right: &'static str,
    seen: Arc<Mutex<Vec<(i64, i64)>>>,
}

impl Filter for PairJoiner {
    fn process(&mut self, frames: &FrameSet, _exit: &ExitHandle) -> FlowResult<ProcessOutcome> {
        let left = frames.get(self.left).and_then(|f| f.data().get("count")).and_then(|v| v.as_i64());
        let right = frames.get(self.right).and_then(|f| f.data().get("count")).and_then(|v| v.as_i64());
        if let (Some(left), Some(right)) = (left, right) {
            self.seen.lock().expect("joiner mutex poisoned").push((left, right));
        }
        Ok(ProcessOutcome::Empty)
    }
}

/// Never produces anything — a permanently silent sibling for exercising the
/// ephemeral-source-never-blocks rule.
struct Silent;

impl Filter for Silent {
    fn process(&mut self, _frames: &FrameSet, _exit: &ExitHandle) -> FlowResult<ProcessOutcome> {
        Ok(ProcessOutcome::Empty)
    }
}

fn entry(config: FilterConfig, filter: impl Filter + 'static) -> RunnerEntry {
    (config, Box::new(filter))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn linear_pipeline_delivers_every_tick_in_order() {
    let mut producer_cfg = cfg("producer", vec![], vec!["tcp://127.0.0.1:18821"]);
    producer_cfg.outputs_required = vec!["consumer".into()];
    let consumer_cfg = cfg("consumer", vec!["tcp://127.0.0.1:18821"], vec![]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let entries = vec![
        entry(producer_cfg, CountingProducer::new(5)),
        entry(consumer_cfg, Recorder { topic: topic::MAIN, seen: seen.clone() }),
    ];

    let runner = SteppedRunner::build(entries).await.expect("workers build");
    let codes = run_to_completion(runner).await;

    assert_eq!(codes, vec![0, 0]);
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tee_fan_out_delivers_the_same_sequence_to_every_subscriber() {
    let mut producer_cfg = cfg("producer", vec![], vec!["tcp://127.0.0.1:18822"]);
    producer_cfg.outputs_required = vec!["left".into(), "right".into()];
    let left_cfg = cfg("left", vec!["tcp://127.0.0.1:18822"], vec![]);
    let right_cfg = cfg("right", vec!["tcp://127.0.0.1:18822"], vec![]);

    let left_seen = Arc::new(Mutex::new(Vec::new()));
    let right_seen = Arc::new(Mutex::new(Vec::new()));
    let entries = vec![
        entry(producer_cfg, CountingProducer::new(5)),
        entry(left_cfg, Recorder { topic: topic::MAIN, seen: left_seen.clone() }),
        entry(right_cfg, Recorder { topic: topic::MAIN, seen: right_seen.clone() }),
    ];

    let runner = SteppedRunner::build(entries).await.expect("workers build");
    let codes = run_to_completion(runner).await;

    assert_eq!(codes, vec![0, 0, 0]);
    assert_eq!(*left_seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(*right_seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tee_then_rejoin_pairs_each_ticks_two_transformed_siblings() {
    let mut producer_cfg = cfg("producer", vec![], vec!["tcp://127.0.0.1:18823"]);
    producer_cfg.outputs_required = vec!["double".into(), "negate".into()];
    let mut double_cfg = cfg("double", vec!["tcp://127.0.0.1:18823"], vec!["tcp://127.0.0.1:18824"]);
    double_cfg.outputs_required = vec!["joiner".into()];
    let mut negate_cfg = cfg("negate", vec!["tcp://127.0.0.1:18823"], vec!["tcp://127.0.0.1:18825"]);
    negate_cfg.outputs_required = vec!["joiner".into()];
    let joiner_cfg = cfg(
        "joiner",
        vec!["tcp://127.0.0.1:18824;>doubled", "tcp://127.0.0.1:18825;>negated"],
        vec![],
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let entries = vec![
        entry(producer_cfg, CountingProducer::new(5)),
        entry(double_cfg, Offset { offset: 0 }),
        entry(negate_cfg, Offset { offset: 100 }),
        entry(joiner_cfg, PairJoiner { left: "doubled", right: "negated", seen: seen.clone() }),
    ];

    let runner = SteppedRunner::build(entries).await.expect("workers build");
    let codes = run_to_completion(runner).await;

    assert_eq!(codes, vec![0, 0, 0, 0]);
    assert_eq!(*seen.lock().unwrap(), vec![(0, 100), (1, 101), (2, 102), (3, 103), (4, 104)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn balanced_pool_of_three_splits_and_reunites_every_tick() {
    let mut producer_cfg = cfg("producer", vec![], vec!["tcp://127.0.0.1:18826"]);
    producer_cfg.outputs_balance = true;
    producer_cfg.outputs_required = vec!["worker-a".into(), "worker-b".into(), "worker-c".into()];

    let mut worker_a = cfg("worker-a", vec!["tcp://127.0.0.1:18826"], vec!["tcp://127.0.0.1:18829"]);
    worker_a.outputs_required = vec!["aggregator".into()];
    let mut worker_b = cfg("worker-b", vec!["tcp://127.0.0.1:18826"], vec!["tcp://127.0.0.1:18830"]);
    worker_b.outputs_required = vec!["aggregator".into()];
    let mut worker_c = cfg("worker-c", vec!["tcp://127.0.0.1:18826"], vec!["tcp://127.0.0.1:18831"]);
    worker_c.outputs_required = vec!["aggregator".into()];

    let mut aggregator_cfg = cfg(
        "aggregator",
        vec!["tcp://127.0.0.1:18829", "tcp://127.0.0.1:18830", "tcp://127.0.0.1:18831"],
        vec![],
    );
    aggregator_cfg.sources_balance = true;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let entries = vec![
        entry(producer_cfg, CountingProducer::new(9)),
        entry(worker_a, Offset { offset: 0 }),
        entry(worker_b, Offset { offset: 0 }),
        entry(worker_c, Offset { offset: 0 }),
        entry(aggregator_cfg, Recorder { topic: topic::MAIN, seen: seen.clone() }),
    ];

    let runner = SteppedRunner::build(entries).await.expect("workers build");
    let codes = run_to_completion(runner).await;

    assert_eq!(codes, vec![0, 0, 0, 0, 0]);
    let mut got = seen.lock().unwrap().clone();
    got.sort();
    assert_eq!(got, (0..9).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ephemeral_sibling_never_blocks_release() {
    let mut producer_cfg = cfg("producer", vec![], vec!["tcp://127.0.0.1:18832"]);
    producer_cfg.outputs_required = vec!["joiner".into()];
    let silent_cfg = cfg("silent", vec![], vec!["tcp://127.0.0.1:18833"]);
    let joiner_cfg = cfg(
        "joiner",
        vec!["tcp://127.0.0.1:18832", "tcp://127.0.0.1:18833?;>other"],
        vec![],
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let entries = vec![
        entry(producer_cfg, CountingProducer::new(5)),
        entry(silent_cfg, Silent),
        entry(joiner_cfg, Recorder { topic: topic::MAIN, seen: seen.clone() }),
    ];

    let mut runner = SteppedRunner::build(entries).await.expect("workers build");
    let codes = loop {
        if let Some(codes) = runner.step().await {
            break codes;
        }
        // the silent producer has no upstream and nothing ever stops it on
        // its own; once its siblings are done, end the test the way an
        // external stop signal would (§4.6).
        if runner.state_of("producer") == Some(WorkerState::Exited)
            && runner.state_of("joiner") == Some(WorkerState::Exited)
        {
            runner.stop_all();
        }
    };

    assert_eq!(codes, vec![0, 0, 0]);
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn metrics_subscription_carries_every_required_key() {
    let mut producer_cfg = cfg("producer", vec![], vec!["tcp://127.0.0.1:18834"]);
    producer_cfg.metrics_interval = 0.0;
    producer_cfg.outputs_required = vec!["metrics-subscriber".into()];
    let subscriber_cfg = cfg("metrics-subscriber", vec!["tcp://127.0.0.1:18834;_metrics"], vec![]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let entries = vec![
        entry(producer_cfg, CountingProducer::new(2)),
        entry(subscriber_cfg, MetricsRecorder { seen: seen.clone() }),
    ];

    let runner = SteppedRunner::build(entries).await.expect("workers build");
    let codes = run_to_completion(runner).await;

    assert_eq!(codes, vec![0, 0]);
    let frames = seen.lock().unwrap();
    assert!(!frames.is_empty(), "expected at least one _metrics frame");
    for data in frames.iter() {
        for key in ["ts", "fps", "cpu", "mem", "lat_in", "lat_out", "uptime_count", "frame_count", "megapx_count"] {
            assert!(data.contains_key(key), "missing metrics key {key}");
        }
    }
}

struct MetricsRecorder {
    seen: Arc<Mutex<Vec<FrameData>>>,
}

impl Filter for MetricsRecorder {
    fn process(&mut self, frames: &FrameSet, _exit: &ExitHandle) -> FlowResult<ProcessOutcome> {
        if let Some(frame) = frames.get(topic::METRICS) {
            self.seen.lock().expect("metrics recorder mutex poisoned").push(frame.data().clone());
        }
        Ok(ProcessOutcome::Empty)
    }
}
