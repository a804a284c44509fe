use flowmesh_core::FrameData;

/// Which OTel instrument kind backs a `MetricSpec` (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrument {
    Counter,
    Histogram,
    Gauge,
}

/// Whether a spec's raw per-frame values, its aggregated form, or both are
/// forwarded. The registry itself always records into whichever instruments
/// exist; `export_mode` is consulted by the allowlist/exporter layer that
/// decides what leaves the process (§4.7, §6 `OF_SAFE_METRICS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    Raw,
    Aggregated,
    Both,
}

impl Default for ExportMode {
    fn default() -> Self {
        ExportMode::Aggregated
    }
}

/// Which meter(s) a spec's instruments are created on (§4.7 SUPPLEMENT).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Otel,
    Other,
    Both,
}

impl Default for Target {
    fn default() -> Self {
        Target::Both
    }
}

/// A pure function over a frame's attached data, producing the value to
/// record or `None` to skip the metric this tick (§4.7, §9 "dynamic value_fn
/// callables ... become a closure/interface over a generic data map").
pub type ValueFn = Box<dyn Fn(&FrameData) -> Option<f64> + Send + Sync>;

/// Declarative description of one measurement derived from frame data
/// (§4.7). A filter declares a `Vec<MetricSpec>`; `TelemetryRegistry` turns
/// each into zero, one, or two live instruments.
pub struct MetricSpec {
    pub name: String,
    pub instrument: Instrument,
    pub value_fn: ValueFn,
    pub export_mode: ExportMode,
    pub target: Target,
    pub boundaries: Option<Vec<f64>>,
    pub num_buckets: usize,
}

impl MetricSpec {
    pub fn new(name: impl Into<String>, instrument: Instrument, value_fn: ValueFn) -> Self {
        Self {
            name: name.into(),
            instrument,
            value_fn,
            export_mode: ExportMode::default(),
            target: Target::default(),
            boundaries: None,
            num_buckets: 10,
        }
    }

    pub fn with_export_mode(mut self, mode: ExportMode) -> Self {
        self.export_mode = mode;
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.boundaries = Some(boundaries);
        self
    }

    pub fn with_num_buckets(mut self, num_buckets: usize) -> Self {
        self.num_buckets = num_buckets;
        self
    }
}
