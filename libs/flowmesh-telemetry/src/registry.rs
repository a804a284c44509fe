use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use opentelemetry::metrics::{Counter, Histogram, Meter, ObservableGauge};

use flowmesh_core::FrameData;

use crate::buckets::generate_log_spaced;
use crate::error::TelemetryError;
use crate::spec::{Instrument, MetricSpec, Target};

enum LiveInstrument {
    Counter(Counter<f64>),
    Histogram(Histogram<f64>),
    /// Gauges are push-model here: an atomic last-value cell the worker
    /// updates synchronously, observed by an OTel callback at export time
    /// (§4.7 SUPPLEMENT). The `ObservableGauge` handle is kept alive
    /// alongside the cell — dropping it would unregister the callback.
    Gauge(Arc<AtomicU64>, ObservableGauge<f64>),
}

struct RegisteredSpec {
    spec: MetricSpec,
    otel: Option<LiveInstrument>,
    other: Option<LiveInstrument>,
}

/// Owns zero, one, or two instruments per `MetricSpec` — one per requested
/// export target — and fans `record()` calls into whichever exist (§4.7).
pub struct TelemetryRegistry {
    specs: Vec<RegisteredSpec>,
}

impl TelemetryRegistry {
    /// `otel_meter` backs `target: otel`, `other_meter` backs `target:
    /// other` — independent meters, per `original_source`'s two-meter split
    /// between the OTLP exporter and the business-metrics sink.
    pub fn new(otel_meter: &Meter, other_meter: &Meter, specs: Vec<MetricSpec>) -> Result<Self, TelemetryError> {
        let mut registered = Vec::with_capacity(specs.len());
        for spec in specs {
            let otel = if matches!(spec.target, Target::Otel | Target::Both) {
                Some(create_instrument(otel_meter, &spec)?)
            } else {
                None
            };
            let other = if matches!(spec.target, Target::Other | Target::Both) {
                Some(create_instrument(other_meter, &spec)?)
            } else {
                None
            };
            registered.push(RegisteredSpec { spec, otel, other });
        }
        Ok(Self { specs: registered })
    }

    /// Records one frame's contribution to every spec whose `value_fn`
    /// returns `Some` (§4.7). A spec with no live instrument on either
    /// target is skipped, matching the source's `if not any(spec._otel_inst)`.
    pub fn record(&self, data: &FrameData) {
        for registered in &self.specs {
            if registered.otel.is_none() && registered.other.is_none() {
                continue;
            }
            let Some(value) = (registered.spec.value_fn)(data) else { continue };
            if let Some(inst) = &registered.otel {
                record_one(inst, value);
            }
            if let Some(inst) = &registered.other {
                record_one(inst, value);
            }
        }
    }

    pub fn spec_names(&self) -> Vec<&str> {
        self.specs.iter().map(|r| r.spec.name.as_str()).collect()
    }
}

fn create_instrument(meter: &Meter, spec: &MetricSpec) -> Result<LiveInstrument, TelemetryError> {
    match spec.instrument {
        Instrument::Counter => Ok(LiveInstrument::Counter(meter.f64_counter(spec.name.clone()).build())),
        Instrument::Histogram => {
            let boundaries = match &spec.boundaries {
                Some(b) => b.clone(),
                None => generate_log_spaced(&spec.name, spec.num_buckets)?,
            };
            Ok(LiveInstrument::Histogram(
                meter.f64_histogram(spec.name.clone()).with_boundaries(boundaries).build(),
            ))
        }
        Instrument::Gauge => {
            let cell = Arc::new(AtomicU64::new(0));
            let observed = cell.clone();
            let gauge = meter
                .f64_observable_gauge(spec.name.clone())
                .with_callback(move |observer| {
                    observer.observe(f64::from_bits(observed.load(Ordering::Relaxed)), &[]);
                })
                .build();
            Ok(LiveInstrument::Gauge(cell, gauge))
        }
    }
}

fn record_one(inst: &LiveInstrument, value: f64) {
    match inst {
        LiveInstrument::Counter(c) => c.add(value, &[]),
        LiveInstrument::Histogram(h) => h.record(value, &[]),
        LiveInstrument::Gauge(cell, _handle) => cell.store(value.to_bits(), Ordering::Relaxed),
    }
}
