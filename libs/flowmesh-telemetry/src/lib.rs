pub mod allowlist;
pub mod buckets;
pub mod error;
pub mod registry;
pub mod spec;

pub use allowlist::{filter_allowed, read_allowlist, read_otel_config, OtelConfig};
pub use error::TelemetryError;
pub use registry::TelemetryRegistry;
pub use spec::{ExportMode, Instrument, MetricSpec, Target, ValueFn};
