use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};

use flowmesh_telemetry::OtelConfig;

/// Builds the two process-wide `MeterProvider`s every worker's
/// `TelemetryRegistry` draws its `otel`/`other` instruments from (§4.7, §6
/// env vars). `other` has no concrete wire protocol in scope here (the
/// source's OpenLineage sink is an external collaborator, §1) — it is a
/// second, independent in-process provider a caller can attach its own
/// reader to; this runtime only guarantees the two meters are distinct.
///
/// The `otel` provider exports over OTLP when `OTEL_ENABLED`/the allowlist
/// file's `opentelemetry:` block enables it and supplies an endpoint (§6);
/// otherwise it is a meter with no reader attached, so every instrument call
/// is a cheap no-op.
pub fn build_meter_providers() -> (SdkMeterProvider, SdkMeterProvider) {
    let otel_provider = match flowmesh_telemetry::read_otel_config() {
        Some(cfg) if cfg.enabled && cfg.endpoint.is_some() => match build_otlp_provider(&cfg) {
            Ok(provider) => provider,
            Err(e) => {
                tracing::warn!(error = %e, "failed to build the otel exporter, metrics will not leave the process");
                SdkMeterProvider::builder().build()
            }
        },
        _ => SdkMeterProvider::builder().build(),
    };
    let other_provider = SdkMeterProvider::builder().build();
    (otel_provider, other_provider)
}

fn build_otlp_provider(cfg: &OtelConfig) -> Result<SdkMeterProvider, opentelemetry_otlp::ExporterBuildError> {
    let endpoint = cfg.endpoint.clone().expect("checked by caller");
    if !cfg.protocol.eq_ignore_ascii_case("grpc") {
        tracing::warn!(protocol = %cfg.protocol, "only the grpc OTLP transport is wired up, using it regardless");
    }

    let mut builder = MetricExporter::builder().with_tonic().with_endpoint(&endpoint);
    if let Some(headers) = &cfg.headers {
        builder = builder.with_metadata(parse_headers(headers));
    }
    let exporter = builder.build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(std::time::Duration::from_secs(cfg.export_interval_secs))
        .build();
    Ok(SdkMeterProvider::builder().with_reader(reader).build())
}

/// Parses `k1=v1,k2=v2` into gRPC metadata, mirroring
/// `OTEL_EXPORTER_OTLP_HEADERS`'s documented format (§6).
fn parse_headers(raw: &str) -> tonic::metadata::MetadataMap {
    let mut map = tonic::metadata::MetadataMap::new();
    for pair in raw.split(',') {
        let Some((k, v)) = pair.split_once('=') else { continue };
        let (k, v) = (k.trim(), v.trim());
        if k.is_empty() {
            continue;
        }
        if let (Ok(key), Ok(value)) = (
            tonic::metadata::MetadataKey::from_bytes(k.as_bytes()),
            tonic::metadata::MetadataValue::try_from(v),
        ) {
            map.insert(key, value);
        }
    }
    map
}
