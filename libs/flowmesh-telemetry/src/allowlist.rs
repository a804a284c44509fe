use std::collections::HashSet;

use serde::Deserialize;

/// `opentelemetry:` block of `OF_SAFE_METRICS_FILE`, or the env-var fallback
/// (§6). Mirrors `original_source/openfilter/observability/config.py::read_otel_config`.
#[derive(Debug, Clone, PartialEq)]
pub struct OtelConfig {
    pub endpoint: Option<String>,
    pub headers: Option<String>,
    pub protocol: String,
    pub export_interval_secs: u64,
    pub enabled: bool,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self { endpoint: None, headers: None, protocol: "grpc".to_string(), export_interval_secs: 30, enabled: true }
    }
}

#[derive(Debug, Deserialize, Default)]
struct AllowlistFile {
    #[serde(default)]
    safe_metrics: Vec<String>,
    #[serde(default)]
    opentelemetry: Option<OtelFileSection>,
}

#[derive(Debug, Deserialize, Default)]
struct OtelFileSection {
    endpoint: Option<String>,
    headers: Option<String>,
    #[serde(default = "default_protocol")]
    protocol: String,
    #[serde(default = "default_export_interval")]
    export_interval: u64,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_protocol() -> String {
    "grpc".to_string()
}

fn default_export_interval() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Reads the raw metric-name allowlist from `OF_SAFE_METRICS_FILE` first,
/// falling back to the comma-separated `OF_SAFE_METRICS` env var, defaulting
/// to empty (lock-down mode) when neither is set (§6).
pub fn read_allowlist() -> HashSet<String> {
    if let Ok(path) = std::env::var("OF_SAFE_METRICS_FILE") {
        match std::fs::read_to_string(&path) {
            Ok(text) => match serde_yaml::from_str::<AllowlistFile>(&text) {
                Ok(file) => return file.safe_metrics.into_iter().collect(),
                Err(e) => tracing::warn!(path = %path, error = %e, "failed to parse allowlist file"),
            },
            Err(e) => tracing::warn!(path = %path, error = %e, "failed to read allowlist file"),
        }
    }

    if let Ok(env) = std::env::var("OF_SAFE_METRICS") {
        return env.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
    }

    HashSet::new()
}

/// Reads the OTel exporter config: `opentelemetry:` block of
/// `OF_SAFE_METRICS_FILE` first, otherwise the `OTEL_EXPORTER_OTLP_*` /
/// `OTEL_*` env vars (§6).
pub fn read_otel_config() -> Option<OtelConfig> {
    if let Ok(path) = std::env::var("OF_SAFE_METRICS_FILE") {
        if let Ok(text) = std::fs::read_to_string(&path) {
            if let Ok(file) = serde_yaml::from_str::<AllowlistFile>(&text) {
                if let Some(section) = file.opentelemetry {
                    return Some(OtelConfig {
                        endpoint: section.endpoint.or_else(|| std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()),
                        headers: section.headers.or_else(|| std::env::var("OTEL_EXPORTER_OTLP_HEADERS").ok()),
                        protocol: section.protocol,
                        export_interval_secs: section.export_interval,
                        enabled: section.enabled,
                    });
                }
            }
        }
    }

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;
    Some(OtelConfig {
        endpoint: Some(endpoint),
        headers: std::env::var("OTEL_EXPORTER_OTLP_HEADERS").ok(),
        protocol: std::env::var("OTEL_EXPORTER_OTLP_PROTOCOL").unwrap_or_else(|_| "grpc".to_string()),
        export_interval_secs: std::env::var("OTEL_EXPORT_INTERVAL").ok().and_then(|v| v.parse().ok()).unwrap_or(30),
        enabled: std::env::var("OTEL_ENABLED")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(true),
    })
}

/// Filters a set of metric names to those the allowlist admits for external
/// export (§4.7 "companion allowlist ... filters which raw metric names are
/// forwarded to external exporters").
pub fn filter_allowed<'a>(names: impl IntoIterator<Item = &'a str>, allowlist: &HashSet<String>) -> Vec<&'a str> {
    names.into_iter().filter(|n| allowlist.contains(*n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn env_var_allowlist_splits_on_comma() {
        // SAFETY: tests run single-threaded per process here would be nicer,
        // but std::env::set_var is the only portable way to drive this path.
        unsafe {
            std::env::remove_var("OF_SAFE_METRICS_FILE");
            std::env::set_var("OF_SAFE_METRICS", "fps, cpu ,mem");
        }
        let allow = read_allowlist();
        assert!(allow.contains("fps"));
        assert!(allow.contains("cpu"));
        assert!(allow.contains("mem"));
        unsafe {
            std::env::remove_var("OF_SAFE_METRICS");
        }
    }

    #[test]
    fn file_allowlist_wins_over_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "safe_metrics:\n  - only_this\nopentelemetry:\n  endpoint: http://collector:4317\n  export_interval: 5\n").unwrap();

        unsafe {
            std::env::set_var("OF_SAFE_METRICS_FILE", file.path());
            std::env::set_var("OF_SAFE_METRICS", "should_be_ignored");
        }

        let allow = read_allowlist();
        assert_eq!(allow.len(), 1);
        assert!(allow.contains("only_this"));

        let otel = read_otel_config().unwrap();
        assert_eq!(otel.endpoint.as_deref(), Some("http://collector:4317"));
        assert_eq!(otel.export_interval_secs, 5);

        unsafe {
            std::env::remove_var("OF_SAFE_METRICS_FILE");
            std::env::remove_var("OF_SAFE_METRICS");
        }
    }
}
