use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FlowError;

/// `mq_log` policy (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MqLog {
    #[default]
    Pretty,
    Json,
    Off,
}

/// The enumerated per-filter config surface (§6). Concrete filter
/// implementations and the CLI that populates this record are out of scope
/// (§1) — this is the shape the runtime itself reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub id: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub sources_balance: bool,
    #[serde(default = "default_sources_timeout_ms")]
    pub sources_timeout: u64,
    #[serde(default)]
    pub sources_low_latency: bool,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub outputs_balance: bool,
    #[serde(default = "default_outputs_timeout_ms")]
    pub outputs_timeout: u64,
    #[serde(default)]
    pub outputs_required: Vec<String>,
    #[serde(default)]
    pub outputs_metrics: Option<String>,
    #[serde(default)]
    pub outputs_jpg: bool,
    #[serde(default = "default_true")]
    pub outputs_filter: bool,
    #[serde(default)]
    pub exit_after: Option<f64>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub log_path: Option<String>,
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval: f64,
    #[serde(default)]
    pub extra_metrics: Map<String, Value>,
    #[serde(default)]
    pub mq_log: MqLog,
    #[serde(default = "default_true")]
    pub mq_msgid_sync: bool,
}

fn default_sources_timeout_ms() -> u64 {
    5_000
}

fn default_outputs_timeout_ms() -> u64 {
    1_000
}

fn default_metrics_interval() -> f64 {
    10.0
}

fn default_true() -> bool {
    true
}

/// Either form spec.md §9 allows in: "duck-typed config dicts become a tagged
/// config record normalized by a single entry point that accepts either a
/// record or a field-name → value map".
pub enum ConfigInput {
    Typed(FilterConfig),
    Map(Map<String, Value>),
}

impl From<FilterConfig> for ConfigInput {
    fn from(c: FilterConfig) -> Self {
        ConfigInput::Typed(c)
    }
}

impl From<Map<String, Value>> for ConfigInput {
    fn from(m: Map<String, Value>) -> Self {
        ConfigInput::Map(m)
    }
}

impl FilterConfig {
    /// The single config-normalization entry point. Idempotent: normalizing
    /// an already-normalized config returns an equivalent one (§8).
    pub fn normalize(input: impl Into<ConfigInput>) -> Result<Self, FlowError> {
        let cfg = match input.into() {
            ConfigInput::Typed(c) => c,
            ConfigInput::Map(m) => serde_json::from_value(Value::Object(m))?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), FlowError> {
        if self.id.is_empty() {
            return Err(FlowError::config("filter id must not be empty"));
        }
        if self.sources_balance && self.sources.len() < 2 {
            return Err(FlowError::config("sources_balance requires at least 2 sources"));
        }
        if self.outputs_balance && self.outputs.len() < 2 {
            return Err(FlowError::config("outputs_balance requires at least 2 outputs"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FilterConfig {
        FilterConfig::normalize(FilterConfig {
            id: "worker-a".into(),
            sources: vec![],
            sources_balance: false,
            sources_timeout: default_sources_timeout_ms(),
            sources_low_latency: false,
            outputs: vec![],
            outputs_balance: false,
            outputs_timeout: default_outputs_timeout_ms(),
            outputs_required: vec![],
            outputs_metrics: None,
            outputs_jpg: false,
            outputs_filter: true,
            exit_after: None,
            environment: BTreeMap::new(),
            log_path: None,
            metrics_interval: default_metrics_interval(),
            extra_metrics: Map::new(),
            mq_log: MqLog::Pretty,
            mq_msgid_sync: true,
        })
        .unwrap()
    }

    #[test]
    fn normalizing_twice_is_idempotent() {
        let once = sample();
        let twice = FilterConfig::normalize(once.clone()).unwrap();
        assert_eq!(once.id, twice.id);
        assert_eq!(once.mq_msgid_sync, twice.mq_msgid_sync);
        assert_eq!(once.sources_timeout, twice.sources_timeout);
    }

    #[test]
    fn normalizes_from_loose_map() {
        let mut map = Map::new();
        map.insert("id".into(), Value::from("worker-b"));
        map.insert("sources".into(), Value::from(vec!["tcp://a"]));
        let cfg = FilterConfig::normalize(map).unwrap();
        assert_eq!(cfg.id, "worker-b");
        assert_eq!(cfg.sources, vec!["tcp://a".to_string()]);
        assert_eq!(cfg.sources_timeout, default_sources_timeout_ms());
    }

    #[test]
    fn rejects_empty_id() {
        let mut map = Map::new();
        map.insert("id".into(), Value::from(""));
        assert!(FilterConfig::normalize(map).is_err());
    }
}
