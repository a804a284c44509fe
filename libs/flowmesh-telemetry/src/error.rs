#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("reading allowlist file: {0}")]
    AllowlistIo(#[from] std::io::Error),

    #[error("parsing allowlist yaml: {0}")]
    AllowlistYaml(#[from] serde_yaml::Error),

    #[error("histogram spec '{0}' needs at least 2 buckets")]
    TooFewBuckets(String),
}
