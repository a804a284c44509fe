#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("transport: {0}")]
    Transport(#[from] flowmesh_transport::TransportError),

    #[error("telemetry: {0}")]
    Telemetry(#[from] flowmesh_telemetry::TelemetryError),

    #[error(transparent)]
    Flow(#[from] flowmesh_core::FlowError),
}

impl From<WorkerError> for flowmesh_core::FlowError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::Flow(inner) => inner,
            other => flowmesh_core::FlowError::setup(other.to_string()),
        }
    }
}
