#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("required source '{0}' ended")]
    SourceEnded(String),

    #[error("transport: {0}")]
    Transport(#[from] flowmesh_transport::TransportError),
}

impl From<RouterError> for flowmesh_core::FlowError {
    fn from(e: RouterError) -> Self {
        flowmesh_core::FlowError::transport(e.to_string())
    }
}
