#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing: {0}")]
    Framing(String),

    #[error("encode: {0}")]
    Encode(serde_json::Error),

    #[error("decode: {0}")]
    Decode(serde_json::Error),

    #[error("peer closed")]
    Closed,

    #[error("connect timeout waiting for required subscribers: {0:?}")]
    RequiredTimeout(Vec<String>),
}

impl From<TransportError> for flowmesh_core::FlowError {
    fn from(e: TransportError) -> Self {
        flowmesh_core::FlowError::transport(e.to_string())
    }
}
