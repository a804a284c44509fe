#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("filter '{0}' has a duplicate id")]
    DuplicateId(String),

    #[error("source references unknown filter id '{0}'")]
    UnknownPeer(String),

    #[error(transparent)]
    Config(#[from] flowmesh_core::FlowError),

    #[error(transparent)]
    Worker(#[from] flowmesh_worker::WorkerError),
}
