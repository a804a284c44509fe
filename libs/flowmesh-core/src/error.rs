/// Error taxonomy shared by every crate in the runtime (§7 of the fabric spec).
///
/// Config/Setup errors are fatal to a single worker before or during startup;
/// Transport/Process errors are logged and the worker continues; Deadline
/// marks a timed-out wait (`sources_timeout`, `exit_after`, `exit_time`).
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("config: {0}")]
    Config(String),

    #[error("setup: {0}")]
    Setup(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("process: {0}")]
    Process(String),

    #[error("deadline exceeded: {0}")]
    Deadline(String),
}

impl FlowError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    pub fn deadline(msg: impl Into<String>) -> Self {
        Self::Deadline(msg.into())
    }
}

impl From<std::io::Error> for FlowError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}

pub type FlowResult<T> = Result<T, FlowError>;
