pub mod error;
pub mod filter;
mod sidechannel;
mod state;
mod stats;
mod worker;

pub use error::WorkerError;
pub use filter::{ExitHandle, Filter, ProcessOutcome};
pub use state::{DrainReason, WorkerState};
pub use worker::{StepOutcome, Worker};
