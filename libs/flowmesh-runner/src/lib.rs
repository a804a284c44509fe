pub mod error;
pub mod graph;
pub mod logging;
mod meters;
pub mod options;
pub mod runner;

pub use error::RunnerError;
pub use graph::{resolve_references, DependencyGraph};
pub use options::{PropExit, RunnerOptions, StopExit};
pub use runner::{Runner, RunnerEntry, SteppedRunner};
