pub mod error;
mod router;
mod source;

pub use error::RouterError;
pub use router::{Router, RouterOutcome};
