pub mod error;
pub mod fanout;
pub mod net;
pub mod net_publisher;
pub mod net_source;
pub mod queue;
pub mod wire;

pub use error::TransportError;
pub use fanout::{BalanceMode, Fanout};
pub use net_publisher::NetPublisher;
pub use net_source::NetSource;
pub use queue::DropOldestQueue;
pub use wire::{WireRecord, WireTick};
