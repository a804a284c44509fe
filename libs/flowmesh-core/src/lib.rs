pub mod config;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod topic;
pub mod util;

pub use config::{ConfigInput, FilterConfig, MqLog};
pub use endpoint::{EndpointUrl, Scheme, TopicSpec};
pub use error::{FlowError, FlowResult};
pub use frame::{ColorFormat, Frame, FrameData, FrameSet, Image, Metadata};
