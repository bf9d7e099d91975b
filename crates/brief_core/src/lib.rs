pub mod config;
pub mod error;
pub mod hardware;
pub mod types;

pub use config::{GenerationConfig, PipelineConfig};
pub use error::{Error, ErrorKind, Result};
pub use hardware::HardwareConfig;
pub use types::{Request, Response, SummaryRecord, TruncationStrategy};

pub mod prelude {
    pub use crate::{
        Error, GenerationConfig, HardwareConfig, PipelineConfig, Request, Response, Result,
        SummaryRecord, TruncationStrategy,
    };
}
