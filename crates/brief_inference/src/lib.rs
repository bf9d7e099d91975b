pub mod cache;
pub mod models;
pub mod pipeline;

pub use models::{create_factory, BackendKind, PipelineFactory, PipelineOptions, SummarizationModel};
pub use pipeline::{Pipeline, PipelineState, WARM_UP_DOCUMENT};

pub mod prelude {
    pub use super::models::{create_factory, BackendKind, RemoteConfig};
    pub use super::pipeline::{Pipeline, PipelineState};
    pub use brief_core::{Error, PipelineConfig, Request, Response, Result};
}
