use brief_core::{Error, PipelineConfig, Request, Response, Result, TruncationStrategy};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::models::{PipelineFactory, PipelineOptions, SummarizationModel};

/// Document sent through the pipeline to force compilation.
pub const WARM_UP_DOCUMENT: &str = "Just compile";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed; the first invocation will pay for compilation.
    Uncompiled,
    /// At least one invocation has completed.
    Warmed,
}

/// Request/response front of a single summarization model.
///
/// `call` and `warm_up` take `&mut self`: one pipeline serves one request at
/// a time. Share it behind a mutex if several tasks need it.
pub struct Pipeline {
    model: Arc<dyn SummarizationModel>,
    config: PipelineConfig,
    state: PipelineState,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("model", &self.model)
            .field("state", &self.state)
            .finish()
    }
}

impl Pipeline {
    /// Validate `config`, then ask `factory` for the model.
    ///
    /// Every failure on this path is reported as [`Error::Configuration`].
    pub async fn new(factory: &dyn PipelineFactory, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let options = PipelineOptions::from_config(&config);

        let model = factory.create(&options).await.map_err(|e| match e {
            Error::Configuration(_) => e,
            other => Error::Configuration(format!(
                "{} factory could not load {}: {}",
                factory.name(),
                config.model,
                other
            )),
        })?;

        info!("🧠 Pipeline ready (model {}, backend {})", model.name(), factory.name());
        Ok(Self {
            model,
            config,
            state: PipelineState::Uncompiled,
        })
    }

    pub async fn with_defaults(factory: &dyn PipelineFactory) -> Result<Self> {
        Self::new(factory, PipelineConfig::default()).await
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_warmed(&self) -> bool {
        self.state == PipelineState::Warmed
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Summarize `request["documents"]`.
    ///
    /// Over-long documents are truncated to their head by the backend.
    /// Backend failures are returned as-is.
    pub async fn call(&mut self, request: &Request) -> Result<Response> {
        let documents = request.documents()?;
        let started = Instant::now();

        let summary = self
            .model
            .summarize(documents, TruncationStrategy::OnlyFirst)
            .await?;

        debug!(
            "Summarized {} bytes into {} record(s) in {:?}",
            documents.len(),
            summary.len(),
            started.elapsed()
        );
        if self.state == PipelineState::Uncompiled {
            self.state = PipelineState::Warmed;
            info!("🔥 Pipeline warmed after {:?}", started.elapsed());
        }
        Ok(Response::new(summary))
    }

    /// Run one throwaway invocation so compilation happens now.
    ///
    /// Every call performs a real invocation, but only the first is slow.
    pub async fn warm_up(&mut self) -> Result<()> {
        info!("Warming up {}", self.model.name());
        self.call(&Request::new(WARM_UP_DOCUMENT)).await?;
        Ok(())
    }

    /// Alias for [`Pipeline::warm_up`].
    pub async fn compile(&mut self) -> Result<()> {
        self.warm_up().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use brief_core::{ErrorKind, SummaryRecord};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingModel {
        inputs: Mutex<Vec<(String, TruncationStrategy)>>,
    }

    #[async_trait]
    impl SummarizationModel for RecordingModel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn summarize(&self, text: &str, truncation: TruncationStrategy) -> Result<Vec<SummaryRecord>> {
            self.inputs.lock().unwrap().push((text.to_string(), truncation));
            if text == "explode" {
                return Err(Error::Framework("device lost".to_string()));
            }
            Ok(vec![SummaryRecord::new(text.to_uppercase())])
        }
    }

    #[derive(Debug, Default)]
    struct RecordingFactory {
        model: Arc<RecordingModel>,
        created: AtomicUsize,
    }

    #[async_trait]
    impl PipelineFactory for RecordingFactory {
        fn name(&self) -> &str {
            "recording"
        }

        async fn create(&self, options: &PipelineOptions) -> Result<Arc<dyn SummarizationModel>> {
            if options.model == "missing/model" {
                return Err(Error::Framework("repository not found".to_string()));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(self.model.clone())
        }
    }

    #[tokio::test]
    async fn test_call_forwards_with_only_first() {
        let factory = RecordingFactory::default();
        let mut pipeline = Pipeline::with_defaults(&factory).await.unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.state(), PipelineState::Uncompiled);

        let response = pipeline.call(&Request::new("hello")).await.unwrap();
        assert_eq!(response.summary, vec![SummaryRecord::new("HELLO")]);
        assert!(pipeline.is_warmed());

        let inputs = factory.model.inputs.lock().unwrap();
        assert_eq!(inputs.as_slice(), &[("hello".to_string(), TruncationStrategy::OnlyFirst)]);
    }

    #[tokio::test]
    async fn test_invalid_requests_never_reach_the_model() {
        let factory = RecordingFactory::default();
        let mut pipeline = Pipeline::with_defaults(&factory).await.unwrap();

        let err = pipeline.call(&Request::from(json!({}))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = pipeline.call(&Request::from(json!({"documents": 123}))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        assert!(factory.model.inputs.lock().unwrap().is_empty());
        assert_eq!(pipeline.state(), PipelineState::Uncompiled);
    }

    #[tokio::test]
    async fn test_framework_errors_pass_through() {
        let factory = RecordingFactory::default();
        let mut pipeline = Pipeline::with_defaults(&factory).await.unwrap();

        let err = pipeline.call(&Request::new("explode")).await.unwrap_err();
        assert!(matches!(err, Error::Framework(ref msg) if msg == "device lost"));
        assert_eq!(pipeline.state(), PipelineState::Uncompiled);
    }

    #[tokio::test]
    async fn test_warm_up_sends_placeholder() {
        let factory = RecordingFactory::default();
        let mut pipeline = Pipeline::with_defaults(&factory).await.unwrap();

        pipeline.warm_up().await.unwrap();
        pipeline.compile().await.unwrap();
        assert!(pipeline.is_warmed());

        let inputs = factory.model.inputs.lock().unwrap();
        assert_eq!(inputs.len(), 2);
        assert!(inputs.iter().all(|(text, _)| text == WARM_UP_DOCUMENT));
    }

    #[tokio::test]
    async fn test_construction_errors_become_configuration_errors() {
        let factory = RecordingFactory::default();
        let config = PipelineConfig::default().with_model("missing/model");
        let err = Pipeline::new(&factory, config).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);

        let mut config = PipelineConfig::default();
        config.generation.max_length = 0;
        assert!(Pipeline::new(&factory, config).await.unwrap_err().is_configuration());
    }
}
