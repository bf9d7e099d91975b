use async_trait::async_trait;
use brief_core::config::SUMMARIZATION_TASK;
use brief_core::{Error, GenerationConfig, HardwareConfig, PipelineConfig, Result, SummaryRecord, TruncationStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod extractive;
pub mod remote;

pub use extractive::{ExtractiveFactory, ExtractiveModel};
pub use remote::{RemoteConfig, RemoteFactory, RemoteModel};

/// A ready-to-call summarization model produced by a [`PipelineFactory`].
#[async_trait]
pub trait SummarizationModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Summarize one document.
    async fn summarize(&self, text: &str, truncation: TruncationStrategy) -> Result<Vec<SummaryRecord>>;
}

/// Builds summarization models from pipeline options.
#[async_trait]
pub trait PipelineFactory: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Resolve the model and apply the hardware layout.
    ///
    /// Any failure here is a configuration error.
    async fn create(&self, options: &PipelineOptions) -> Result<Arc<dyn SummarizationModel>>;
}

/// Everything a factory receives, with the hardware layout as a plain mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub task: String,
    pub model: String,
    pub tokenizer: String,
    pub model_config: String,
    pub ipu_config: Map<String, Value>,
    pub generation: GenerationConfig,
}

impl PipelineOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            task: config.task.clone(),
            model: config.model.clone(),
            tokenizer: config.tokenizer.clone(),
            model_config: config.model_config.clone(),
            ipu_config: config.hardware.to_map(),
            generation: config.generation.clone(),
        }
    }

    /// Rebuild the typed hardware layout from its mapping form.
    pub fn hardware(&self) -> Result<HardwareConfig> {
        let hardware: HardwareConfig = serde_json::from_value(Value::Object(self.ipu_config.clone()))
            .map_err(|e| Error::Configuration(format!("invalid ipu_config: {}", e)))?;
        hardware.validate()?;
        Ok(hardware)
    }

    pub(crate) fn ensure_summarization(&self) -> Result<()> {
        if self.task != SUMMARIZATION_TASK {
            return Err(Error::Configuration(format!(
                "task `{}` is not supported, only `{}`",
                self.task, SUMMARIZATION_TASK
            )));
        }
        Ok(())
    }
}

/// Architecture facts needed to partition a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCard {
    pub id: String,
    pub encoder_layers: usize,
    pub decoder_layers: usize,
}

impl ModelCard {
    pub fn new(id: impl Into<String>, encoder_layers: usize, decoder_layers: usize) -> Self {
        Self {
            id: id.into(),
            encoder_layers,
            decoder_layers,
        }
    }

    pub fn total_layers(&self) -> Result<usize> {
        self.encoder_layers
            .checked_add(self.decoder_layers)
            .ok_or_else(|| Error::Configuration(format!("`{}` reports an impossible layer count", self.id)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Extractive,
    Remote,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "extractive" | "local" => Ok(Self::Extractive),
            "remote" | "http" => Ok(Self::Remote),
            other => Err(Error::Configuration(format!(
                "unknown backend `{}`. Available backends: extractive, remote",
                other
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extractive => f.write_str("extractive"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

/// Leading `limit` whitespace-separated words of `text`, as a slice of it.
pub(crate) fn head_words(text: &str, limit: usize) -> &str {
    let mut words = 0;
    let mut in_word = false;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_word {
                words += 1;
                if words == limit {
                    return &text[..idx];
                }
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }
    text
}

pub fn create_factory(kind: BackendKind, remote: Option<RemoteConfig>) -> Result<Arc<dyn PipelineFactory>> {
    let factory: Arc<dyn PipelineFactory> = match kind {
        BackendKind::Extractive => Arc::new(ExtractiveFactory::default()),
        BackendKind::Remote => Arc::new(RemoteFactory::new(remote.unwrap_or_default())?),
    };
    tracing::debug!("Using {} pipeline factory", factory.name());
    Ok(factory)
}
