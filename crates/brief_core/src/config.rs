use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::hardware::HardwareConfig;
use crate::{Error, Result};

pub const SUMMARIZATION_TASK: &str = "summarization";
pub const DEFAULT_MODEL: &str = "facebook/bart-large-cnn";
pub const DEFAULT_NUM_BEAMS: usize = 3;
pub const DEFAULT_MAX_INPUT_LENGTH: usize = 500;
pub const DEFAULT_MAX_LENGTH: usize = 100;

/// Decoding hyperparameters passed through to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub num_beams: usize,
    /// Input cap, in tokens.
    pub max_input_length: usize,
    /// Output cap, in tokens.
    pub max_length: usize,
    pub truncation: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            num_beams: DEFAULT_NUM_BEAMS,
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
            max_length: DEFAULT_MAX_LENGTH,
            truncation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub task: String,
    pub model: String,
    pub tokenizer: String,
    /// Identifier the model architecture config is resolved from.
    pub model_config: String,
    pub hardware: HardwareConfig,
    pub generation: GenerationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            task: SUMMARIZATION_TASK.to_string(),
            model: DEFAULT_MODEL.to_string(),
            tokenizer: DEFAULT_MODEL.to_string(),
            model_config: DEFAULT_MODEL.to_string(),
            hardware: HardwareConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Point model, tokenizer and architecture config at the same checkpoint.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.tokenizer = model.clone();
        self.model_config = model.clone();
        self.model = model;
        self
    }

    pub fn with_hardware(mut self, hardware: HardwareConfig) -> Self {
        self.hardware = hardware;
        self
    }

    /// Load a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            Error::Configuration(format!("invalid config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        tracing::debug!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.task != SUMMARIZATION_TASK {
            return Err(Error::Configuration(format!(
                "unsupported task `{}`, expected `{}`",
                self.task, SUMMARIZATION_TASK
            )));
        }
        for (field, value) in [
            ("model", &self.model),
            ("tokenizer", &self.tokenizer),
            ("model_config", &self.model_config),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Configuration(format!("{} must not be empty", field)));
            }
        }
        if self.generation.num_beams == 0 {
            return Err(Error::Configuration("num_beams must be at least 1".to_string()));
        }
        if self.generation.max_input_length == 0 || self.generation.max_length == 0 {
            return Err(Error::Configuration(
                "max_input_length and max_length must be at least 1".to_string(),
            ));
        }
        self.hardware.validate()
    }
}
