use async_trait::async_trait;
use brief_core::{Error, GenerationConfig, Result, SummaryRecord, TruncationStrategy};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use url::Url;

use super::{head_words, ModelCard, PipelineFactory, PipelineOptions, SummarizationModel};

pub const DEFAULT_ENDPOINT: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_HUB_URL: &str = "https://huggingface.co";

#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL of the inference service.
    pub endpoint: String,
    /// Base URL model configs are resolved from.
    pub hub_url: String,
    pub api_token: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            hub_url: DEFAULT_HUB_URL.to_string(),
            api_token: None,
        }
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("endpoint", &self.endpoint)
            .field("hub_url", &self.hub_url)
            .field("api_token", &self.api_token.as_deref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RemoteConfig {
    fn validate(&self) -> Result<()> {
        for (field, value) in [("endpoint", &self.endpoint), ("hub_url", &self.hub_url)] {
            let url = Url::parse(value)
                .map_err(|e| Error::Configuration(format!("invalid {} `{}`: {}", field, value, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::Configuration(format!(
                    "{} must be an http(s) URL, got `{}`",
                    field, value
                )));
            }
        }
        Ok(())
    }
}

fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// The subset of a hub `config.json` needed to partition the model.
#[derive(Deserialize)]
struct HubModelConfig {
    encoder_layers: Option<usize>,
    decoder_layers: Option<usize>,
    num_hidden_layers: Option<usize>,
}

pub struct RemoteFactory {
    client: Arc<Client>,
    config: RemoteConfig,
}

impl fmt::Debug for RemoteFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFactory")
            .field("client", &"<reqwest::Client>")
            .field("config", &self.config)
            .finish()
    }
}

impl RemoteFactory {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client: Arc::new(Client::new()),
            config,
        })
    }

    async fn fetch_config(&self, id: &str) -> Result<Value> {
        let url = format!(
            "{}/{}/resolve/main/config.json",
            self.config.hub_url.trim_end_matches('/'),
            id
        );
        let response = authorize(self.client.get(&url), self.config.api_token.as_deref())
            .send()
            .await
            .map_err(|e| Error::Configuration(format!("cannot resolve `{}`: {}", id, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Configuration(format!(
                "cannot resolve `{}`: hub answered HTTP {}",
                id, status
            )));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| Error::Configuration(format!("unreadable config for `{}`: {}", id, e)))
    }

    /// Read layer counts from the hub's `config.json` for `id`.
    pub async fn resolve_card(&self, id: &str) -> Result<ModelCard> {
        let raw = self.fetch_config(id).await?;
        let hub: HubModelConfig = serde_json::from_value(raw)
            .map_err(|e| Error::Configuration(format!("unexpected config for `{}`: {}", id, e)))?;

        match (hub.encoder_layers, hub.decoder_layers, hub.num_hidden_layers) {
            (Some(encoder), Some(decoder), _) => Ok(ModelCard::new(id, encoder, decoder)),
            (None, None, Some(layers)) => Ok(ModelCard::new(id, layers, 0)),
            _ => Err(Error::Configuration(format!(
                "config for `{}` does not state its layer counts",
                id
            ))),
        }
    }
}

#[async_trait]
impl PipelineFactory for RemoteFactory {
    fn name(&self) -> &str {
        "remote"
    }

    async fn create(&self, options: &PipelineOptions) -> Result<Arc<dyn SummarizationModel>> {
        options.ensure_summarization()?;
        let hardware = options.hardware()?;

        let card = self.resolve_card(&options.model_config).await?;
        if options.tokenizer != options.model_config {
            self.fetch_config(&options.tokenizer).await?;
        }
        if options.model != options.model_config {
            self.fetch_config(&options.model).await?;
        }
        let layers = card.total_layers()?;
        let partition = hardware.partition(layers)?;

        tracing::info!(
            "Resolved {} ({} layers over {} devices) at {}",
            options.model,
            layers,
            partition.len(),
            self.config.endpoint
        );

        Ok(Arc::new(RemoteModel {
            client: self.client.clone(),
            url: format!("{}/models/{}", self.config.endpoint.trim_end_matches('/'), options.model),
            api_token: self.config.api_token.clone(),
            model: options.model.clone(),
            generation: options.generation.clone(),
        }))
    }
}

#[derive(Serialize)]
struct SummarizeParameters {
    num_beams: usize,
    max_length: usize,
    truncation: TruncationStrategy,
}

#[derive(Serialize)]
struct SummarizeOptions {
    wait_for_model: bool,
}

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    inputs: &'a str,
    parameters: SummarizeParameters,
    options: SummarizeOptions,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Summarization model served over HTTP.
pub struct RemoteModel {
    client: Arc<Client>,
    url: String,
    api_token: Option<String>,
    model: String,
    generation: GenerationConfig,
}

impl fmt::Debug for RemoteModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteModel")
            .field("client", &"<reqwest::Client>")
            .field("url", &self.url)
            .field("api_token", &self.api_token.as_deref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RemoteModel {
    /// The service applies its own, larger, input limit, so the
    /// `max_input_length` head cut happens here before the text is sent.
    fn build_request<'a>(&self, text: &'a str, truncation: TruncationStrategy) -> SummarizeRequest<'a> {
        let truncation = if self.generation.truncation {
            truncation
        } else {
            TruncationStrategy::DoNotTruncate
        };
        let inputs = match truncation {
            TruncationStrategy::DoNotTruncate => text,
            _ => head_words(text, self.generation.max_input_length),
        };
        if inputs.len() < text.len() {
            tracing::debug!(
                "Truncated input to {} tokens ({} of {} bytes)",
                self.generation.max_input_length,
                inputs.len(),
                text.len()
            );
        }
        SummarizeRequest {
            inputs,
            parameters: SummarizeParameters {
                num_beams: self.generation.num_beams,
                max_length: self.generation.max_length,
                truncation,
            },
            options: SummarizeOptions { wait_for_model: true },
        }
    }
}

#[async_trait]
impl SummarizationModel for RemoteModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, text: &str, truncation: TruncationStrategy) -> Result<Vec<SummaryRecord>> {
        let request = self.build_request(text, truncation);
        tracing::debug!("POST {} ({} bytes of input)", self.url, text.len());

        let response = authorize(self.client.post(&self.url), self.api_token.as_deref())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if status.is_success() {
            return Ok(serde_json::from_slice::<Vec<SummaryRecord>>(&body)?);
        }

        let detail = serde_json::from_slice::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
        Err(Error::Framework(match status {
            StatusCode::SERVICE_UNAVAILABLE => format!("{} is not ready: {}", self.model, detail),
            _ => format!("{} failed with HTTP {}: {}", self.model, status, detail),
        }))
    }
}
