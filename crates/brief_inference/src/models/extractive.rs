use async_trait::async_trait;
use brief_core::{Error, GenerationConfig, Result, SummaryRecord, TruncationStrategy};
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{ModelCard, PipelineFactory, PipelineOptions, SummarizationModel};
use crate::cache::{CacheEntry, ExecutableCache};

/// Offline factory backed by a registry of known checkpoints.
pub struct ExtractiveFactory {
    cards: HashMap<String, ModelCard>,
}

impl fmt::Debug for ExtractiveFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.cards.keys().collect();
        ids.sort();
        f.debug_struct("ExtractiveFactory").field("models", &ids).finish()
    }
}

impl Default for ExtractiveFactory {
    fn default() -> Self {
        Self::empty()
            .with_card(ModelCard::new("facebook/bart-large-cnn", 12, 12))
            .with_card(ModelCard::new("sshleifer/distilbart-cnn-12-6", 12, 6))
            .with_card(ModelCard::new("facebook/bart-base", 6, 6))
            .with_card(ModelCard::new("google/pegasus-xsum", 16, 16))
    }
}

impl ExtractiveFactory {
    pub fn empty() -> Self {
        Self {
            cards: HashMap::new(),
        }
    }

    pub fn with_card(mut self, card: ModelCard) -> Self {
        self.cards.insert(card.id.clone(), card);
        self
    }

    fn resolve(&self, what: &str, id: &str) -> Result<&ModelCard> {
        self.cards.get(id).ok_or_else(|| {
            Error::Configuration(format!("cannot resolve {} `{}`: not a known checkpoint", what, id))
        })
    }
}

#[async_trait]
impl PipelineFactory for ExtractiveFactory {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn create(&self, options: &PipelineOptions) -> Result<Arc<dyn SummarizationModel>> {
        options.ensure_summarization()?;
        self.resolve("model", &options.model)?;
        self.resolve("tokenizer", &options.tokenizer)?;
        let card = self.resolve("model config", &options.model_config)?;

        let hardware = options.hardware()?;
        let partition = hardware.partition(card.total_layers()?)?;
        let cache = ExecutableCache::open(hardware.executable_cache_dir()).await?;
        let cache_key = ExecutableCache::key(options);
        let compiled = cache.lookup(&cache_key).await?.is_some();

        tracing::info!(
            "Loaded {} ({} layout) across {} devices ({})",
            options.model,
            card.id,
            hardware.device_count(),
            if compiled { "executable cached" } else { "compiles on first call" }
        );

        Ok(Arc::new(ExtractiveModel {
            model: options.model.clone(),
            generation: options.generation.clone(),
            partition,
            cache,
            cache_key,
            compiled: AtomicBool::new(compiled),
        }))
    }
}

/// Lead-text summarizer: keeps the opening sentences of the document.
pub struct ExtractiveModel {
    model: String,
    generation: GenerationConfig,
    partition: Vec<Range<usize>>,
    cache: ExecutableCache,
    cache_key: String,
    compiled: AtomicBool,
}

impl fmt::Debug for ExtractiveModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractiveModel")
            .field("model", &self.model)
            .field("partition", &self.partition)
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

impl ExtractiveModel {
    pub fn is_compiled(&self) -> bool {
        self.compiled.load(Ordering::Acquire)
    }

    async fn compile(&self) -> Result<()> {
        tracing::info!("Compiling {} for {} devices", self.model, self.partition.len());
        let entry = CacheEntry {
            key: self.cache_key.clone(),
            model: self.model.clone(),
            layers_per_ipu: self.partition.iter().map(|r| r.len()).collect(),
            compiled_at: Utc::now(),
        };
        self.cache.store(&entry).await?;
        self.compiled.store(true, Ordering::Release);
        Ok(())
    }

    /// Cut the input to `max_input_length` words.
    fn truncate<'a>(&self, words: &[&'a str], truncation: TruncationStrategy) -> Result<Vec<&'a str>> {
        let limit = self.generation.max_input_length;
        if words.len() <= limit {
            return Ok(words.to_vec());
        }
        if !self.generation.truncation || truncation == TruncationStrategy::DoNotTruncate {
            return Err(Error::Framework(format!(
                "input has {} tokens, more than max_input_length {}",
                words.len(),
                limit
            )));
        }
        tracing::debug!("Truncating input from {} to {} tokens", words.len(), limit);
        Ok(words[..limit].to_vec())
    }

    /// Take whole sentences while they fit in `max_length` words.
    fn extract(&self, words: &[&str]) -> String {
        let budget = self.generation.max_length;
        let mut summary: Vec<&str> = Vec::new();
        let mut sentence: Vec<&str> = Vec::new();

        for &word in words {
            sentence.push(word);
            if word.ends_with(['.', '!', '?']) {
                if summary.len() + sentence.len() > budget {
                    break;
                }
                summary.append(&mut sentence);
            }
        }
        if summary.is_empty() {
            // No complete sentence fits: fall back to the leading words.
            summary = words.iter().take(budget).copied().collect();
        }
        summary.join(" ")
    }
}

#[async_trait]
impl SummarizationModel for ExtractiveModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, text: &str, truncation: TruncationStrategy) -> Result<Vec<SummaryRecord>> {
        if !self.is_compiled() {
            self.compile().await?;
        }
        let words: Vec<&str> = text.split_whitespace().collect();
        let input = self.truncate(&words, truncation)?;
        Ok(vec![SummaryRecord::new(self.extract(&input))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brief_core::{HardwareConfig, PipelineConfig};

    fn options_in(dir: &std::path::Path) -> PipelineOptions {
        let config = PipelineConfig::default()
            .with_hardware(HardwareConfig::new(vec![12, 12], 0.15, dir.join("exe_cache")).unwrap());
        PipelineOptions::from_config(&config)
    }

    #[tokio::test]
    async fn test_unknown_model_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = options_in(dir.path());
        options.model = "nobody/nothing".to_string();
        let err = ExtractiveFactory::default().create(&options).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("nobody/nothing"));
    }

    #[tokio::test]
    async fn test_layout_mismatch_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = options_in(dir.path());
        options.model_config = "facebook/bart-base".to_string();
        let err = ExtractiveFactory::default().create(&options).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_summarize_keeps_leading_sentences() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = options_in(dir.path());
        options.generation.max_length = 9;
        let model = ExtractiveFactory::default().create(&options).await.unwrap();

        let text = "The council met on Monday. It approved the budget. Critics objected loudly afterwards.";
        let records = model.summarize(text, TruncationStrategy::OnlyFirst).await.unwrap();
        assert_eq!(records, vec![SummaryRecord::new("The council met on Monday. It approved the budget.")]);
    }

    #[tokio::test]
    async fn test_summarize_without_sentence_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = options_in(dir.path());
        options.generation.max_length = 3;
        let model = ExtractiveFactory::default().create(&options).await.unwrap();

        let records = model.summarize("one two three four five", TruncationStrategy::OnlyFirst).await.unwrap();
        assert_eq!(records[0].summary_text, "one two three");

        let records = model.summarize("", TruncationStrategy::OnlyFirst).await.unwrap();
        assert_eq!(records[0].summary_text, "");
    }

    #[tokio::test]
    async fn test_long_input_is_truncated_unless_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = options_in(dir.path());
        options.generation.max_input_length = 5;
        let model = ExtractiveFactory::default().create(&options).await.unwrap();

        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let records = model.summarize(text, TruncationStrategy::OnlyFirst).await.unwrap();
        assert_eq!(records[0].summary_text, "alpha beta gamma delta epsilon");

        let err = model.summarize(text, TruncationStrategy::DoNotTruncate).await.unwrap_err();
        assert_eq!(err.kind(), brief_core::ErrorKind::Framework);
    }

    #[tokio::test]
    async fn test_model_is_named_after_checkpoint_not_architecture() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = options_in(dir.path());
        options.model = "sshleifer/distilbart-cnn-12-6".to_string();
        let model = ExtractiveFactory::default().create(&options).await.unwrap();
        assert_eq!(model.name(), "sshleifer/distilbart-cnn-12-6");

        model.summarize("Just compile", TruncationStrategy::OnlyFirst).await.unwrap();
        let cache = ExecutableCache::open(dir.path().join("exe_cache")).await.unwrap();
        let entry = cache.lookup(&ExecutableCache::key(&options)).await.unwrap().unwrap();
        assert_eq!(entry.model, "sshleifer/distilbart-cnn-12-6");
    }

    #[tokio::test]
    async fn test_compilation_is_cached_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let options = options_in(dir.path());
        let factory = ExtractiveFactory::default();

        let model = factory.create(&options).await.unwrap();
        model.summarize("Just compile", TruncationStrategy::OnlyFirst).await.unwrap();
        let cache = ExecutableCache::open(dir.path().join("exe_cache")).await.unwrap();
        let entry = cache.lookup(&ExecutableCache::key(&options)).await.unwrap().unwrap();
        assert_eq!(entry.model, "facebook/bart-large-cnn");
        assert_eq!(entry.layers_per_ipu, vec![12, 12]);

        // A second load in the same cache dir starts out compiled.
        let reloaded = ExtractiveFactory::default().create(&options).await.unwrap();
        assert!(format!("{:?}", reloaded).contains("compiled: true"));
    }
}
