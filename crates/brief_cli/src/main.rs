use brief_core::{PipelineConfig, Request, Result};
use brief_inference::models::RemoteConfig;
use brief_inference::{create_factory, BackendKind, Pipeline};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Summarize documents with a warmed-up pipeline", long_about = None)]
pub struct Cli {
    /// JSON pipeline configuration; missing fields take the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, default_value = "extractive", help = "Backend to run the model on. Available backends: extractive (default), remote")]
    backend: BackendKind,
    /// Checkpoint used for model, tokenizer and architecture config
    #[arg(long, global = true)]
    model: Option<String>,
    #[arg(long, global = true, env = "BRIEF_ENDPOINT")]
    endpoint: Option<String>,
    #[arg(long, global = true, env = "BRIEF_HUB_URL")]
    hub_url: Option<String>,
    #[arg(long, global = true, env = "BRIEF_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,
    /// Do not compile before the first request
    #[arg(long, global = true)]
    skip_warm_up: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Summarize a document and print the JSON response
    Summarize {
        /// Read the document from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Compile the model into the executable cache and exit
    WarmUp,
    /// Print the effective configuration
    Config,
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(model) = &cli.model {
        config = config.with_model(model.clone());
    }
    config.validate()?;
    Ok(config)
}

fn remote_config(cli: &Cli) -> RemoteConfig {
    let defaults = RemoteConfig::default();
    RemoteConfig {
        endpoint: cli.endpoint.clone().unwrap_or(defaults.endpoint),
        hub_url: cli.hub_url.clone().unwrap_or(defaults.hub_url),
        api_token: cli.api_token.clone(),
    }
}

async fn read_document(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => Ok(tokio::fs::read_to_string(path).await?),
        None => {
            let mut document = String::new();
            tokio::io::stdin().read_to_string(&mut document).await?;
            Ok(document)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Commands::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let factory = create_factory(cli.backend, Some(remote_config(&cli)))?;
    let mut pipeline = Pipeline::new(factory.as_ref(), config).await?;

    if !cli.skip_warm_up || matches!(cli.command, Commands::WarmUp) {
        pipeline.warm_up().await?;
        info!("✨ {} compiled and ready", pipeline.model_name());
    }

    if let Commands::Summarize { file } = &cli.command {
        let document = read_document(file.as_deref()).await?;
        let response = pipeline.call(&Request::new(document)).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    Ok(())
}
