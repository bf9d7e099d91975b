use anyhow::Context;
use brief_core::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::PipelineOptions;

/// Record of a compiled executable, one file per cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub model: String,
    pub layers_per_ipu: Vec<usize>,
    pub compiled_at: DateTime<Utc>,
}

/// On-disk store of compiled executables, shared by every pipeline in the process.
#[derive(Debug, Clone)]
pub struct ExecutableCache {
    dir: PathBuf,
}

impl ExecutableCache {
    /// Open the cache, creating its directory if needed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::Configuration(format!(
                "cannot create executable cache dir {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Key for an executable: anything that changes the compiled graph changes the key.
    ///
    /// The cache directory itself is left out so moving it keeps entries valid.
    pub fn key(options: &PipelineOptions) -> String {
        let material = json!({
            "model": options.model,
            "tokenizer": options.tokenizer,
            "model_config": options.model_config,
            "layers_per_ipu": options.ipu_config.get("layers_per_ipu"),
            "matmul_proportion": options.ipu_config.get("matmul_proportion"),
            "generation": options.generation,
        });
        let digest = Sha256::digest(material.to_string().as_bytes());
        format!("{:x}", digest)
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub async fn lookup(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entry) => Ok(Some(entry)),
                Err(e) => {
                    tracing::warn!("Ignoring corrupt executable cache entry {}: {}", path.display(), e);
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write an entry atomically so concurrent readers never see half a file.
    ///
    /// Each writer stages into its own uniquely named file in the cache dir,
    /// so racing stores of one key never share a staging path.
    pub async fn store(&self, entry: &CacheEntry) -> Result<()> {
        let dir = self.dir.clone();
        let path = self.entry_path(&entry.key);
        let bytes = serde_json::to_vec_pretty(entry)?;

        let target = path.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut staged = tempfile::NamedTempFile::new_in(&dir)
                .with_context(|| format!("staging executable cache entry in {}", dir.display()))?;
            staged
                .write_all(&bytes)
                .with_context(|| format!("writing executable cache entry {}", staged.path().display()))?;
            staged
                .persist(&target)
                .with_context(|| format!("publishing executable cache entry {}", target.display()))?;
            Ok(())
        })
        .await
        .context("executable cache writer stopped")??;

        tracing::debug!("Stored executable cache entry {}", path.display());
        Ok(())
    }
}
