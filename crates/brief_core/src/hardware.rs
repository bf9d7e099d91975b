use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub const DEFAULT_LAYERS_PER_IPU: [usize; 2] = [12, 12];
pub const DEFAULT_MATMUL_PROPORTION: f64 = 0.15;
pub const DEFAULT_EXECUTABLE_CACHE_DIR: &str = "./exe_cache";

/// How a model is laid out across accelerator devices.
///
/// Fields are private: once built (or deserialized and validated) the
/// configuration is never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    layers_per_ipu: Vec<usize>,
    matmul_proportion: f64,
    executable_cache_dir: PathBuf,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            layers_per_ipu: DEFAULT_LAYERS_PER_IPU.to_vec(),
            matmul_proportion: DEFAULT_MATMUL_PROPORTION,
            executable_cache_dir: PathBuf::from(DEFAULT_EXECUTABLE_CACHE_DIR),
        }
    }
}

impl HardwareConfig {
    pub fn new(
        layers_per_ipu: Vec<usize>,
        matmul_proportion: f64,
        executable_cache_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let config = Self {
            layers_per_ipu,
            matmul_proportion,
            executable_cache_dir: executable_cache_dir.into(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn layers_per_ipu(&self) -> &[usize] {
        &self.layers_per_ipu
    }

    pub fn matmul_proportion(&self) -> f64 {
        self.matmul_proportion
    }

    pub fn executable_cache_dir(&self) -> &Path {
        &self.executable_cache_dir
    }

    /// Number of devices the model is spread over.
    pub fn device_count(&self) -> usize {
        self.layers_per_ipu.len()
    }

    /// Sum of the per-device counts; a sum that overflows is a configuration error.
    pub fn total_layers(&self) -> Result<usize> {
        self.layers_per_ipu
            .iter()
            .try_fold(0usize, |total, &count| total.checked_add(count))
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "layers_per_ipu {:?} adds up to more layers than can be addressed",
                    self.layers_per_ipu
                ))
            })
    }

    pub fn validate(&self) -> Result<()> {
        if self.layers_per_ipu.is_empty() {
            return Err(Error::Configuration(
                "layers_per_ipu must list at least one device".to_string(),
            ));
        }
        if let Some(idx) = self.layers_per_ipu.iter().position(|&n| n == 0) {
            return Err(Error::Configuration(format!(
                "layers_per_ipu[{}] is 0; every device needs at least one layer",
                idx
            )));
        }
        if !(self.matmul_proportion > 0.0 && self.matmul_proportion <= 1.0) {
            return Err(Error::Configuration(format!(
                "matmul_proportion must be in (0, 1], got {}",
                self.matmul_proportion
            )));
        }
        if self.executable_cache_dir.as_os_str().is_empty() {
            return Err(Error::Configuration(
                "executable_cache_dir must not be empty".to_string(),
            ));
        }
        self.total_layers()?;
        Ok(())
    }

    /// Assign a model's layers to devices, in order.
    ///
    /// The per-device counts must cover the model exactly.
    pub fn partition(&self, model_layers: usize) -> Result<Vec<Range<usize>>> {
        self.validate()?;
        let total = self.total_layers()?;
        if total != model_layers {
            return Err(Error::Configuration(format!(
                "layers_per_ipu {:?} places {} layers but the model has {}",
                self.layers_per_ipu, total, model_layers
            )));
        }

        let mut start = 0;
        Ok(self
            .layers_per_ipu
            .iter()
            .map(|&count| {
                let range = start..start + count;
                start += count;
                range
            })
            .collect())
    }

    /// Plain mapping form handed to pipeline factories.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("layers_per_ipu".to_string(), Value::from(self.layers_per_ipu.clone()));
        map.insert("matmul_proportion".to_string(), Value::from(self.matmul_proportion));
        map.insert(
            "executable_cache_dir".to_string(),
            Value::from(self.executable_cache_dir.to_string_lossy().into_owned()),
        );
        map
    }
}
