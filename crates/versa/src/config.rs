use serde::{Deserialize, Serialize};
use std::path::Path;

use versa_core::TrainingParameters;

/// Default upload chunk size (1 MiB)
pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 1024 * 1024;

/// Versa configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VersaConfig {
    /// Root of the artifact store (uploads, datasets, model artifacts)
    pub data_dir: String,

    /// Read buffer size used while receiving uploads
    pub upload_chunk_size: usize,

    /// Prefix upload keys with a per-request id.
    ///
    /// When disabled, uploads are stored under their client file name and
    /// concurrent uploads of the same name overwrite each other.
    pub key_uploads_by_id: bool,

    /// PostgreSQL connection string; the in-memory record store is used when unset
    pub database_url: Option<String>,

    /// Log level
    pub log_level: String,

    /// Hyperparameters for the training backend
    pub training: TrainingParameters,
}

impl Default for VersaConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            key_uploads_by_id: true,
            database_url: None,
            log_level: "info".to_string(),
            training: TrainingParameters::default(),
        }
    }
}

impl VersaConfig {
    /// Load from a `.toml` or `.json` configuration file
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?,
            _ => serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.upload_chunk_size == 0 {
            anyhow::bail!("upload_chunk_size must be positive");
        }
        if self.data_dir.trim().is_empty() {
            anyhow::bail!("data_dir must not be empty");
        }
        Ok(())
    }
}
