use crate::miner_config::MinerConfig;
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    // Where per-source model files live
    pub model_dir: PathBuf,
    pub source: String,

    // Optional JSON file holding a MinerConfig
    pub miner_config_path: Option<PathBuf>,

    // Rebuild from the input instead of updating incrementally
    pub train: bool,
}

impl RuntimeConfig {
    /// Read settings from the environment, loading `.env` first if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        RuntimeConfig {
            model_dir: env::var("MINER_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models")),

            source: env::var("MINER_SOURCE").unwrap_or_else(|_| "default".to_string()),

            miner_config_path: env::var("MINER_CONFIG").ok().map(PathBuf::from),

            train: env::var("MINER_TRAIN")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
        }
    }

    pub fn miner_config(&self) -> Result<MinerConfig> {
        let Some(path) = &self.miner_config_path else {
            return Ok(MinerConfig::default());
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read miner config: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse miner config: {}", path.display()))
    }

    pub fn log_config(&self) {
        tracing::info!("📋 Configuration:");
        tracing::info!("   Model directory: {}", self.model_dir.display());
        tracing::info!("   Source: {}", self.source);
        match &self.miner_config_path {
            Some(path) => tracing::info!("   Miner config: {}", path.display()),
            None => tracing::info!("   Miner config: defaults"),
        }
        tracing::info!("   Mode: {}", if self.train { "train" } else { "update" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_miner_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"wildcard": "<v>", "max_continuation_steps": 2}}"#).unwrap();

        let runtime = RuntimeConfig {
            model_dir: PathBuf::from("models"),
            source: "default".to_string(),
            miner_config_path: Some(file.path().to_path_buf()),
            train: false,
        };
        let config = runtime.miner_config().unwrap();
        assert_eq!(config.wildcard, "<v>");
        assert_eq!(config.max_continuation_steps, 2);
        assert_eq!(config.max_tokens, 500);
    }

    #[test]
    fn test_missing_miner_config_file_is_error() {
        let runtime = RuntimeConfig {
            model_dir: PathBuf::from("models"),
            source: "default".to_string(),
            miner_config_path: Some(PathBuf::from("/nonexistent/miner.json")),
            train: false,
        };
        assert!(runtime.miner_config().is_err());
    }
}
