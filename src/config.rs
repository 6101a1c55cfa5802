use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GmailError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub deletion: DeletionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_period_days")]
    pub period_days: u32,
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            period_days: default_period_days(),
            label: default_label(),
            batch_size: default_batch_size(),
            page_size: default_page_size(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_step_ms: default_backoff_step_ms(),
            throttle_ms: default_throttle_ms(),
        }
    }
}

impl DeletionConfig {
    /// Delay before retrying after the `attempt`-th (0-based) throttled call
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms + u64::from(attempt) * self.backoff_step_ms)
    }

    /// Pause between successful chunks
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_file: default_cache_file(),
        }
    }
}

fn default_period_days() -> u32 {
    30
}

fn default_label() -> String {
    "INBOX".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_page_size() -> u32 {
    500
}

fn default_max_concurrent() -> usize {
    40
}

fn default_chunk_size() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_step_ms() -> u64 {
    500
}

fn default_throttle_ms() -> u64 {
    300
}

fn default_cache_file() -> PathBuf {
    PathBuf::from(".gmail-sweeper/cache.json")
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GmailError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GmailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scan.period_days == 0 {
            return Err(GmailError::ConfigError(
                "scan.period_days must be at least 1".to_string(),
            ));
        }
        if self.scan.period_days > 3650 {
            return Err(GmailError::ConfigError(
                "scan.period_days cannot exceed 3650 (10 years)".to_string(),
            ));
        }

        if self.scan.label.trim().is_empty() {
            return Err(GmailError::ConfigError(
                "scan.label cannot be empty".to_string(),
            ));
        }

        if self.scan.batch_size == 0 || self.scan.batch_size > 1000 {
            return Err(GmailError::ConfigError(
                "scan.batch_size must be between 1 and 1000".to_string(),
            ));
        }

        if self.scan.page_size == 0 || self.scan.page_size > 500 {
            return Err(GmailError::ConfigError(
                "scan.page_size must be between 1 and 500".to_string(),
            ));
        }

        // Must stay under Gmail API rate limits of 250 units/sec
        if self.scan.max_concurrent_requests == 0 {
            return Err(GmailError::ConfigError(
                "scan.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.scan.max_concurrent_requests > 50 {
            return Err(GmailError::ConfigError(
                "scan.max_concurrent_requests cannot exceed 50".to_string(),
            ));
        }

        // batchModify accepts at most 1000 ids per call
        if self.deletion.chunk_size == 0 || self.deletion.chunk_size > 1000 {
            return Err(GmailError::ConfigError(
                "deletion.chunk_size must be between 1 and 1000".to_string(),
            ));
        }

        if self.deletion.max_attempts == 0 {
            return Err(GmailError::ConfigError(
                "deletion.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.storage.cache_file.as_os_str().is_empty() {
            return Err(GmailError::ConfigError(
                "storage.cache_file cannot be empty".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
