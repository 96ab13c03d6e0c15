use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

pub const DEFAULT_BASE_URL: &str = "https://www.okx.com";
pub const DEFAULT_INST_ID: &str = "SOL-USDT-SWAP";
pub const DEFAULT_BAR: &str = "1H";
/// Largest page the history endpoint will return.
pub const MAX_PAGE_LIMIT: u32 = 100;

// CONFIGURATION
// Every field has a default, so a config file only needs the keys it overrides.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub inst_id: String, // e.g., "SOL-USDT-SWAP"
    pub bar: String,     // e.g., "1H"
    pub days: u32,       // lookback covered by the output table
    pub output: String,
    pub timeout_secs: u64,
    /// Total attempts per page request, including the first one.
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub base_url: String,
    pub proxy: Option<String>, // e.g., "http://127.0.0.1:7890"
    /// Skips certificate validation. Diagnostic use only.
    pub insecure: bool,
    pub max_batches: u32,
    pub page_limit: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            inst_id: DEFAULT_INST_ID.to_string(),
            bar: DEFAULT_BAR.to_string(),
            days: 30,
            output: "sol_usdt_ma.csv".to_string(),
            timeout_secs: 10,
            retries: 3,
            retry_backoff_ms: 1500,
            base_url: DEFAULT_BASE_URL.to_string(),
            proxy: None,
            insecure: false,
            max_batches: 200,
            page_limit: MAX_PAGE_LIMIT,
        }
    }
}

impl FetchConfig {
    /// Reads a JSON config file. Missing keys fall back to defaults.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        // Read raw bytes; serde_json validates UTF-8 while parsing.
        let content = fs::read(path).await?;
        let config = serde_json::from_slice(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.inst_id.trim().is_empty() {
            return Err(PipelineError::Config("inst_id must not be empty".into()));
        }
        if self.days == 0 {
            return Err(PipelineError::Config("days must be at least 1".into()));
        }
        if self.max_batches == 0 {
            return Err(PipelineError::Config("max_batches must be at least 1".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(PipelineError::Config(format!(
                "base_url must be an http(s) url, got {:?}",
                self.base_url
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn attempts(&self) -> u32 {
        self.retries.max(1)
    }

    /// Page size actually sent; never above the provider maximum.
    pub fn effective_page_limit(&self) -> u32 {
        self.page_limit.clamp(1, MAX_PAGE_LIMIT)
    }
}
