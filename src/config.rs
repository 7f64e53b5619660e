use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::ethereum::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    pub explorer: ExplorerConfig,
    pub requests: RequestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub rate_limit_per_second: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                url: "https://eth.llamarpc.com".to_string(),
            },
            explorer: ExplorerConfig {
                base_url: "https://api.etherscan.io/v2/api".to_string(),
                api_key: String::new(),
                chain_id: 1,
            },
            requests: RequestConfig {
                timeout_secs: 30,
                max_retries: 3,
                rate_limit_per_second: 4,
                retry_base_delay_ms: default_retry_base_delay_ms(),
                backoff_factor: default_backoff_factor(),
            },
        }
    }
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
            self.backoff_factor,
        )
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;

        Ok(())
    }

    /// Load configuration with fallback to default, then apply environment overrides
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply environment variable overrides. `lookup` is `std::env::var` outside of tests.
    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RPC_URL") {
            tracing::debug!("Using RPC_URL environment variable");
            self.rpc.url = url;
        }

        if let Some(api_key) = lookup("ETHERSCAN_API_KEY") {
            tracing::debug!("ETHERSCAN_API_KEY found, will be used for ABI resolution");
            self.explorer.api_key = api_key;
        }

        if let Some(base_url) = lookup("ETHERSCAN_BASE_URL") {
            self.explorer.base_url = base_url;
        }

        if let Some(chain_id) = parse_env(&lookup, "CHAIN_ID") {
            self.explorer.chain_id = chain_id;
        }
        if let Some(timeout) = parse_env(&lookup, "REQUEST_TIMEOUT") {
            self.requests.timeout_secs = timeout;
        }
        if let Some(retries) = parse_env(&lookup, "MAX_RETRIES") {
            self.requests.max_retries = retries;
        }
        if let Some(rate) = parse_env(&lookup, "RATE_LIMIT_PER_SECOND") {
            self.requests.rate_limit_per_second = rate;
        }

        if self.explorer.api_key.is_empty() {
            tracing::warn!(
                "No explorer API key configured, set ETHERSCAN_API_KEY for reliable ABI resolution"
            );
        }
    }

    /// Checks the values the inspector cannot run without
    pub fn validate(&self) -> Result<()> {
        if self.rpc.url.trim().is_empty() {
            return Err(anyhow!("RPC URL is not configured"));
        }
        if self.explorer.base_url.trim().is_empty() {
            return Err(anyhow!("Explorer base URL is not configured"));
        }
        if self.requests.rate_limit_per_second == 0 {
            return Err(anyhow!("rate_limit_per_second must be at least 1"));
        }
        if self.requests.backoff_factor < 1.0 {
            return Err(anyhow!(
                "backoff_factor must be at least 1.0, got {}",
                self.requests.backoff_factor
            ));
        }
        Ok(())
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<std::path::PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("contract-inspector").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# Contract Inspector Configuration File

# JSON-RPC endpoint of the chain being inspected
[rpc]
url = "https://eth.llamarpc.com"

# Etherscan-compatible explorer used for ABI and verification lookups
[explorer]
base_url = "https://api.etherscan.io/v2/api"
api_key = "YOUR_API_KEY_HERE"
chain_id = 1

[requests]
timeout_secs = 30
max_retries = 3              # retries after the first attempt
rate_limit_per_second = 4    # explorer requests per second
retry_base_delay_ms = 1000
backoff_factor = 2.0

# Environment variables that override the values above:
# RPC_URL, ETHERSCAN_API_KEY, ETHERSCAN_BASE_URL, CHAIN_ID,
# REQUEST_TIMEOUT, MAX_RETRIES, RATE_LIMIT_PER_SECOND
"#;
        sample_config.to_string()
    }
}

fn parse_env<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}: '{}' is not a valid value", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_sample_config_parses() {
        let config: Config = toml::from_str(&Config::generate_sample()).unwrap();
        assert_eq!(config.explorer.chain_id, 1);
        assert_eq!(config.requests.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.explorer.chain_id = 137;
        config.requests.rate_limit_per_second = 2;
        config.save_to_file(&path).await.unwrap();

        let loaded = Config::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.explorer.chain_id, 137);
        assert_eq!(loaded.requests.rate_limit_per_second, 2);
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let temp_dir = tempdir().unwrap();
        let config = Config::load_or_default(Some(temp_dir.path().join("absent.toml"))).await;
        assert!(!config.rpc.url.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RPC_URL", "http://localhost:8545"),
            ("CHAIN_ID", "10"),
            ("MAX_RETRIES", "not-a-number"),
            ("RATE_LIMIT_PER_SECOND", " 5 "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.rpc.url, "http://localhost:8545");
        assert_eq!(config.explorer.chain_id, 10);
        assert_eq!(config.requests.max_retries, 3);
        assert_eq!(config.requests.rate_limit_per_second, 5);
    }

    #[test]
    fn test_validate_rejects_zero_rate() {
        let mut config = Config::default();
        config.requests.rate_limit_per_second = 0;
        assert!(config.validate().is_err());
    }
}
