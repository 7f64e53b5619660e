use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::ethereum::{
    abi::ContractAbi,
    retry::{RateLimiter, RetryPolicy},
    utils,
};

/// Verification metadata published by the explorer for a contract
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceInfo {
    #[serde(default)]
    pub source_code: String,
    #[serde(rename = "ABI", default)]
    pub abi: String,
    #[serde(default)]
    pub contract_name: String,
    #[serde(default)]
    pub compiler_version: String,
    #[serde(default)]
    pub proxy: String,
    #[serde(default)]
    pub implementation: String,
}

impl SourceInfo {
    pub fn is_verified(&self) -> bool {
        !self.source_code.trim().is_empty() || !self.abi.trim().is_empty()
    }

    pub fn name(&self) -> Option<String> {
        non_blank(&self.contract_name)
    }

    pub fn compiler_version(&self) -> Option<String> {
        non_blank(&self.compiler_version)
    }

    /// Implementation address behind a proxy, if the explorer detected one
    pub fn implementation(&self) -> Option<String> {
        if self.proxy.trim() != "1" {
            return None;
        }
        non_blank(&self.implementation)
    }
}

/// Client for an Etherscan-compatible explorer API.
///
/// Every request waits for a slot on the shared [`RateLimiter`] before each
/// attempt, retries included. Lookups never fail outward: an unreachable or
/// unhappy explorer reads as "no data".
#[derive(Debug, Clone)]
pub struct MetadataClient {
    client: Client,
    base_url: String,
    api_key: String,
    chain_id: u64,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl MetadataClient {
    pub fn new(config: &Config, limiter: Arc<RateLimiter>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.requests.timeout())
            .build()
            .map_err(|e| anyhow!("Failed to build explorer HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: config.explorer.base_url.clone(),
            api_key: config.explorer.api_key.clone(),
            chain_id: config.explorer.chain_id,
            limiter,
            retry: config.requests.retry_policy(),
        })
    }

    /// Issues one `module=contract` query, throttled and retried
    async fn query(&self, action: &str, address: &str) -> Result<Value> {
        let params = [
            ("module", "contract".to_string()),
            ("action", action.to_string()),
            ("address", address.to_string()),
            ("apikey", self.api_key.clone()),
            ("chainid", self.chain_id.to_string()),
        ];

        self.retry.run(|| self.send_once(&params)).await
    }

    async fn send_once(&self, params: &[(&str, String)]) -> Result<Value> {
        self.limiter.acquire().await;
        debug!("GET {} action={}", self.base_url, params[1].1);

        let response = self
            .client
            .get(&self.base_url)
            .query(params)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to reach explorer: {}", e))?
            .error_for_status()
            .map_err(|e| anyhow!("Explorer returned an error status: {}", e))?;

        response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse explorer response: {}", e))
    }

    /// Runs a query and returns its `result` field if the explorer reports success
    async fn query_result(&self, action: &str, address: &str) -> Option<Value> {
        let response = match self.query(action, address).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "Explorer {} request for {} failed: {}",
                    action,
                    address,
                    utils::interpret_explorer_error(&e.to_string())
                );
                return None;
            }
        };

        if !is_success(&response) {
            let message = response["message"].as_str().unwrap_or("Unknown error");
            let detail = response["result"].as_str().unwrap_or_default();
            warn!(
                "Explorer {} for {} returned an error: {} {}",
                action, address, message, detail
            );
            return None;
        }

        Some(response["result"].clone())
    }

    /// Fetches the published ABI of a verified contract
    pub async fn fetch_abi(&self, address: &str) -> Option<ContractAbi> {
        let result = self.query_result("getabi", address).await?;

        // Some explorers return the ABI already decoded
        let parsed = match &result {
            Value::String(abi) if abi.trim().is_empty() => {
                warn!("Explorer returned an empty ABI for {}", address);
                return None;
            }
            Value::String(abi) => ContractAbi::parse(abi),
            Value::Array(_) => ContractAbi::from_value(result.clone()),
            _ => Err(anyhow!("unexpected result type")),
        };

        match parsed {
            Ok(abi) => {
                debug!("Fetched ABI with {} entries for {}", abi.entries().len(), address);
                Some(abi)
            }
            Err(e) => {
                warn!("Invalid ABI returned for {}: {}", address, e);
                None
            }
        }
    }

    /// Fetches the first source-code record for `address`
    pub async fn fetch_source_info(&self, address: &str) -> Option<SourceInfo> {
        let result = self.query_result("getsourcecode", address).await?;
        let first = result.as_array()?.first()?.clone();

        match serde_json::from_value(first) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Malformed source info for {}: {}", address, e);
                None
            }
        }
    }

    pub async fn is_verified(&self, address: &str) -> bool {
        self.fetch_source_info(address)
            .await
            .is_some_and(|info| info.is_verified())
    }

    pub async fn fetch_name(&self, address: &str) -> Option<String> {
        self.fetch_source_info(address).await?.name()
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn is_success(response: &Value) -> bool {
    match &response["status"] {
        Value::String(status) => status == "1",
        Value::Number(status) => status.as_u64() == Some(1),
        _ => false,
    }
}
