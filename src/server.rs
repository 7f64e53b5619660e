use anyhow::Result;
use rmcp::{
    model::{ServerCapabilities, ServerInfo},
    tool,
    transport::stdio,
    ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::{config::Config, ethereum::inspector::ContractInspector};

#[derive(Debug, Clone)]
pub struct ContractInspectorServer {
    inspector: Arc<ContractInspector>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ContractAddressRequest {
    /// Contract address, `0x` followed by 40 hex characters
    contract_address: String,
}

fn to_pretty_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        error!("Failed to serialize tool output: {}", e);
        serde_json::json!({ "error": format!("failed to serialize result: {}", e) }).to_string()
    })
}

impl ContractInspectorServer {
    pub fn new(config: &Config) -> Result<Self> {
        let inspector = Arc::new(ContractInspector::new(config)?);
        Ok(Self { inspector })
    }

    pub async fn run(&self) -> Result<()> {
        info!("Starting contract inspector MCP server");

        let service = self.clone().serve(stdio()).await?;

        info!("Contract inspector MCP server started");
        let _ = service.waiting().await;
        Ok(())
    }
}

#[tool(tool_box)]
impl ContractInspectorServer {
    #[tool(
        description = "Inspect a verified smart contract: call every zero-argument view function and report the results"
    )]
    async fn contract_info(&self, #[tool(aggr)] request: ContractAddressRequest) -> String {
        let report = self.inspector.inspect(&request.contract_address).await;
        to_pretty_json(&report)
    }

    #[tool(
        description = "Quick overview of an address: whether it holds code, whether it is verified, and its name"
    )]
    async fn contract_summary(&self, #[tool(aggr)] request: ContractAddressRequest) -> String {
        let summary = self.inspector.summarize(&request.contract_address).await;
        to_pretty_json(&summary)
    }
}

#[tool(tool_box)]
impl ServerHandler for ContractInspectorServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Read-only smart contract inspector. Fetches a contract's verified ABI from an Etherscan-compatible explorer, calls its zero-argument view and pure functions over JSON-RPC, and returns the formatted results.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::{InspectionReport, SummaryResult};

    #[test]
    fn test_tool_output_is_pretty_json() {
        let report = InspectionReport::error("invalid address format: 0x1", None);
        let out = to_pretty_json(&report);
        assert!(out.contains('\n'));

        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["status"], "error");
    }

    #[tokio::test]
    async fn test_summary_tool_rejects_bad_address() {
        let server = ContractInspectorServer::new(&Config::default()).unwrap();
        let out = server
            .contract_summary(ContractAddressRequest {
                contract_address: "nope".to_string(),
            })
            .await;

        let parsed: SummaryResult = serde_json::from_str(&out).unwrap();
        assert_eq!(
            parsed,
            SummaryResult::Invalid {
                error: "invalid address format".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_info_tool_rejects_bad_address() {
        let server = ContractInspectorServer::new(&Config::default()).unwrap();
        let out = server
            .contract_info(ContractAddressRequest {
                contract_address: "0x123".to_string(),
            })
            .await;

        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["status"], "error");
        assert_eq!(parsed["error"], "invalid address format: 0x123");
    }
}
