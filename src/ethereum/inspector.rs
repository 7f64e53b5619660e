use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::{ContractSummary, InspectionReport, SummaryResult};
use crate::config::Config;
use crate::ethereum::{
    abi::select_invocable,
    classify,
    contract::{ChainClient, CodeProbe},
    explorer::MetadataClient,
    retry::RateLimiter,
    utils,
};

/// Runs the inspection pipeline against one chain and one explorer.
///
/// The inspector is shared across concurrent requests; the only state it
/// keeps between them is the connection check and the explorer rate limit.
#[derive(Debug)]
pub struct ContractInspector {
    metadata: MetadataClient,
    chain: ChainClient,
    initialized: AtomicBool,
}

impl ContractInspector {
    pub fn new(config: &Config) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::per_second(
            config.requests.rate_limit_per_second,
        ));
        let metadata = MetadataClient::new(config, limiter)?;
        let chain = ChainClient::new(config)?;

        Ok(Self::from_parts(metadata, chain))
    }

    pub fn from_parts(metadata: MetadataClient, chain: ChainClient) -> Self {
        Self {
            metadata,
            chain,
            initialized: AtomicBool::new(false),
        }
    }

    /// Checks the RPC connection once; later calls reuse a successful result
    pub async fn initialize(&self) -> bool {
        if self.initialized.load(Ordering::Acquire) {
            return true;
        }

        if !self.chain.verify_connection().await {
            warn!("RPC connection check failed, cannot inspect contracts");
            return false;
        }

        self.initialized.store(true, Ordering::Release);
        info!("Contract inspector initialized");
        true
    }

    /// Calls every zero-argument view function of the contract at `address`
    pub async fn inspect(&self, address: &str) -> InspectionReport {
        if !utils::is_valid_address(address) {
            return InspectionReport::error(format!("invalid address format: {}", address), None);
        }
        let address = utils::to_checksum_address(address);

        if !self.initialize().await {
            return InspectionReport::error("initialization failed", Some(address));
        }

        match self.chain.probe_code(&address).await {
            CodeProbe::Contract => {}
            CodeProbe::NoCode => {
                return InspectionReport::error(
                    format!("not a contract address: {}", address),
                    Some(address),
                );
            }
            CodeProbe::Unreachable(e) => {
                return InspectionReport::error(
                    format!("contract check failed: {}", e),
                    Some(address),
                );
            }
        }

        info!("Fetching ABI for {}", address);
        let Some(abi) = self.metadata.fetch_abi(&address).await else {
            return InspectionReport::error(
                "ABI unavailable / unverified: the contract may not be verified on the explorer",
                Some(address),
            );
        };

        let view_functions = select_invocable(&abi);
        if view_functions.is_empty() {
            return InspectionReport::warning(
                "no zero-argument view functions found",
                address,
                abi.function_count(),
            );
        }
        info!("Found {} zero-argument view functions", view_functions.len());

        let Some(handle) = self.chain.instantiate(&address, &abi) else {
            return InspectionReport::error("instance creation failed", Some(address));
        };

        let names: Vec<String> = view_functions.iter().map(|f| f.name.clone()).collect();
        let outcomes = self.chain.invoke_all(&handle, &names).await;
        let (successful, failed) = classify::partition(&outcomes);

        let contract_name = self.metadata.fetch_name(&address).await;

        info!(
            "Inspection of {} complete: {} succeeded, {} failed",
            address,
            successful.len(),
            failed.len()
        );

        InspectionReport::success(
            address,
            contract_name,
            view_functions.len(),
            successful,
            failed,
        )
    }

    /// Quick overview without fetching the ABI or calling any function
    pub async fn summarize(&self, address: &str) -> SummaryResult {
        if !utils::is_valid_address(address) {
            return SummaryResult::Invalid {
                error: "invalid address format".to_string(),
            };
        }
        let address = utils::to_checksum_address(address);

        let is_contract = self.chain.is_contract(&address).await;
        let source_info = self.metadata.fetch_source_info(&address).await;

        SummaryResult::Summary(ContractSummary {
            is_contract,
            is_verified: source_info.as_ref().is_some_and(|info| info.is_verified()),
            contract_name: source_info.as_ref().and_then(|info| info.name()),
            compiler_version: source_info.as_ref().and_then(|info| info.compiler_version()),
            implementation: source_info.as_ref().and_then(|info| info.implementation()),
            address,
        })
    }
}
