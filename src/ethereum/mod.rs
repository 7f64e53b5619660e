pub mod abi;
pub mod classify;
pub mod contract;
pub mod explorer;
pub mod inspector;
pub mod provider;
pub mod retry;
pub mod utils;

use alloy::dyn_abi::DynSolValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use provider::ChainError;

/// Why a single function invocation produced no value
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("function '{0}' not found in contract ABI")]
    NotFound(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("failed to encode call: {0}")]
    Encode(String),
    #[error("failed to decode result: {0}")]
    Decode(String),
    #[error("invocation aborted unexpectedly: {0}")]
    Panicked(String),
}

/// Decoded return data of a successful call
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnValue {
    /// The sole output, or a tuple of all outputs (empty for `void`)
    pub value: DynSolValue,
    pub output_type: String,
}

/// Outcome of invoking one function
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub function_name: String,
    pub result: Result<ReturnValue, CallError>,
}

impl CallOutcome {
    pub fn succeeded(function_name: impl Into<String>, value: ReturnValue) -> Self {
        Self {
            function_name: function_name.into(),
            result: Ok(value),
        }
    }

    pub fn failed(function_name: impl Into<String>, error: CallError) -> Self {
        Self {
            function_name: function_name.into(),
            result: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Warning,
    Error,
}

/// A successful call, formatted for the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub function_name: String,
    pub result: Value,
    #[serde(rename = "type")]
    pub output_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCall {
    pub function_name: String,
    pub error: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_view_functions: usize,
    pub successful_calls: usize,
    pub failed_calls: usize,
}

/// Everything learned about a contract in one inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionReport {
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_functions: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_summary: Option<AnalysisSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_functions: Option<Vec<FunctionResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_functions: Option<Vec<FailedCall>>,
    pub timestamp: DateTime<Utc>,
}

impl InspectionReport {
    fn empty(status: ReportStatus, contract_address: Option<String>) -> Self {
        Self {
            status,
            error: None,
            message: None,
            contract_address,
            contract_name: None,
            total_functions: None,
            analysis_summary: None,
            successful_functions: None,
            failed_functions: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(reason: impl Into<String>, contract_address: Option<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::empty(ReportStatus::Error, contract_address)
        }
    }

    pub fn warning(
        message: impl Into<String>,
        contract_address: String,
        total_functions: usize,
    ) -> Self {
        Self {
            message: Some(message.into()),
            total_functions: Some(total_functions),
            ..Self::empty(ReportStatus::Warning, Some(contract_address))
        }
    }

    pub fn success(
        contract_address: String,
        contract_name: Option<String>,
        total_view_functions: usize,
        successful: Vec<FunctionResult>,
        failed: Vec<FailedCall>,
    ) -> Self {
        let analysis_summary = AnalysisSummary {
            total_view_functions,
            successful_calls: successful.len(),
            failed_calls: failed.len(),
        };

        Self {
            contract_name,
            analysis_summary: Some(analysis_summary),
            successful_functions: Some(successful),
            failed_functions: (!failed.is_empty()).then_some(failed),
            ..Self::empty(ReportStatus::Success, Some(contract_address))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSummary {
    pub address: String,
    pub is_contract: bool,
    pub is_verified: bool,
    pub contract_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_version: Option<String>,
    /// Implementation behind a proxy contract
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,
}

/// Result of the quick summary operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SummaryResult {
    Summary(ContractSummary),
    Invalid { error: String },
}
