use alloy::json_abi::JsonAbi;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed input or output parameter of an ABI entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: String,
}

/// One member of a contract ABI, exactly as the explorer published it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbiEntry {
    /// `function`, `event`, `constructor`, `error`, `fallback`, `receive`
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "stateMutability", default)]
    pub state_mutability: Option<String>,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub outputs: Vec<AbiParam>,
}

// Solidity's JSON ABI lets `type` be omitted for functions
fn default_kind() -> String {
    "function".to_string()
}

impl AbiEntry {
    pub fn is_function(&self) -> bool {
        self.kind == "function"
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.state_mutability.as_deref(), Some("view") | Some("pure"))
    }
}

/// A decoded contract ABI that keeps entries in declaration order.
///
/// `JsonAbi` groups functions by name, so the ordered entries are kept
/// alongside the raw JSON used to build typed descriptors later.
#[derive(Debug, Clone)]
pub struct ContractAbi {
    entries: Vec<AbiEntry>,
    raw: Value,
}

impl ContractAbi {
    /// Parses a JSON-encoded ABI. Anything other than a JSON array of entries is rejected.
    pub fn parse(json: &str) -> Result<Self> {
        let raw: Value =
            serde_json::from_str(json).map_err(|e| anyhow!("ABI is not valid JSON: {}", e))?;
        Self::from_value(raw)
    }

    pub fn from_value(raw: Value) -> Result<Self> {
        if !raw.is_array() {
            return Err(anyhow!("ABI must be a JSON array"));
        }

        let entries: Vec<AbiEntry> = serde_json::from_value(raw.clone())
            .map_err(|e| anyhow!("Malformed ABI entry: {}", e))?;

        Ok(Self { entries, raw })
    }

    pub fn entries(&self) -> &[AbiEntry] {
        &self.entries
    }

    pub fn function_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_function()).count()
    }

    /// Typed view used to encode calls and decode return data
    pub fn to_json_abi(&self) -> Result<JsonAbi> {
        serde_json::from_value(self.raw.clone())
            .map_err(|e| anyhow!("Failed to build typed ABI: {}", e))
    }
}

/// A function that can be called with no arguments and without a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct InvocableFunction {
    pub name: String,
}

/// Selects zero-argument `view`/`pure` functions, preserving declaration order
pub fn select_invocable(abi: &ContractAbi) -> Vec<InvocableFunction> {
    abi.entries()
        .iter()
        .filter(|entry| entry.is_function() && entry.is_read_only() && entry.inputs.is_empty())
        .map(|entry| InvocableFunction {
            name: entry.name.clone(),
        })
        .collect()
}
