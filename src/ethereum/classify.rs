//! Turns raw call outcomes into report entries.

use alloy::{dyn_abi::DynSolValue, primitives::U256};
use serde_json::Value;

use super::{utils, CallOutcome, FailedCall, FunctionResult, ReturnValue};

/// Values above this many wei get a human-readable magnitude
const WEI_FORMAT_THRESHOLD: u64 = 1_000_000_000_000_000;

const DISPLAY_DECIMALS: u32 = 6;

const UNIT_TIERS: [(u32, &str); 3] = [(18, "Ether"), (15, "milli-Ether"), (12, "micro-Ether")];

/// `void` for no outputs, the sole output's type, or `tuple` for several
pub fn output_type<'a, I>(types: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut types = types.into_iter();
    match (types.next(), types.next()) {
        (None, _) => "void".to_string(),
        (Some(ty), None) => ty.to_string(),
        _ => "tuple".to_string(),
    }
}

/// Scales a wei amount to the largest unit it reaches, with six decimals
pub fn format_large_number(value: U256) -> String {
    for (exponent, unit) in UNIT_TIERS {
        if value >= U256::from(10u64.pow(exponent)) {
            return format!("{} {}", scale(value, exponent), unit);
        }
    }
    value.to_string()
}

// value / 10^exponent, rounded half up at the last displayed decimal
fn scale(value: U256, exponent: u32) -> String {
    let step = U256::from(10u64.pow(exponent - DISPLAY_DECIMALS));
    let rounded = value.saturating_add(step / U256::from(2u8)) / step;
    let precision = U256::from(10u64.pow(DISPLAY_DECIMALS));

    format!(
        "{}.{:0width$}",
        rounded / precision,
        (rounded % precision).to::<u64>(),
        width = DISPLAY_DECIMALS as usize
    )
}

/// Converts a decoded value into JSON; integers become decimal strings to keep precision
pub fn value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Address(addr) => Value::String(format!("0x{:x}", addr)),
        DynSolValue::Uint(num, _) => Value::String(num.to_string()),
        DynSolValue::Int(num, _) => Value::String(num.to_string()),
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Array(items)
        | DynSolValue::FixedArray(items)
        | DynSolValue::Tuple(items) => Value::Array(items.iter().map(value_to_json).collect()),
        other => Value::String(format!("{:?}", other)),
    }
}

fn coerce_bool(value: &DynSolValue) -> Option<bool> {
    match value {
        DynSolValue::Bool(b) => Some(*b),
        DynSolValue::Uint(num, _) => Some(!num.is_zero()),
        _ => None,
    }
}

/// Formats one successful call. Unknown types keep only the basic fields.
pub fn classify(function_name: &str, ret: &ReturnValue) -> FunctionResult {
    let mut entry = FunctionResult {
        function_name: function_name.to_string(),
        result: value_to_json(&ret.value),
        output_type: ret.output_type.clone(),
        status: "success".to_string(),
        formatted_value: None,
        checksum_address: None,
    };

    let ty = ret.output_type.as_str();
    if ty.starts_with("uint") {
        if let DynSolValue::Uint(num, _) = &ret.value {
            if *num > U256::from(WEI_FORMAT_THRESHOLD) {
                entry.formatted_value = Some(format_large_number(*num));
            }
        }
    } else if ty == "address" {
        let raw = match &entry.result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        entry.checksum_address = Some(utils::to_checksum_address(&raw));
    } else if ty == "bool" {
        if let Some(flag) = coerce_bool(&ret.value) {
            entry.result = Value::Bool(flag);
        }
    }

    entry
}

/// Splits outcomes into formatted successes and failures, keeping their order
pub fn partition(outcomes: &[CallOutcome]) -> (Vec<FunctionResult>, Vec<FailedCall>) {
    let mut successful = Vec::new();
    let mut failed = Vec::new();

    for outcome in outcomes {
        match &outcome.result {
            Ok(ret) => successful.push(classify(&outcome.function_name, ret)),
            Err(e) => failed.push(FailedCall {
                function_name: outcome.function_name.clone(),
                error: e.to_string(),
                status: "failed".to_string(),
            }),
        }
    }

    (successful, failed)
}
