use alloy::primitives::Address;
use anyhow::{anyhow, Result};
use std::str::FromStr;

/// True iff `address` is `0x` followed by exactly 40 hex digits, in any case.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Best-effort EIP-55 checksum casing.
///
/// Returns the input unchanged if it cannot be parsed as an address, so the
/// result is only guaranteed checksummed for well-formed input.
pub fn to_checksum_address(address: &str) -> String {
    match Address::from_str(address.trim()) {
        Ok(parsed) => parsed.to_checksum(None),
        Err(_) => address.to_string(),
    }
}

/// Validates and parses an address that is about to leave the process
pub fn parse_address(address: &str) -> Result<Address> {
    if !is_valid_address(address) {
        return Err(anyhow!(
            "Invalid address format: '{}'. Addresses must be 0x followed by 40 hexadecimal characters",
            address
        ));
    }

    Address::from_str(address).map_err(|e| anyhow!("Invalid address '{}': {}", address, e))
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    let lowered = error.to_ascii_lowercase();
    if lowered.contains("connection refused") || lowered.contains("network unreachable") {
        "Network error: Cannot connect to RPC endpoint. Check your internet connection and RPC URL configuration.".to_string()
    } else if lowered.contains("timeout") || lowered.contains("timed out") {
        "Network error: Request timed out. The RPC endpoint may be overloaded or unreachable."
            .to_string()
    } else if lowered.contains("rate limit") || lowered.contains("429") {
        "Rate limit error: Too many requests to the RPC endpoint. Try again in a few moments or use a different endpoint.".to_string()
    } else if lowered.contains("method not found") {
        "RPC error: The requested method is not supported by this RPC endpoint. Try using a different endpoint.".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}

/// Creates user-friendly error messages for explorer request failures
pub fn interpret_explorer_error(error: &str) -> String {
    let lowered = error.to_ascii_lowercase();
    if lowered.contains("rate limit") || lowered.contains("429") {
        "API rate limit: Too many requests to the explorer API. Lower rate_limit_per_second or provide your own ETHERSCAN_API_KEY.".to_string()
    } else if lowered.contains("invalid api key") || lowered.contains("403") {
        "API authentication error: Invalid explorer API key. Check your ETHERSCAN_API_KEY environment variable.".to_string()
    } else if lowered.contains("timed out") || lowered.contains("timeout") {
        "Timeout error: Request to the explorer API timed out.".to_string()
    } else if lowered.contains("connect") {
        "Network error: Cannot connect to the explorer API. Check your internet connection."
            .to_string()
    } else {
        format!("Explorer error: {}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_address() {
        assert!(is_valid_address("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e"));
        assert!(is_valid_address("0x0000000000000000000000000000000000000000"));
        assert!(is_valid_address("0xABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD"));

        assert!(!is_valid_address(""));
        assert!(!is_valid_address("not-an-address"));
        assert!(!is_valid_address("0x123"));
        assert!(!is_valid_address("742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e"));
        assert!(!is_valid_address("0X742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e"));
        assert!(!is_valid_address("0xgg2d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e"));
        assert!(!is_valid_address("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e0"));
        assert!(!is_valid_address(" 0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6"));
    }

    #[test]
    fn test_checksum_vectors() {
        assert_eq!(
            to_checksum_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
        assert_eq!(
            to_checksum_address("0xFB6916095CA1DF60BB79CE92CE3EA74C37C5D359"),
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359"
        );
        assert_eq!(
            to_checksum_address("0xd1220a0cf47c7b9be7a2e6ba89f429762e7b9adb"),
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb"
        );
    }

    #[test]
    fn test_checksum_is_idempotent() {
        for raw in [
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "0xdbf03b407c01e7cd3cbea99509d93f8dddc8c6fb",
            "0x0000000000000000000000000000000000000000",
        ] {
            let once = to_checksum_address(raw);
            assert_eq!(to_checksum_address(&once), once);
        }
    }

    #[test]
    fn test_checksum_passes_through_malformed_input() {
        assert_eq!(to_checksum_address("not-an-address"), "not-an-address");
        assert_eq!(to_checksum_address("0x123"), "0x123");
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_ok());
        assert!(parse_address("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_err());
    }

    #[test]
    fn test_interpret_rpc_error() {
        assert!(interpret_rpc_error("error sending request: connection refused")
            .starts_with("Network error"));
        assert!(interpret_rpc_error("HTTP error 429").starts_with("Rate limit"));
        assert_eq!(interpret_rpc_error("boom"), "RPC error: boom");
    }
}
