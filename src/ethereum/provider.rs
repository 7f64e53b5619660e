use alloy::{
    primitives::{Address, Bytes},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::TransactionRequest,
    transports::{
        http::{Client, Http},
        TransportError,
    },
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use thiserror::Error;

use crate::ethereum::utils;

/// Why a chain request failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    /// The node executed the call and the contract reverted
    #[error("contract logic error: {0}")]
    Revert(String),
    /// The node or the transport between us and it failed
    #[error("{0}")]
    Rpc(String),
    #[error("unknown error: {0}")]
    Other(String),
}

impl ChainError {
    /// Reverts are deterministic for a fixed chain state, so retrying them is pointless.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ChainError::Revert(_))
    }
}

impl From<TransportError> for ChainError {
    fn from(err: TransportError) -> Self {
        match &err {
            TransportError::ErrorResp(payload)
                if payload.code == 3 || payload.message.contains("revert") =>
            {
                ChainError::Revert(payload.message.to_string())
            }
            TransportError::ErrorResp(_) | TransportError::Transport(_) => {
                ChainError::Rpc(utils::interpret_rpc_error(&err.to_string()))
            }
            _ => ChainError::Other(err.to_string()),
        }
    }
}

/// The read-only JSON-RPC surface the inspector needs from a node
#[async_trait]
pub trait ChainRpc: Send + Sync + std::fmt::Debug {
    async fn block_number(&self) -> Result<u64, ChainError>;

    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError>;

    /// `eth_call` against the latest block
    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError>;
}

/// HTTP JSON-RPC node backed by an alloy provider
#[derive(Debug, Clone)]
pub struct HttpRpc {
    provider: RootProvider<Http<Client>>,
}

impl HttpRpc {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let url: reqwest::Url = rpc_url
            .parse()
            .map_err(|e| anyhow!("Invalid RPC URL '{}': {}", rpc_url, e))?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self { provider })
    }
}

#[async_trait]
impl ChainRpc for HttpRpc {
    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ChainError> {
        Ok(self.provider.get_code_at(address).await?)
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError> {
        let request = TransactionRequest::default().to(to).input(input.into());
        Ok(self.provider.call(&request).await?)
    }
}
