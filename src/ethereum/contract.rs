use alloy::{
    dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt},
    json_abi::Function,
    primitives::{Address, Bytes},
};
use anyhow::Result;
use futures::future::{join_all, FutureExt};
use std::any::Any;
use std::collections::{hash_map::Entry, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CallError, CallOutcome, ReturnValue};
use crate::config::Config;
use crate::ethereum::{
    abi::ContractAbi,
    classify,
    provider::{ChainError, ChainRpc, HttpRpc},
    retry::RetryPolicy,
    utils,
};

/// What a code lookup found at an address
#[derive(Debug, Clone, PartialEq)]
pub enum CodeProbe {
    Contract,
    NoCode,
    /// The node could not be asked, even after retries
    Unreachable(ChainError),
}

/// A contract address bound to typed descriptors of its functions.
///
/// Descriptors are resolved once, so dispatch by name is a map lookup.
#[derive(Debug, Clone)]
pub struct ContractHandle {
    address: Address,
    functions: HashMap<String, Function>,
}

impl ContractHandle {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }
}

/// Read-only access to the chain through one RPC handle
#[derive(Debug, Clone)]
pub struct ChainClient {
    rpc: Arc<dyn ChainRpc>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ChainClient {
    pub fn new(config: &Config) -> Result<Self> {
        let rpc = HttpRpc::new(&config.rpc.url)?;
        Ok(Self::with_rpc(
            Arc::new(rpc),
            config.requests.retry_policy(),
            config.requests.timeout(),
        ))
    }

    pub fn with_rpc(rpc: Arc<dyn ChainRpc>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            rpc,
            retry,
            timeout,
        }
    }

    /// Bounds a single attempt so a stalled node counts as a retryable failure
    async fn timed<T, F>(&self, request: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, ChainError>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Rpc(format!(
                "Network error: request timed out after {:?}",
                self.timeout
            ))),
        }
    }

    pub async fn block_number(&self) -> Option<u64> {
        match self
            .retry
            .run(|| self.timed(self.rpc.block_number()))
            .await
        {
            Ok(number) => Some(number),
            Err(e) => {
                warn!("Failed to fetch block number: {}", e);
                None
            }
        }
    }

    pub async fn verify_connection(&self) -> bool {
        match self.block_number().await {
            Some(number) => {
                info!("Connected to RPC endpoint at block {}", number);
                true
            }
            None => false,
        }
    }

    pub async fn probe_code(&self, address: &str) -> CodeProbe {
        let address = match utils::parse_address(address) {
            Ok(address) => address,
            Err(e) => return CodeProbe::Unreachable(ChainError::Other(e.to_string())),
        };

        debug!("Fetching bytecode for {:?}", address);
        match self
            .retry
            .run(|| self.timed(self.rpc.code_at(address)))
            .await
        {
            Ok(code) if code.is_empty() => CodeProbe::NoCode,
            Ok(_) => CodeProbe::Contract,
            Err(e) => {
                warn!("Bytecode lookup for {:?} failed: {}", address, e);
                CodeProbe::Unreachable(e)
            }
        }
    }

    /// True iff the address holds code. Lookup failures also read as false;
    /// use [`ChainClient::probe_code`] to tell them apart.
    pub async fn is_contract(&self, address: &str) -> bool {
        self.probe_code(address).await == CodeProbe::Contract
    }

    /// Binds `abi` to `address`, or `None` if the ABI cannot be typed
    pub fn instantiate(&self, address: &str, abi: &ContractAbi) -> Option<ContractHandle> {
        let address = match utils::parse_address(address) {
            Ok(address) => address,
            Err(e) => {
                warn!("Cannot bind contract handle: {}", e);
                return None;
            }
        };

        let typed = match abi.to_json_abi() {
            Ok(typed) => typed,
            Err(e) => {
                warn!("Cannot bind contract handle for {:?}: {}", address, e);
                return None;
            }
        };

        // Overloads share a name; the zero-argument one is the one we can call
        let mut functions = HashMap::new();
        for function in typed.functions() {
            match functions.entry(function.name.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(function.clone());
                }
                Entry::Occupied(mut slot) => {
                    if function.inputs.is_empty() {
                        slot.insert(function.clone());
                    }
                }
            }
        }

        Some(ContractHandle { address, functions })
    }

    /// Calls a zero-argument function with `eth_call`
    pub async fn invoke(&self, handle: &ContractHandle, function_name: &str) -> CallOutcome {
        let Some(function) = handle.function(function_name) else {
            return CallOutcome::failed(function_name, CallError::NotFound(function_name.into()));
        };

        match self.call_function(handle.address(), function).await {
            Ok(ret) => CallOutcome::succeeded(function_name, ret),
            Err(e) => {
                debug!("{} failed: {}", function_name, e);
                CallOutcome::failed(function_name, e)
            }
        }
    }

    async fn call_function(
        &self,
        to: Address,
        function: &Function,
    ) -> Result<ReturnValue, CallError> {
        let calldata = function
            .abi_encode_input(&[])
            .map_err(|e| CallError::Encode(e.to_string()))?;
        let input = Bytes::from(calldata);

        let output = self
            .retry
            .run_if(
                || self.timed(self.rpc.call(to, input.clone())),
                ChainError::is_retryable,
            )
            .await?;

        let output_type = classify::output_type(function.outputs.iter().map(|p| p.ty.as_str()));
        let value = decode_output(function, &output)?;

        Ok(ReturnValue { value, output_type })
    }

    /// Invokes every function concurrently; outcomes come back in input order.
    ///
    /// A failure, or even a panic, inside one invocation only affects its own outcome.
    pub async fn invoke_all(
        &self,
        handle: &ContractHandle,
        function_names: &[String],
    ) -> Vec<CallOutcome> {
        let calls = function_names.iter().map(|name| async move {
            match AssertUnwindSafe(self.invoke(handle, name)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    CallOutcome::failed(name, CallError::Panicked(panic_message(&*panic)))
                }
            }
        });

        join_all(calls).await
    }
}

fn decode_output(function: &Function, output: &Bytes) -> Result<DynSolValue, CallError> {
    if function.outputs.is_empty() {
        return Ok(DynSolValue::Tuple(vec![]));
    }

    let mut values = function
        .abi_decode_output(output, false)
        .map_err(|e| CallError::Decode(e.to_string()))?;

    if values.len() == 1 {
        Ok(values.remove(0))
    } else {
        Ok(DynSolValue::Tuple(values))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::provider::mock::{selector, MockRpc};
    use alloy::primitives::U256;
    use async_trait::async_trait;
    use std::str::FromStr;

    const ADDRESS: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn contract_address() -> Address {
        Address::from_str(ADDRESS).unwrap()
    }

    fn client(rpc: impl ChainRpc + 'static) -> ChainClient {
        ChainClient::with_rpc(
            Arc::new(rpc),
            RetryPolicy::new(2, Duration::from_millis(1), 2.0),
            Duration::from_secs(5),
        )
    }

    fn uint_word(value: u64) -> Bytes {
        DynSolValue::Uint(U256::from(value), 256).abi_encode().into()
    }

    fn view_abi(names: &[&str]) -> ContractAbi {
        let entries: Vec<_> = names
            .iter()
            .map(|name| {
                serde_json::json!({
                    "type": "function",
                    "name": name,
                    "stateMutability": "view",
                    "inputs": [],
                    "outputs": [{ "name": "", "type": "uint256" }]
                })
            })
            .collect();
        ContractAbi::from_value(serde_json::Value::Array(entries)).unwrap()
    }

    #[tokio::test]
    async fn test_verify_connection_retries() {
        let rpc = MockRpc::new();
        *rpc.flaky_block_number.lock().unwrap() = 2;
        assert!(client(rpc).verify_connection().await);

        let mut rpc = MockRpc::new();
        rpc.reachable = false;
        assert!(!client(rpc).verify_connection().await);
    }

    #[tokio::test]
    async fn test_code_probe() {
        let chain = client(MockRpc::new().with_code(contract_address()));
        assert_eq!(chain.probe_code(ADDRESS).await, CodeProbe::Contract);
        assert!(
            !chain
                .is_contract("0x0000000000000000000000000000000000000001")
                .await
        );

        let mut rpc = MockRpc::new();
        rpc.reachable = false;
        let chain = client(rpc);
        assert!(matches!(
            chain.probe_code(ADDRESS).await,
            CodeProbe::Unreachable(ChainError::Rpc(_))
        ));
        assert!(!chain.is_contract(ADDRESS).await);
    }

    #[tokio::test]
    async fn test_invoke_unknown_function_skips_network() {
        let rpc = Arc::new(MockRpc::new());
        let chain =
            ChainClient::with_rpc(rpc.clone(), RetryPolicy::default(), Duration::from_secs(5));
        let handle = chain.instantiate(ADDRESS, &view_abi(&["totalSupply"])).unwrap();

        let outcome = chain.invoke(&handle, "missing").await;
        assert_eq!(outcome.result, Err(CallError::NotFound("missing".into())));
        assert_eq!(rpc.request_count(), 0);
    }

    #[tokio::test]
    async fn test_invoke_decodes_single_output() {
        let chain = client(MockRpc::new().with_call("totalSupply()", Ok(uint_word(42))));
        let handle = chain.instantiate(ADDRESS, &view_abi(&["totalSupply"])).unwrap();

        let outcome = chain.invoke(&handle, "totalSupply").await;
        let ret = outcome.result.unwrap();
        assert_eq!(ret.output_type, "uint256");
        assert_eq!(ret.value, DynSolValue::Uint(U256::from(42), 256));
    }

    #[tokio::test]
    async fn test_revert_is_not_retried() {
        let rpc = Arc::new(MockRpc::new().with_call(
            "totalSupply()",
            Err(ChainError::Revert("execution reverted".into())),
        ));
        let chain = ChainClient::with_rpc(
            rpc.clone(),
            RetryPolicy::new(3, Duration::from_millis(1), 2.0),
            Duration::from_secs(5),
        );
        let handle = chain.instantiate(ADDRESS, &view_abi(&["totalSupply"])).unwrap();

        let outcome = chain.invoke(&handle, "totalSupply").await;
        let error = outcome.result.unwrap_err();
        assert!(error.to_string().starts_with("contract logic error"));
        assert_eq!(rpc.request_count(), 1);
    }

    #[tokio::test]
    async fn test_rpc_error_uses_full_budget() {
        let rpc = Arc::new(MockRpc::new().with_call(
            "totalSupply()",
            Err(ChainError::Rpc("RPC error: header not found".into())),
        ));
        let chain = ChainClient::with_rpc(
            rpc.clone(),
            RetryPolicy::new(2, Duration::from_millis(1), 2.0),
            Duration::from_secs(5),
        );
        let handle = chain.instantiate(ADDRESS, &view_abi(&["totalSupply"])).unwrap();

        let outcome = chain.invoke(&handle, "totalSupply").await;
        assert!(matches!(outcome.result, Err(CallError::Chain(ChainError::Rpc(_)))));
        assert_eq!(rpc.request_count(), 3);
    }

    #[tokio::test]
    async fn test_undecodable_output_is_a_failure() {
        let chain = client(
            MockRpc::new().with_call("totalSupply()", Ok(Bytes::from_static(&[0x01, 0x02]))),
        );
        let handle = chain.instantiate(ADDRESS, &view_abi(&["totalSupply"])).unwrap();

        let outcome = chain.invoke(&handle, "totalSupply").await;
        assert!(matches!(outcome.result, Err(CallError::Decode(_))));
    }

    #[test]
    fn test_instantiate_rejects_bad_address() {
        let chain = client(MockRpc::new());
        assert!(chain.instantiate("0x123", &view_abi(&["a"])).is_none());
    }

    #[tokio::test]
    async fn test_batch_isolates_each_failure_position() {
        let names: Vec<String> = (0..5).map(|i| format!("f{}", i)).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

        for failing in 0..names.len() {
            let mut rpc = MockRpc::new();
            for (i, name) in names.iter().enumerate() {
                let response = if i == failing {
                    Err(ChainError::Revert("execution reverted".into()))
                } else {
                    Ok(uint_word(i as u64))
                };
                rpc = rpc.with_call(&format!("{}()", name), response);
            }

            let chain = client(rpc);
            let handle = chain.instantiate(ADDRESS, &view_abi(&name_refs)).unwrap();
            let outcomes = chain.invoke_all(&handle, &names).await;

            assert_eq!(outcomes.len(), names.len());
            for (i, outcome) in outcomes.iter().enumerate() {
                assert_eq!(outcome.function_name, names[i]);
                assert_eq!(outcome.is_success(), i != failing);
            }
        }
    }

    #[derive(Debug)]
    struct PanickingRpc {
        poisoned: [u8; 4],
    }

    #[async_trait]
    impl ChainRpc for PanickingRpc {
        async fn block_number(&self) -> Result<u64, ChainError> {
            Ok(1)
        }

        async fn code_at(&self, _address: Address) -> Result<Bytes, ChainError> {
            Ok(Bytes::new())
        }

        async fn call(&self, _to: Address, input: Bytes) -> Result<Bytes, ChainError> {
            if input[..4] == self.poisoned {
                panic!("node client bug");
            }
            Ok(uint_word(7))
        }
    }

    #[tokio::test]
    async fn test_batch_survives_panicking_invocation() {
        let chain = client(PanickingRpc {
            poisoned: selector("b()"),
        });
        let handle = chain.instantiate(ADDRESS, &view_abi(&["a", "b", "c"])).unwrap();
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let outcomes = chain.invoke_all(&handle, &names).await;
        assert!(outcomes[0].is_success());
        assert_eq!(
            outcomes[1].result,
            Err(CallError::Panicked("node client bug".into()))
        );
        assert!(outcomes[2].is_success());
    }
}
