//! JSON-RPC chain provider with multi-RPC support and automatic failover

use super::{FeeNonceOracle, Inclusion, InclusionStatus, TargetCall};
use crate::config::NetworkConfig;
use crate::contracts::deployed_addresses;
use crate::error::{AccountError, AccountResult};
use crate::tx::meta::{DEFAULT_GAS_PER_PUBDATA_LIMIT, EIP712_TX_TYPE};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Network configuration
    config: NetworkConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: NetworkConfig) -> AccountResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(config.poll_interval_ms));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for {}: {}", config.name, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(AccountError::Config(format!(
                "No valid RPC providers for network {}",
                config.name
            )));
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Network {} failover to provider {}", self.config.name, next);
    }

    /// Run a read-only query, failing over across providers on transport errors
    async fn query<T, F, Fut>(&self, operation: &str, f: F) -> AccountResult<T>
    where
        F: Fn(Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;

        for _ in 0..self.http_providers.len() {
            match f(self.http().clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    // A JSON-RPC error response is an answer, not an outage
                    if let Some(message) = rpc_error_message(&e) {
                        return Err(AccountError::oracle(operation, message));
                    }
                    warn!(
                        "{} failed on network {}: {}",
                        operation, self.config.name, e
                    );
                    last_error = Some(e);
                    self.failover();
                }
            }
        }

        Err(AccountError::oracle(
            operation,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "all providers failed".to_string()),
        ))
    }

    /// Check the node's chain id against the configured one
    pub async fn verify_chain_id(&self) -> AccountResult<u64> {
        let chain_id = FeeNonceOracle::chain_id(self).await?;
        if let Some(expected) = self.config.chain_id {
            if expected != chain_id {
                return Err(AccountError::Config(format!(
                    "Network {} reports chain id {}, expected {}",
                    self.config.name, chain_id, expected
                )));
            }
        }
        info!("Connected to {} (chain id {})", self.config.name, chain_id);
        Ok(chain_id)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn request(from: Option<Address>, call: &TargetCall) -> TypedTransaction {
        let mut tx = TransactionRequest::new()
            .to(call.to)
            .data(call.data.clone())
            .value(call.value);
        if let Some(from) = from {
            tx = tx.from(from);
        }
        tx.into()
    }

    fn eip712_estimate_request(from: Address, call: &TargetCall) -> serde_json::Value {
        let factory_deps: Vec<Vec<u8>> = call.factory_deps.iter().map(|d| d.to_vec()).collect();
        json!({
            "from": from,
            "to": call.to,
            "data": call.data,
            "value": call.value,
            "type": format!("0x{:x}", EIP712_TX_TYPE),
            "eip712Meta": {
                "gasPerPubdata": U256::from(DEFAULT_GAS_PER_PUBDATA_LIMIT),
                "factoryDeps": factory_deps,
            },
        })
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }
}

#[async_trait]
impl FeeNonceOracle for ChainProvider {
    async fn gas_price(&self) -> AccountResult<U256> {
        self.query("gas price", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn estimate_gas(&self, from: Address, call: &TargetCall) -> AccountResult<U256> {
        if call.factory_deps.is_empty() {
            let tx = Self::request(Some(from), call);
            return self
                .query("gas estimation", |p| {
                    let tx = tx.clone();
                    async move { p.estimate_gas(&tx, None).await }
                })
                .await;
        }

        // Deployments are estimated with their bytecode in the zkSync meta envelope
        let request = Self::eip712_estimate_request(from, call);
        self.query("gas estimation", |p| {
            let request = request.clone();
            async move { p.request::<_, U256>("eth_estimateGas", [request]).await }
        })
        .await
    }

    async fn chain_id(&self) -> AccountResult<u64> {
        let id = self
            .query("chain id", |p| async move { p.get_chainid().await })
            .await?;
        if id > U256::from(u64::MAX) {
            return Err(AccountError::oracle(
                "chain id",
                format!("chain id {} out of range", id),
            ));
        }
        Ok(id.as_u64())
    }

    async fn transaction_count(&self, account: Address) -> AccountResult<U256> {
        self.query("transaction count", |p| async move {
            p.get_transaction_count(account, None).await
        })
        .await
    }

    async fn call(&self, call: &TargetCall) -> AccountResult<Bytes> {
        let tx = Self::request(None, call);
        self.query("call", |p| {
            let tx = tx.clone();
            async move { p.call(&tx, None).await }
        })
        .await
    }

    async fn broadcast_raw(&self, raw: Bytes) -> AccountResult<H256> {
        // Single attempt: resubmitting is the caller's decision
        match self.http().send_raw_transaction(raw).await {
            Ok(pending) => Ok(pending.tx_hash()),
            Err(e) => match rpc_error_message(&e) {
                Some(message) => Err(AccountError::RejectedByNetwork(message)),
                None => Err(AccountError::oracle("broadcast", e)),
            },
        }
    }

    async fn await_inclusion(&self, tx_hash: H256) -> AccountResult<Inclusion> {
        let mut interval = tokio::time::interval(self.poll_interval());

        loop {
            interval.tick().await;

            let receipt = self
                .query("transaction receipt", |p| async move {
                    p.get_transaction_receipt(tx_hash).await
                })
                .await?;

            let Some(receipt) = receipt else {
                debug!("Transaction {:?} not yet included", tx_hash);
                continue;
            };

            let status = if receipt.status == Some(1.into()) {
                InclusionStatus::Mined
            } else {
                InclusionStatus::Reverted
            };

            let mut deployed_contracts = deployed_addresses(&receipt.logs);
            if let Some(address) = receipt.contract_address {
                if !deployed_contracts.contains(&address) {
                    deployed_contracts.push(address);
                }
            }

            return Ok(Inclusion {
                status,
                block_number: receipt.block_number.map(|b| b.as_u64()),
                deployed_contracts,
            });
        }
    }
}

/// Message of the JSON-RPC error response carried by `e`, if any
fn rpc_error_message(e: &ProviderError) -> Option<String> {
    RpcError::as_error_response(e).map(|resp| resp.message.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{HttpClientError, JsonRpcError};

    fn network(urls: Vec<&str>) -> NetworkConfig {
        NetworkConfig {
            name: "test".to_string(),
            rpc_urls: urls.into_iter().map(String::from).collect(),
            chain_id: Some(300),
            poll_interval_ms: 10,
        }
    }

    #[test]
    fn test_rejects_no_valid_urls() {
        assert!(matches!(
            ChainProvider::new(network(vec!["", "not a url"])),
            Err(AccountError::Config(_))
        ));
    }

    #[test]
    fn test_failover_rotates() {
        let provider =
            ChainProvider::new(network(vec!["http://127.0.0.1:1", "http://127.0.0.1:2"])).unwrap();
        assert_eq!(provider.http().as_ref().url().port(), Some(1));
        provider.failover();
        assert_eq!(provider.http().as_ref().url().port(), Some(2));
        provider.failover();
        assert_eq!(provider.http().as_ref().url().port(), Some(1));
    }

    #[test]
    fn test_deployment_estimate_carries_factory_deps() {
        let call = TargetCall::new(Address::repeat_byte(0x80), vec![0x9c, 0x4d])
            .with_factory_deps(vec![Bytes::from(vec![1u8, 2, 3])]);
        let request = ChainProvider::eip712_estimate_request(Address::repeat_byte(0x11), &call);

        assert_eq!(request["type"], "0x71");
        assert_eq!(request["eip712Meta"]["factoryDeps"], json!([[1, 2, 3]]));
        assert_eq!(request["eip712Meta"]["gasPerPubdata"], "0xc350");
    }

    #[tokio::test]
    async fn test_unreachable_node_is_oracle_unavailable() {
        let provider = ChainProvider::new(network(vec!["http://127.0.0.1:1"])).unwrap();
        assert!(matches!(
            provider.gas_price().await,
            Err(AccountError::OracleUnavailable { .. })
        ));
    }

    #[test]
    fn test_rpc_error_response_is_extracted() {
        let rejected: ProviderError = HttpClientError::JsonRpcError(JsonRpcError {
            code: -32000,
            message: "nonce too low".to_string(),
            data: None,
        })
        .into();
        assert_eq!(rpc_error_message(&rejected), Some("nonce too low".to_string()));

        let transport = ProviderError::CustomError("connection reset".to_string());
        assert_eq!(rpc_error_message(&transport), None);
    }
}
