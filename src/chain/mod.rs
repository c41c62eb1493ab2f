//! Chain module - the fee & nonce oracle the pipeline consumes
//!
//! This module provides:
//! - The [`FeeNonceOracle`] seam between the pipeline and the network
//! - A JSON-RPC implementation with multi-URL failover
//! - An in-memory network for tests

pub mod provider;
#[cfg(test)]
pub mod simulated;

pub use provider::ChainProvider;

use crate::error::AccountResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};

/// A call the account should execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCall {
    pub to: Address,
    pub data: Bytes,
    /// Native-asset amount, zero unless set
    pub value: U256,
    /// Bytecode the call needs published alongside it (deployments)
    pub factory_deps: Vec<Bytes>,
}

impl TargetCall {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            value: U256::zero(),
            factory_deps: Vec::new(),
        }
    }

    /// Plain native-asset transfer
    pub fn transfer(to: Address, value: U256) -> Self {
        Self {
            to,
            data: Bytes::default(),
            value,
            factory_deps: Vec::new(),
        }
    }

    pub fn with_factory_deps(mut self, deps: Vec<Bytes>) -> Self {
        self.factory_deps = deps;
        self
    }
}

/// Receipt status of an included transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InclusionStatus {
    Mined,
    Reverted,
}

/// What the network reports once a transaction is included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inclusion {
    pub status: InclusionStatus,
    pub block_number: Option<u64>,
    /// Contracts registered by the deployer system contract in this transaction
    pub deployed_contracts: Vec<Address>,
}

/// Network provider answering fee, nonce and submission queries
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeeNonceOracle: Send + Sync {
    /// Current gas price
    async fn gas_price(&self) -> AccountResult<U256>;

    /// Gas limit estimate for `call` executed as `from`
    async fn estimate_gas(&self, from: Address, call: &TargetCall) -> AccountResult<U256>;

    async fn chain_id(&self) -> AccountResult<u64>;

    /// Latest confirmed nonce of `account`
    async fn transaction_count(&self, account: Address) -> AccountResult<U256>;

    /// Read-only `eth_call`
    async fn call(&self, call: &TargetCall) -> AccountResult<Bytes>;

    /// Submit raw transaction bytes, returning the hash without waiting
    async fn broadcast_raw(&self, raw: Bytes) -> AccountResult<H256>;

    /// Wait until `tx_hash` is included; never times out by itself
    async fn await_inclusion(&self, tx_hash: H256) -> AccountResult<Inclusion>;
}
