//! Transaction builder: populates a meta-transaction from oracle answers

use super::meta::{MetaTransaction, PaymasterParams, DEFAULT_GAS_PER_PUBDATA_LIMIT};
use crate::chain::{FeeNonceOracle, TargetCall};
use crate::error::AccountResult;

use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::debug;

/// Builds unsigned meta-transactions for one smart-contract account
pub struct TransactionBuilder {
    oracle: Arc<dyn FeeNonceOracle>,
    /// Account the transaction is sent from
    account: Address,
    /// Sender used for gas estimation, defaults to the account
    estimate_as: Option<Address>,
    gas_per_pubdata: U256,
    paymaster: Option<PaymasterParams>,
}

impl TransactionBuilder {
    pub fn new(oracle: Arc<dyn FeeNonceOracle>, account: Address) -> Self {
        Self {
            oracle,
            account,
            estimate_as: None,
            gas_per_pubdata: U256::from(DEFAULT_GAS_PER_PUBDATA_LIMIT),
            paymaster: None,
        }
    }

    /// Estimate gas as `sender` instead of the account
    pub fn estimate_as(mut self, sender: Address) -> Self {
        self.estimate_as = Some(sender);
        self
    }

    pub fn gas_per_pubdata(mut self, limit: U256) -> Self {
        self.gas_per_pubdata = limit;
        self
    }

    pub fn paymaster(mut self, params: PaymasterParams) -> Self {
        self.paymaster = Some(params);
        self
    }

    pub fn account(&self) -> Address {
        self.account
    }

    /// Query the oracle and assemble the unsigned transaction
    ///
    /// Order: gas estimate, gas price, chain id, nonce. The nonce is read last
    /// so it reflects the latest confirmed state at build time.
    pub async fn build(&self, call: &TargetCall) -> AccountResult<MetaTransaction> {
        let estimator = self.estimate_as.unwrap_or(self.account);

        let gas_limit = self.oracle.estimate_gas(estimator, call).await?;
        let gas_price = self.oracle.gas_price().await?;
        let chain_id = self.oracle.chain_id().await?;
        let nonce = self.oracle.transaction_count(self.account).await?;

        debug!(
            "Building tx for account {:?}: to={:?} gas_limit={} gas_price={} chain_id={} nonce={}",
            self.account, call.to, gas_limit, gas_price, chain_id, nonce
        );

        let mut builder = MetaTransaction::builder()
            .from(self.account)
            .to(call.to)
            .data(call.data.clone())
            .value(call.value)
            .gas_limit(gas_limit)
            .gas_price(gas_price)
            .chain_id(chain_id)
            .nonce(nonce)
            .gas_per_pubdata(self.gas_per_pubdata)
            .factory_deps(call.factory_deps.clone());

        if let Some(params) = &self.paymaster {
            builder = builder.paymaster(params.clone());
        }

        builder.build()
    }
}
