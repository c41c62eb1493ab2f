//! Strongly typed EIP-712 meta-transaction record
//!
//! A [`MetaTransaction`] can only be obtained through
//! [`MetaTransactionBuilder::build`] or by decoding a raw transaction, so every
//! value that reaches the digest signer has all required fields populated.

use crate::error::{AccountError, AccountResult};

use ethers::types::{Address, Bytes, U256};

/// Wire-format tag of an account-abstraction transaction (113)
pub const EIP712_TX_TYPE: u8 = 0x71;

/// Network default for the gas-per-pubdata limit
pub const DEFAULT_GAS_PER_PUBDATA_LIMIT: u64 = 50_000;

/// Paymaster sponsoring the transaction fees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymasterParams {
    pub paymaster: Address,
    pub paymaster_input: Bytes,
}

/// Custom-data envelope carried by type-113 transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Meta {
    pub(super) gas_per_pubdata: U256,
    pub(super) factory_deps: Vec<Bytes>,
    pub(super) paymaster_params: Option<PaymasterParams>,
    pub(super) custom_signature: Option<Bytes>,
}

impl Eip712Meta {
    pub fn gas_per_pubdata(&self) -> U256 {
        self.gas_per_pubdata
    }

    pub fn factory_deps(&self) -> &[Bytes] {
        &self.factory_deps
    }

    pub fn paymaster_params(&self) -> Option<&PaymasterParams> {
        self.paymaster_params.as_ref()
    }

    /// Signature blob validated by the sending account contract
    pub fn custom_signature(&self) -> Option<&Bytes> {
        self.custom_signature.as_ref()
    }
}

/// A call executed through a smart-contract account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTransaction {
    pub(super) from: Address,
    pub(super) to: Address,
    pub(super) data: Bytes,
    pub(super) value: U256,
    pub(super) gas_limit: U256,
    pub(super) max_fee_per_gas: U256,
    pub(super) max_priority_fee_per_gas: U256,
    pub(super) chain_id: u64,
    pub(super) nonce: U256,
    pub(super) meta: Eip712Meta,
}

impl MetaTransaction {
    /// Start a builder for a new transaction
    pub fn builder() -> MetaTransactionBuilder {
        MetaTransactionBuilder::new()
    }

    /// Builder pre-filled with every field of this transaction except the signature
    pub fn to_builder(&self) -> MetaTransactionBuilder {
        MetaTransactionBuilder {
            from: Some(self.from),
            to: Some(self.to),
            data: self.data.clone(),
            value: self.value,
            gas_limit: Some(self.gas_limit),
            max_fee_per_gas: Some(self.max_fee_per_gas),
            max_priority_fee_per_gas: Some(self.max_priority_fee_per_gas),
            chain_id: Some(self.chain_id),
            nonce: Some(self.nonce),
            gas_per_pubdata: self.meta.gas_per_pubdata,
            factory_deps: self.meta.factory_deps.clone(),
            paymaster_params: self.meta.paymaster_params.clone(),
        }
    }

    pub fn tx_type(&self) -> u8 {
        EIP712_TX_TYPE
    }

    /// The smart-contract account the transaction is executed from
    pub fn from(&self) -> Address {
        self.from
    }

    pub fn to(&self) -> Address {
        self.to
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn gas_limit(&self) -> U256 {
        self.gas_limit
    }

    /// Gas price as fetched from the oracle
    pub fn gas_price(&self) -> U256 {
        self.max_fee_per_gas
    }

    pub fn max_fee_per_gas(&self) -> U256 {
        self.max_fee_per_gas
    }

    pub fn max_priority_fee_per_gas(&self) -> U256 {
        self.max_priority_fee_per_gas
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn nonce(&self) -> U256 {
        self.nonce
    }

    pub fn custom_data(&self) -> &Eip712Meta {
        &self.meta
    }

    pub fn is_signed(&self) -> bool {
        self.meta.custom_signature.is_some()
    }

    /// Check the field constraints the network and the digest rely on
    pub fn validate(&self) -> AccountResult<()> {
        if self.chain_id == 0 {
            return Err(AccountError::MalformedTransaction(
                "chain id must be positive".to_string(),
            ));
        }
        if self.gas_limit.is_zero() {
            return Err(AccountError::MalformedTransaction(
                "gas limit must be positive".to_string(),
            ));
        }
        if self.max_fee_per_gas.is_zero() {
            return Err(AccountError::MalformedTransaction(
                "gas price must be positive".to_string(),
            ));
        }
        if self.max_priority_fee_per_gas > self.max_fee_per_gas {
            return Err(AccountError::MalformedTransaction(format!(
                "priority fee {} exceeds max fee {}",
                self.max_priority_fee_per_gas, self.max_fee_per_gas
            )));
        }
        if self.meta.gas_per_pubdata.is_zero() {
            return Err(AccountError::MalformedTransaction(
                "gas per pubdata must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub(super) fn with_signature(mut self, signature: Bytes) -> Self {
        self.meta.custom_signature = Some(signature);
        self
    }
}

/// Single constructor for [`MetaTransaction`]
#[derive(Debug, Clone)]
pub struct MetaTransactionBuilder {
    from: Option<Address>,
    to: Option<Address>,
    data: Bytes,
    value: U256,
    gas_limit: Option<U256>,
    max_fee_per_gas: Option<U256>,
    max_priority_fee_per_gas: Option<U256>,
    chain_id: Option<u64>,
    nonce: Option<U256>,
    gas_per_pubdata: U256,
    factory_deps: Vec<Bytes>,
    paymaster_params: Option<PaymasterParams>,
}

impl MetaTransactionBuilder {
    pub fn new() -> Self {
        Self {
            from: None,
            to: None,
            data: Bytes::default(),
            value: U256::zero(),
            gas_limit: None,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            chain_id: None,
            nonce: None,
            gas_per_pubdata: U256::from(DEFAULT_GAS_PER_PUBDATA_LIMIT),
            factory_deps: Vec::new(),
            paymaster_params: None,
        }
    }

    pub fn from(mut self, account: Address) -> Self {
        self.from = Some(account);
        self
    }

    pub fn to(mut self, target: Address) -> Self {
        self.to = Some(target);
        self
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub fn value(mut self, value: impl Into<U256>) -> Self {
        self.value = value.into();
        self
    }

    pub fn gas_limit(mut self, gas_limit: impl Into<U256>) -> Self {
        self.gas_limit = Some(gas_limit.into());
        self
    }

    /// Sets both fee caps to the same value
    pub fn gas_price(mut self, gas_price: impl Into<U256>) -> Self {
        let price = gas_price.into();
        self.max_fee_per_gas = Some(price);
        self.max_priority_fee_per_gas = Some(price);
        self
    }

    pub fn max_fee_per_gas(mut self, fee: impl Into<U256>) -> Self {
        self.max_fee_per_gas = Some(fee.into());
        self
    }

    pub fn max_priority_fee_per_gas(mut self, fee: impl Into<U256>) -> Self {
        self.max_priority_fee_per_gas = Some(fee.into());
        self
    }

    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn nonce(mut self, nonce: impl Into<U256>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn gas_per_pubdata(mut self, limit: impl Into<U256>) -> Self {
        self.gas_per_pubdata = limit.into();
        self
    }

    pub fn factory_deps(mut self, deps: Vec<Bytes>) -> Self {
        self.factory_deps = deps;
        self
    }

    pub fn paymaster(mut self, params: PaymasterParams) -> Self {
        self.paymaster_params = Some(params);
        self
    }

    /// Produce an unsigned transaction, failing if any required field is absent
    pub fn build(self) -> AccountResult<MetaTransaction> {
        let max_fee_per_gas = required(self.max_fee_per_gas, "gas price")?;
        let tx = MetaTransaction {
            from: required(self.from, "from")?,
            to: required(self.to, "to")?,
            data: self.data,
            value: self.value,
            gas_limit: required(self.gas_limit, "gas limit")?,
            max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas.unwrap_or(max_fee_per_gas),
            chain_id: required(self.chain_id, "chain id")?,
            nonce: required(self.nonce, "nonce")?,
            meta: Eip712Meta {
                gas_per_pubdata: self.gas_per_pubdata,
                factory_deps: self.factory_deps,
                paymaster_params: self.paymaster_params,
                custom_signature: None,
            },
        };
        tx.validate()?;
        Ok(tx)
    }
}

impl Default for MetaTransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn required<T>(value: Option<T>, field: &str) -> AccountResult<T> {
    value.ok_or_else(|| AccountError::MalformedTransaction(format!("missing {}", field)))
}
