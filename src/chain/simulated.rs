//! In-memory network used by the pipeline tests
//!
//! Mirrors the checks a zkSync node and bootloader apply to type-113
//! transactions: submission-time checks on nonce, chain id and fees, then
//! account validation at inclusion, where the account accepts only
//! signatures recovering to its owner.

use super::{FeeNonceOracle, Inclusion, InclusionStatus, TargetCall};
use crate::contracts::CONTRACT_DEPLOYER_ADDRESS;
use crate::error::{AccountError, AccountResult};
use crate::tx::codec::{deserialize, transaction_hash};
use crate::tx::digest::{keccak256, signing_digest};

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::types::{Address, Bytes, RecoveryMessage, Signature, H256, U256};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Clone)]
struct AccountState {
    nonce: U256,
    owner: Address,
}

pub struct SimulatedNetwork {
    chain_id: u64,
    gas_price: U256,
    gas_estimate: U256,
    accounts: DashMap<Address, AccountState>,
    receipts: DashMap<H256, Inclusion>,
    call_responses: DashMap<(Address, [u8; 4]), Bytes>,
    block: AtomicU64,
    offline: AtomicBool,
}

impl SimulatedNetwork {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            gas_price: U256::from(1_000_000_000u64),
            gas_estimate: U256::from(21_000u64),
            accounts: DashMap::new(),
            receipts: DashMap::new(),
            call_responses: DashMap::new(),
            block: AtomicU64::new(1),
            offline: AtomicBool::new(false),
        }
    }

    /// Register a smart-contract account validated against `owner`
    pub fn register_account(&self, account: Address, owner: Address, nonce: u64) {
        self.accounts.insert(
            account,
            AccountState {
                nonce: U256::from(nonce),
                owner,
            },
        );
    }

    pub fn set_call_response(&self, to: Address, selector: [u8; 4], output: Bytes) {
        self.call_responses.insert((to, selector), output);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn nonce_of(&self, account: Address) -> Option<U256> {
        self.accounts.get(&account).map(|a| a.nonce)
    }

    fn ensure_online(&self, operation: &str) -> AccountResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AccountError::oracle(operation, "connection refused"));
        }
        Ok(())
    }

    fn deployed_address(deployer: Address, nonce: U256) -> Address {
        let mut preimage = Vec::with_capacity(96);
        preimage.extend_from_slice(&keccak256(b"zksyncCreate"));
        preimage.extend_from_slice(H256::from(deployer).as_bytes());
        let mut word = [0u8; 32];
        nonce.to_big_endian(&mut word);
        preimage.extend_from_slice(&word);
        Address::from(H256::from(keccak256(&preimage)))
    }
}

#[async_trait]
impl FeeNonceOracle for SimulatedNetwork {
    async fn gas_price(&self) -> AccountResult<U256> {
        self.ensure_online("gas price")?;
        Ok(self.gas_price)
    }

    async fn estimate_gas(&self, _from: Address, _call: &TargetCall) -> AccountResult<U256> {
        self.ensure_online("gas estimation")?;
        Ok(self.gas_estimate)
    }

    async fn chain_id(&self) -> AccountResult<u64> {
        self.ensure_online("chain id")?;
        Ok(self.chain_id)
    }

    async fn transaction_count(&self, account: Address) -> AccountResult<U256> {
        self.ensure_online("transaction count")?;
        Ok(self.nonce_of(account).unwrap_or_default())
    }

    async fn call(&self, call: &TargetCall) -> AccountResult<Bytes> {
        self.ensure_online("call")?;
        let mut selector = [0u8; 4];
        if call.data.len() >= 4 {
            selector.copy_from_slice(&call.data[..4]);
        }
        let output = self.call_responses.get(&(call.to, selector)).map(|r| r.clone());
        output.ok_or_else(|| AccountError::oracle("call", "execution reverted"))
    }

    async fn broadcast_raw(&self, raw: Bytes) -> AccountResult<H256> {
        self.ensure_online("broadcast")?;

        let tx = deserialize(&raw)
            .map_err(|e| AccountError::RejectedByNetwork(format!("failed to parse: {}", e)))?;
        if tx.chain_id() != self.chain_id {
            return Err(AccountError::RejectedByNetwork("invalid chain id".to_string()));
        }
        if tx.max_fee_per_gas() < self.gas_price {
            return Err(AccountError::RejectedByNetwork(
                "max fee per gas less than block base fee".to_string(),
            ));
        }
        let signature = tx
            .custom_data()
            .custom_signature()
            .cloned()
            .ok_or_else(|| AccountError::RejectedByNetwork("missing signature".to_string()))?;

        let mut account = self
            .accounts
            .get_mut(&tx.from())
            .ok_or_else(|| AccountError::RejectedByNetwork("sender is not an account".to_string()))?;
        if tx.nonce() < account.nonce {
            return Err(AccountError::RejectedByNetwork(format!(
                "nonce too low: expected {}, got {}",
                account.nonce,
                tx.nonce()
            )));
        }
        if tx.nonce() > account.nonce {
            return Err(AccountError::RejectedByNetwork(format!(
                "nonce too high: expected {}, got {}",
                account.nonce,
                tx.nonce()
            )));
        }

        let digest = signing_digest(&tx)
            .map_err(|e| AccountError::RejectedByNetwork(e.to_string()))?;
        let tx_hash = transaction_hash(&digest, Some(&signature));

        let authorized = Signature::try_from(signature.as_ref())
            .ok()
            .and_then(|sig| sig.recover(RecoveryMessage::Hash(digest.as_h256())).ok())
            .map(|signer| signer == account.owner)
            .unwrap_or(false);

        let block_number = self.block.fetch_add(1, Ordering::SeqCst);
        let inclusion = if authorized {
            let mut deployed_contracts = Vec::new();
            if tx.to() == CONTRACT_DEPLOYER_ADDRESS {
                deployed_contracts.push(Self::deployed_address(tx.from(), account.nonce));
            }
            account.nonce += U256::one();
            Inclusion {
                status: InclusionStatus::Mined,
                block_number: Some(block_number),
                deployed_contracts,
            }
        } else {
            Inclusion {
                status: InclusionStatus::Reverted,
                block_number: Some(block_number),
                deployed_contracts: Vec::new(),
            }
        };

        self.receipts.insert(tx_hash, inclusion);
        Ok(tx_hash)
    }

    async fn await_inclusion(&self, tx_hash: H256) -> AccountResult<Inclusion> {
        self.ensure_online("transaction receipt")?;
        let inclusion = self.receipts.get(&tx_hash).map(|r| r.clone());
        match inclusion {
            Some(inclusion) => Ok(inclusion),
            None => std::future::pending().await,
        }
    }
}
