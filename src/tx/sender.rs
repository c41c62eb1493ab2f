//! Broadcasting and the end-to-end account transaction pipeline

use super::builder::TransactionBuilder;
use super::codec::RawTransaction;
use super::signer::{AccountSigner, DigestedTransaction};
use crate::chain::{FeeNonceOracle, InclusionStatus, TargetCall};
use crate::error::{AccountError, AccountResult};

use ethers::types::{Address, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Terminal inclusion outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Confirmed,
    /// Included but reverted, typically by the account's validation
    Reverted,
    /// Not included within the caller's timeout
    NotFound,
}

/// Outcome of broadcasting one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: H256,
    pub status: ConfirmationStatus,
    pub block_number: Option<u64>,
    pub deployed_contracts: Vec<Address>,
}

impl Confirmation {
    /// Map a non-confirmed status onto the error taxonomy
    pub fn into_result(self) -> AccountResult<Self> {
        match self.status {
            ConfirmationStatus::Confirmed => Ok(self),
            ConfirmationStatus::Reverted => Err(AccountError::RejectedByAccount {
                tx_hash: self.tx_hash,
            }),
            ConfirmationStatus::NotFound => Err(AccountError::Timeout {
                operation: format!("inclusion of {:?}", self.tx_hash),
            }),
        }
    }
}

/// A submitted transaction whose inclusion has not been observed yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTransaction {
    tx_hash: H256,
}

impl PendingTransaction {
    pub fn tx_hash(&self) -> H256 {
        self.tx_hash
    }
}

/// Submits finalized transactions and waits for inclusion
#[derive(Clone)]
pub struct Broadcaster {
    oracle: Arc<dyn FeeNonceOracle>,
}

impl Broadcaster {
    pub fn new(oracle: Arc<dyn FeeNonceOracle>) -> Self {
        Self { oracle }
    }

    /// Submit raw bytes; returns as soon as the network hands back a hash
    pub async fn submit(&self, raw: RawTransaction) -> AccountResult<PendingTransaction> {
        let expected = raw.tx_hash();
        let tx_hash = self.oracle.broadcast_raw(raw.into_bytes()).await?;

        if tx_hash != expected {
            warn!(
                "Network returned hash {:?}, locally computed {:?}",
                tx_hash, expected
            );
        }

        debug!("Submitted transaction {:?}", tx_hash);
        Ok(PendingTransaction { tx_hash })
    }

    /// Wait for inclusion, bounded only when `limit` is given
    pub async fn confirm(
        &self,
        pending: PendingTransaction,
        limit: Option<Duration>,
    ) -> AccountResult<Confirmation> {
        let tx_hash = pending.tx_hash;
        let wait = self.oracle.await_inclusion(tx_hash);

        let inclusion = match limit {
            Some(limit) => match timeout(limit, wait).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!("Transaction {:?} not included within {:?}", tx_hash, limit);
                    return Ok(Confirmation {
                        tx_hash,
                        status: ConfirmationStatus::NotFound,
                        block_number: None,
                        deployed_contracts: Vec::new(),
                    });
                }
            },
            None => wait.await?,
        };

        let status = match inclusion.status {
            InclusionStatus::Mined => ConfirmationStatus::Confirmed,
            InclusionStatus::Reverted => ConfirmationStatus::Reverted,
        };

        Ok(Confirmation {
            tx_hash,
            status,
            block_number: inclusion.block_number,
            deployed_contracts: inclusion.deployed_contracts,
        })
    }
}

/// Result of running a call through [`AccountPipeline::execute`]
#[derive(Debug, Clone)]
pub struct Execution {
    pub confirmation: Confirmation,
    pub nonce_before: U256,
    pub nonce_after: U256,
}

/// Build → digest → sign → finalize → broadcast → confirm, for one account
pub struct AccountPipeline {
    oracle: Arc<dyn FeeNonceOracle>,
    signer: Arc<dyn AccountSigner>,
    builder: TransactionBuilder,
    broadcaster: Broadcaster,
    inclusion_timeout: Option<Duration>,
}

impl AccountPipeline {
    pub fn new(
        oracle: Arc<dyn FeeNonceOracle>,
        signer: Arc<dyn AccountSigner>,
        builder: TransactionBuilder,
    ) -> Self {
        Self {
            broadcaster: Broadcaster::new(oracle.clone()),
            oracle,
            signer,
            builder,
            inclusion_timeout: None,
        }
    }

    pub fn with_inclusion_timeout(mut self, limit: Option<Duration>) -> Self {
        self.inclusion_timeout = limit;
        self
    }

    pub fn account(&self) -> Address {
        self.builder.account()
    }

    /// Run `call` from the account and wait for a confirmed inclusion
    ///
    /// Nothing is retried; on failure the caller rebuilds with a fresh nonce.
    /// A nonce that has not advanced after a confirmed inclusion is only
    /// logged at warn level, not returned as an error. Callers needing that
    /// guarantee compare `nonce_before` and `nonce_after` on the result.
    pub async fn execute(&self, call: &TargetCall) -> AccountResult<Execution> {
        let tx = self.builder.build(call).await?;
        let nonce_before = tx.nonce();

        let digested = DigestedTransaction::new(tx)?;
        let signed = digested.sign(self.signer.as_ref()).await?;
        let raw = signed.finalize()?;

        let pending = self.broadcaster.submit(raw).await?;
        info!(
            "Transaction sent from account {:?} with hash {:?}",
            self.account(),
            pending.tx_hash()
        );

        let confirmation = self
            .broadcaster
            .confirm(pending, self.inclusion_timeout)
            .await?
            .into_result()?;

        let nonce_after = self.oracle.transaction_count(self.account()).await?;
        if nonce_after <= nonce_before {
            warn!(
                "Nonce of account {:?} did not advance: before {}, after {}",
                self.account(),
                nonce_before,
                nonce_after
            );
        } else {
            info!(
                "Account {:?} nonce advanced {} -> {}",
                self.account(),
                nonce_before,
                nonce_after
            );
        }

        Ok(Execution {
            confirmation,
            nonce_before,
            nonce_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::simulated::SimulatedNetwork;
    use crate::chain::{Inclusion, MockFeeNonceOracle};
    use crate::tx::codec::attach_signature;
    use crate::tx::signer::tests::TEST_KEY;
    use crate::tx::signer::KeySigner;

    const CHAIN_ID: u64 = 300;

    fn account() -> Address {
        "0x2776c9467dfd1CBd33F177Bb9d8B278F1240C0BE".parse().unwrap()
    }

    fn recipient() -> Address {
        Address::repeat_byte(0x42)
    }

    fn setup(nonce: u64) -> (Arc<SimulatedNetwork>, Arc<KeySigner>) {
        let signer = Arc::new(KeySigner::from_hex(TEST_KEY).unwrap());
        let network = Arc::new(SimulatedNetwork::new(CHAIN_ID));
        network.register_account(account(), signer.address(), nonce);
        (network, signer)
    }

    fn pipeline(network: &Arc<SimulatedNetwork>, signer: &Arc<KeySigner>) -> AccountPipeline {
        let builder = TransactionBuilder::new(network.clone(), account());
        AccountPipeline::new(network.clone(), signer.clone(), builder)
    }

    #[tokio::test]
    async fn test_transfer_confirms_and_advances_nonce() {
        let (network, signer) = setup(7);
        let pipeline = pipeline(&network, &signer);

        let execution = pipeline
            .execute(&TargetCall::transfer(recipient(), U256::from(1000u64)))
            .await
            .unwrap();

        assert_eq!(execution.confirmation.status, ConfirmationStatus::Confirmed);
        assert_eq!(execution.nonce_before, U256::from(7u64));
        assert_eq!(execution.nonce_after, U256::from(8u64));
        assert_eq!(
            network.transaction_count(account()).await.unwrap(),
            U256::from(8u64)
        );
    }

    #[tokio::test]
    async fn test_reused_nonce_rejected_by_network() {
        let (network, signer) = setup(3);
        let builder = TransactionBuilder::new(network.clone(), account());
        let broadcaster = Broadcaster::new(network.clone());

        let tx = builder
            .build(&TargetCall::transfer(recipient(), U256::from(1u64)))
            .await
            .unwrap();
        let stale = tx.to_builder().value(2u64).build().unwrap();

        let raw = DigestedTransaction::new(tx)
            .unwrap()
            .sign(signer.as_ref())
            .await
            .unwrap()
            .finalize()
            .unwrap();
        let pending = broadcaster.submit(raw).await.unwrap();
        let confirmation = broadcaster.confirm(pending, None).await.unwrap();
        assert_eq!(confirmation.status, ConfirmationStatus::Confirmed);

        let raw = DigestedTransaction::new(stale)
            .unwrap()
            .sign(signer.as_ref())
            .await
            .unwrap()
            .finalize()
            .unwrap();
        let err = broadcaster.submit(raw).await.unwrap_err();
        assert!(matches!(err, AccountError::RejectedByNetwork(_)));
        assert!(err.is_resubmittable());
    }

    #[tokio::test]
    async fn test_corrupted_signature_reverts_after_inclusion() {
        let (network, signer) = setup(0);
        let builder = TransactionBuilder::new(network.clone(), account());
        let broadcaster = Broadcaster::new(network.clone());

        let tx = builder
            .build(&TargetCall::transfer(recipient(), U256::from(5u64)))
            .await
            .unwrap();
        let signed = DigestedTransaction::new(tx.clone())
            .unwrap()
            .sign(signer.as_ref())
            .await
            .unwrap();

        let mut corrupted = signed.signature().to_vec();
        corrupted[10] ^= 0x01;
        let tx = attach_signature(tx, corrupted.into()).unwrap();
        let raw = RawTransaction::encode(&tx).unwrap();

        // Accepted at submission time
        let pending = broadcaster.submit(raw).await.unwrap();
        let confirmation = broadcaster.confirm(pending, None).await.unwrap();
        assert_eq!(confirmation.status, ConfirmationStatus::Reverted);

        let err = confirmation.into_result().unwrap_err();
        assert!(matches!(err, AccountError::RejectedByAccount { .. }));
        assert_eq!(network.nonce_of(account()), Some(U256::zero()));
    }

    #[tokio::test]
    async fn test_wrong_owner_surfaces_as_account_rejection() {
        let (network, _) = setup(0);
        let stranger = Arc::new(
            KeySigner::from_hex("0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d")
                .unwrap(),
        );
        let pipeline = pipeline(&network, &stranger);

        let err = pipeline
            .execute(&TargetCall::transfer(recipient(), U256::one()))
            .await
            .unwrap_err();
        assert!(err.is_account_failure());
    }

    #[tokio::test]
    async fn test_timeout_reports_not_found() {
        let (network, _) = setup(0);
        let broadcaster = Broadcaster::new(network.clone());

        let confirmation = broadcaster
            .confirm(
                PendingTransaction {
                    tx_hash: H256::repeat_byte(0xee),
                },
                Some(Duration::from_millis(20)),
            )
            .await
            .unwrap();

        assert_eq!(confirmation.status, ConfirmationStatus::NotFound);
        assert!(matches!(
            confirmation.into_result(),
            Err(AccountError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_offline_oracle_aborts_before_broadcast() {
        let (network, signer) = setup(0);
        network.set_offline(true);
        let pipeline = pipeline(&network, &signer);

        let err = pipeline
            .execute(&TargetCall::transfer(recipient(), U256::one()))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::OracleUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_build_failure_never_broadcasts() {
        let mut oracle = MockFeeNonceOracle::new();
        oracle
            .expect_estimate_gas()
            .returning(|_, _| Ok(U256::from(21_000u64)));
        oracle.expect_gas_price().returning(|| Ok(U256::one()));
        oracle.expect_chain_id().returning(|| Ok(0));
        oracle.expect_transaction_count().returning(|_| Ok(U256::zero()));
        oracle.expect_broadcast_raw().times(0);

        let oracle: Arc<dyn FeeNonceOracle> = Arc::new(oracle);
        let signer = Arc::new(KeySigner::from_hex(TEST_KEY).unwrap());
        let builder = TransactionBuilder::new(oracle.clone(), account());
        let pipeline = AccountPipeline::new(oracle, signer, builder);

        let err = pipeline
            .execute(&TargetCall::transfer(recipient(), U256::one()))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::MalformedTransaction(_)));
    }

    #[tokio::test]
    async fn test_stalled_nonce_still_returns_execution() {
        let mut oracle = MockFeeNonceOracle::new();
        oracle
            .expect_estimate_gas()
            .returning(|_, _| Ok(U256::from(21_000u64)));
        oracle.expect_gas_price().returning(|| Ok(U256::one()));
        oracle.expect_chain_id().returning(|| Ok(CHAIN_ID));
        oracle
            .expect_transaction_count()
            .returning(|_| Ok(U256::from(4u64)));
        oracle
            .expect_broadcast_raw()
            .times(1)
            .returning(|_| Ok(H256::repeat_byte(0xab)));
        oracle.expect_await_inclusion().returning(|_| {
            Ok(Inclusion {
                status: InclusionStatus::Mined,
                block_number: Some(9),
                deployed_contracts: Vec::new(),
            })
        });

        let oracle: Arc<dyn FeeNonceOracle> = Arc::new(oracle);
        let signer = Arc::new(KeySigner::from_hex(TEST_KEY).unwrap());
        let builder = TransactionBuilder::new(oracle.clone(), account());
        let pipeline = AccountPipeline::new(oracle, signer, builder);

        let execution = pipeline
            .execute(&TargetCall::transfer(recipient(), U256::one()))
            .await
            .unwrap();
        assert_eq!(execution.confirmation.status, ConfirmationStatus::Confirmed);
        assert_eq!(execution.nonce_before, U256::from(4u64));
        assert_eq!(execution.nonce_after, execution.nonce_before);
    }

    #[tokio::test]
    async fn test_network_rejection_surfaces_from_submit() {
        let mut oracle = MockFeeNonceOracle::new();
        oracle
            .expect_broadcast_raw()
            .times(1)
            .returning(|_| Err(AccountError::RejectedByNetwork("insufficient fee".into())));

        let broadcaster = Broadcaster::new(Arc::new(oracle));
        let tx = attach_signature(
            crate::tx::MetaTransaction::builder()
                .from(account())
                .to(recipient())
                .gas_limit(21_000u64)
                .gas_price(1u64)
                .chain_id(CHAIN_ID)
                .nonce(0u64)
                .build()
                .unwrap(),
            vec![1u8; 65].into(),
        )
        .unwrap();

        let err = broadcaster
            .submit(RawTransaction::encode(&tx).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::RejectedByNetwork(_)));
    }
}
