//! Off-chain signing of meta-transaction digests
//!
//! The key lives only inside [`KeySigner`]:
//! - never serialized
//! - redacted from `Debug` output
//! - only reachable through [`AccountSigner::sign_digest`]

use super::digest::{signing_digest, SigningDigest};
use super::meta::MetaTransaction;
use crate::error::{AccountError, AccountResult};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, Signature};
use tracing::debug;

/// Key that authorizes transactions for a smart-contract account
#[async_trait]
pub trait AccountSigner: Send + Sync {
    /// Address derived from the signing key
    fn address(&self) -> Address;

    /// Sign a prehashed digest, returning a recoverable secp256k1 signature
    async fn sign_digest(&self, digest: &SigningDigest) -> AccountResult<Signature>;
}

/// Local secp256k1 key
pub struct KeySigner {
    wallet: LocalWallet,
}

impl KeySigner {
    /// Load the key from an environment variable holding a hex private key
    pub fn from_env(var_name: &str) -> AccountResult<Self> {
        let key_hex = std::env::var(var_name).map_err(|_| {
            AccountError::SigningKeyUnavailable(format!(
                "environment variable {} not set",
                var_name
            ))
        })?;

        Self::from_hex(&key_hex)
    }

    pub fn from_hex(key_hex: &str) -> AccountResult<Self> {
        let key_hex = key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let wallet = key_hex
            .parse::<LocalWallet>()
            .map_err(|e| AccountError::SigningKeyUnavailable(format!("invalid private key: {}", e)))?;

        Ok(Self { wallet })
    }
}

#[async_trait]
impl AccountSigner for KeySigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_digest(&self, digest: &SigningDigest) -> AccountResult<Signature> {
        self.wallet
            .sign_hash(digest.as_h256())
            .map_err(|e| AccountError::SigningKeyUnavailable(format!("signing failed: {}", e)))
    }
}

impl std::fmt::Debug for KeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySigner")
            .field("address", &self.wallet.address())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// A built transaction whose digest has been computed
#[derive(Debug, Clone)]
pub struct DigestedTransaction {
    tx: MetaTransaction,
    digest: SigningDigest,
}

impl DigestedTransaction {
    pub fn new(tx: MetaTransaction) -> AccountResult<Self> {
        if tx.is_signed() {
            return Err(AccountError::MalformedTransaction(
                "transaction already carries a signature".to_string(),
            ));
        }
        let digest = signing_digest(&tx)?;
        Ok(Self { tx, digest })
    }

    pub fn digest(&self) -> SigningDigest {
        self.digest
    }

    pub fn transaction(&self) -> &MetaTransaction {
        &self.tx
    }

    /// Sign the digest, consuming this stage
    pub async fn sign(self, signer: &dyn AccountSigner) -> AccountResult<SignedTransaction> {
        let signature = signer.sign_digest(&self.digest).await?;
        debug!(
            "Signed digest {:?} for account {:?} (nonce {})",
            self.digest.as_h256(),
            self.tx.from(),
            self.tx.nonce()
        );

        Ok(SignedTransaction {
            tx: self.tx,
            digest: self.digest,
            signature: Bytes::from(signature.to_vec()),
        })
    }
}

/// Unsigned transaction paired with the serialized signature over its digest
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub(super) tx: MetaTransaction,
    pub(super) digest: SigningDigest,
    pub(super) signature: Bytes,
}

impl SignedTransaction {
    pub fn transaction(&self) -> &MetaTransaction {
        &self.tx
    }

    pub fn digest(&self) -> SigningDigest {
        self.digest
    }

    /// 65 bytes `r || s || v`, `v` in {27, 28}
    pub fn signature(&self) -> &Bytes {
        &self.signature
    }
}
