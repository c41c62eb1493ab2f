//! Error types for the account-abstraction sender

use ethers::types::H256;
use thiserror::Error;

/// Main error type for the transaction pipeline and its collaborators
#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Oracle unavailable during {operation}: {message}")]
    OracleUnavailable { operation: String, message: String },

    #[error("Signing key unavailable: {0}")]
    SigningKeyUnavailable(String),

    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("Transaction has no signature attached")]
    UnsignedTransaction,

    #[error("Transaction rejected by network: {0}")]
    RejectedByNetwork(String),

    #[error("Transaction {tx_hash:?} reverted by account validation")]
    RejectedByAccount { tx_hash: H256 },

    #[error("Failed to decode raw transaction: {0}")]
    Decode(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Deployment error: {0}")]
    Deployment(String),

    #[error("Verification error: {0}")]
    Verification(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },
}

impl AccountError {
    pub(crate) fn oracle(operation: &str, err: impl std::fmt::Display) -> Self {
        AccountError::OracleUnavailable {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }

    /// Check whether rebuilding the transaction with a fresh nonce can help
    pub fn is_resubmittable(&self) -> bool {
        matches!(
            self,
            AccountError::RejectedByNetwork(_)
                | AccountError::OracleUnavailable { .. }
                | AccountError::Timeout { .. }
        )
    }

    /// Check if the failure points at the account contract's validation logic
    pub fn is_account_failure(&self) -> bool {
        matches!(self, AccountError::RejectedByAccount { .. })
    }
}

impl From<ethers::utils::rlp::DecoderError> for AccountError {
    fn from(err: ethers::utils::rlp::DecoderError) -> Self {
        AccountError::Decode(err.to_string())
    }
}

impl From<ethers::abi::Error> for AccountError {
    fn from(err: ethers::abi::Error) -> Self {
        AccountError::Abi(err.to_string())
    }
}

/// Result type for pipeline operations
pub type AccountResult<T> = Result<T, AccountError>;
