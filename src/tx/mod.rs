//! Type-113 transaction pipeline: build, digest, sign, finalize, broadcast

pub mod builder;
pub mod codec;
pub mod digest;
pub mod meta;
pub mod sender;
pub mod signer;

pub use builder::TransactionBuilder;
pub use codec::{attach_signature, deserialize, serialize, RawTransaction};
pub use digest::{hash_bytecode, signing_digest, SigningDigest};
pub use meta::{MetaTransaction, MetaTransactionBuilder, PaymasterParams};
pub use sender::{
    AccountPipeline, Broadcaster, Confirmation, ConfirmationStatus, Execution, PendingTransaction,
};
pub use signer::{AccountSigner, DigestedTransaction, KeySigner, SignedTransaction};
