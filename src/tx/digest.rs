//! EIP-712 signing digest for zkSync meta-transactions
//!
//! digest = keccak256(0x1901 || domainSeparator(chainId) || hashStruct(tx))
//!
//! The domain is `("zkSync", "2", chainId)`. Addresses occupy `uint256`
//! slots, dynamic `bytes` are replaced by their keccak hash and factory deps
//! by the keccak of their concatenated zkSync bytecode hashes.

use super::meta::MetaTransaction;
use crate::error::{AccountError, AccountResult};

use ethers::abi::{encode, Token};
use ethers::types::{Address, H256, U256};
use sha2::Sha256;
use sha3::{Digest, Keccak256};
use std::fmt;

const DOMAIN_TYPE: &str = "EIP712Domain(string name,string version,uint256 chainId)";
const DOMAIN_NAME: &str = "zkSync";
const DOMAIN_VERSION: &str = "2";

const TRANSACTION_TYPE: &str = "Transaction(uint256 txType,uint256 from,uint256 to,\
uint256 gasLimit,uint256 gasPerPubdataByteLimit,uint256 maxFeePerGas,\
uint256 maxPriorityFeePerGas,uint256 paymaster,uint256 nonce,uint256 value,\
bytes data,bytes32[] factoryDeps,bytes paymasterInput)";

/// Largest bytecode the network accepts: 2^16 - 1 words
pub const MAX_BYTECODE_LEN_BYTES: usize = ((1 << 16) - 1) * 32;

/// 32-byte value signed by the account owner
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigningDigest(H256);

impl SigningDigest {
    pub fn as_h256(&self) -> H256 {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_fixed_bytes()
    }
}

impl fmt::Debug for SigningDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningDigest({:?})", self.0)
    }
}

pub(crate) fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Compute the signing digest over every field except the custom signature
pub fn signing_digest(tx: &MetaTransaction) -> AccountResult<SigningDigest> {
    tx.validate()?;

    let domain = domain_separator(tx.chain_id);
    let struct_hash = transaction_struct_hash(tx)?;

    let mut preimage = Vec::with_capacity(66);
    preimage.extend_from_slice(&[0x19, 0x01]);
    preimage.extend_from_slice(&domain);
    preimage.extend_from_slice(&struct_hash);

    Ok(SigningDigest(H256::from(keccak256(&preimage))))
}

/// Domain separator for the given chain
pub fn domain_separator(chain_id: u64) -> [u8; 32] {
    let encoded = encode(&[
        Token::FixedBytes(keccak256(DOMAIN_TYPE.as_bytes()).to_vec()),
        Token::FixedBytes(keccak256(DOMAIN_NAME.as_bytes()).to_vec()),
        Token::FixedBytes(keccak256(DOMAIN_VERSION.as_bytes()).to_vec()),
        Token::Uint(U256::from(chain_id)),
    ]);
    keccak256(&encoded)
}

fn transaction_struct_hash(tx: &MetaTransaction) -> AccountResult<[u8; 32]> {
    let meta = &tx.meta;

    let mut dep_hashes = Vec::with_capacity(meta.factory_deps.len() * 32);
    for dep in &meta.factory_deps {
        dep_hashes.extend_from_slice(&hash_bytecode(dep)?);
    }

    let (paymaster, paymaster_input) = match &meta.paymaster_params {
        Some(params) => (params.paymaster, params.paymaster_input.as_ref()),
        None => (Address::zero(), &[][..]),
    };

    let encoded = encode(&[
        Token::FixedBytes(keccak256(TRANSACTION_TYPE.as_bytes()).to_vec()),
        Token::Uint(U256::from(tx.tx_type())),
        Token::Address(tx.from),
        Token::Address(tx.to),
        Token::Uint(tx.gas_limit),
        Token::Uint(meta.gas_per_pubdata),
        Token::Uint(tx.max_fee_per_gas),
        Token::Uint(tx.max_priority_fee_per_gas),
        Token::Address(paymaster),
        Token::Uint(tx.nonce),
        Token::Uint(tx.value),
        Token::FixedBytes(keccak256(tx.data.as_ref()).to_vec()),
        Token::FixedBytes(keccak256(&dep_hashes).to_vec()),
        Token::FixedBytes(keccak256(paymaster_input).to_vec()),
    ]);

    Ok(keccak256(&encoded))
}

/// zkSync versioned bytecode hash: `0x01 0x00 || len_in_words (u16 BE) || sha256(code)[4..]`
pub fn hash_bytecode(bytecode: &[u8]) -> AccountResult<[u8; 32]> {
    if bytecode.len() % 32 != 0 {
        return Err(AccountError::MalformedTransaction(
            "bytecode length in bytes must be divisible by 32".to_string(),
        ));
    }
    if bytecode.len() > MAX_BYTECODE_LEN_BYTES {
        return Err(AccountError::MalformedTransaction(format!(
            "bytecode can not be longer than {} bytes",
            MAX_BYTECODE_LEN_BYTES
        )));
    }

    let words = bytecode.len() / 32;
    if words % 2 == 0 {
        return Err(AccountError::MalformedTransaction(
            "bytecode length in 32-byte words must be odd".to_string(),
        ));
    }

    let mut hash: [u8; 32] = Sha256::digest(bytecode).into();
    hash[0] = 1;
    hash[1] = 0;
    hash[2..4].copy_from_slice(&(words as u16).to_be_bytes());
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::meta::PaymasterParams;
    use ethers::types::Bytes;

    fn fixed_tx() -> MetaTransaction {
        MetaTransaction::builder()
            .from("0x2776c9467dfd1CBd33F177Bb9d8B278F1240C0BE".parse().unwrap())
            .to("0x83ab333762f0D3A6A28109962fF37312Dc3c6a69".parse().unwrap())
            .value(1000u64)
            .gas_limit(21_000u64)
            .gas_price(1_000_000_000u64)
            .chain_id(300)
            .nonce(5u64)
            .build()
            .unwrap()
    }

    #[test]
    fn test_transaction_type_hash() {
        assert_eq!(
            hex::encode(keccak256(TRANSACTION_TYPE.as_bytes())),
            "848e1bfa1ac4e3576b728bda6721b215c70a7799a5b4866282a71bab954baac8"
        );
    }

    #[test]
    fn test_domain_separator_known_value() {
        assert_eq!(
            hex::encode(domain_separator(300)),
            "2542d09dcd1d2c7fb4e011e51e425eb19fc16ec350d406b8d8cc26402dc0c9f2"
        );
    }

    #[test]
    fn test_fixed_digest() {
        let digest = signing_digest(&fixed_tx()).unwrap();
        assert_eq!(
            hex::encode(digest.as_bytes()),
            "cc36f112709d2c26630ed3911692a6baa14bbe31230b94c5edbfa2da7ae15e08"
        );
    }

    #[test]
    fn test_digest_is_deterministic() {
        let tx = fixed_tx();
        let first = signing_digest(&tx).unwrap();
        let second = signing_digest(&tx.clone()).unwrap();
        let rebuilt = signing_digest(&tx.to_builder().build().unwrap()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, rebuilt);
    }

    #[test]
    fn test_digest_changes_with_every_field() {
        let tx = fixed_tx();
        let base = signing_digest(&tx).unwrap();

        let variants = vec![
            tx.to_builder().from(Address::repeat_byte(1)),
            tx.to_builder().to(Address::repeat_byte(2)),
            tx.to_builder().data(vec![0xde, 0xad]),
            tx.to_builder().value(1001u64),
            tx.to_builder().gas_limit(21_001u64),
            tx.to_builder().max_fee_per_gas(1_000_000_001u64),
            tx.to_builder().max_priority_fee_per_gas(999_999_999u64),
            tx.to_builder().chain_id(324),
            tx.to_builder().nonce(6u64),
            tx.to_builder().gas_per_pubdata(800u64),
            tx.to_builder().factory_deps(vec![Bytes::from(vec![0u8; 32])]),
            tx.to_builder().paymaster(PaymasterParams {
                paymaster: Address::repeat_byte(3),
                paymaster_input: Bytes::default(),
            }),
            tx.to_builder().paymaster(PaymasterParams {
                paymaster: Address::zero(),
                paymaster_input: Bytes::from(vec![1u8]),
            }),
        ];

        for (i, variant) in variants.into_iter().enumerate() {
            let changed = signing_digest(&variant.build().unwrap()).unwrap();
            assert_ne!(base, changed, "variant {} did not change the digest", i);
        }
    }

    #[test]
    fn test_signature_excluded_from_digest() {
        let tx = fixed_tx();
        let unsigned = signing_digest(&tx).unwrap();
        let signed = tx.with_signature(Bytes::from(vec![7u8; 65]));
        assert_eq!(unsigned, signing_digest(&signed).unwrap());
    }

    #[test]
    fn test_hash_bytecode() {
        let code = vec![0xaau8; 32];
        let hash = hash_bytecode(&code).unwrap();
        assert_eq!(&hash[..4], &[0x01, 0x00, 0x00, 0x01]);

        let sha: [u8; 32] = Sha256::digest(&code).into();
        assert_eq!(&hash[4..], &sha[4..]);
    }

    #[test]
    fn test_hash_bytecode_rejects_bad_lengths() {
        assert!(hash_bytecode(&[0u8; 31]).is_err());
        assert!(hash_bytecode(&[0u8; 64]).is_err());
        assert!(hash_bytecode(&[0u8; 96]).is_ok());
    }

    #[test]
    fn test_invalid_factory_dep_fails_digest() {
        let tx = fixed_tx()
            .to_builder()
            .factory_deps(vec![Bytes::from(vec![0u8; 10])])
            .build()
            .unwrap();
        assert!(matches!(
            signing_digest(&tx),
            Err(AccountError::MalformedTransaction(_))
        ));
    }
}
