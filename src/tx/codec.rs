//! Transaction finalizer: signature attachment and the type-113 wire format
//!
//! `0x71 || rlp([nonce, maxPriorityFeePerGas, maxFeePerGas, gasLimit, to, value,
//! data, chainId, 0x, 0x, chainId, from, gasPerPubdata, factoryDeps,
//! customSignature, paymasterParams])`

use super::digest::{keccak256, signing_digest, SigningDigest};
use super::meta::{Eip712Meta, MetaTransaction, PaymasterParams, EIP712_TX_TYPE};
use super::signer::SignedTransaction;
use crate::error::{AccountError, AccountResult};

use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::rlp::{Rlp, RlpStream};

const FIELD_COUNT: usize = 16;

/// Serialized transaction ready for `eth_sendRawTransaction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    bytes: Bytes,
    tx_hash: H256,
}

impl RawTransaction {
    /// Serialize a signed transaction and derive its network hash
    pub fn encode(tx: &MetaTransaction) -> AccountResult<Self> {
        let bytes = serialize(tx)?;
        let digest = signing_digest(tx)?;
        let tx_hash = transaction_hash(&digest, tx.meta.custom_signature.as_ref());
        Ok(Self { bytes, tx_hash })
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Hash the network assigns: keccak256(digest || keccak256(signature))
    pub fn tx_hash(&self) -> H256 {
        self.tx_hash
    }
}

impl SignedTransaction {
    /// Attach the signature and serialize, consuming this stage
    pub fn finalize(self) -> AccountResult<RawTransaction> {
        let tx = attach_signature(self.tx, self.signature)?;
        RawTransaction::encode(&tx)
    }
}

/// Place `signature` into the custom-data envelope, keeping the other envelope fields
pub fn attach_signature(tx: MetaTransaction, signature: Bytes) -> AccountResult<MetaTransaction> {
    if signature.is_empty() {
        return Err(AccountError::MalformedTransaction(
            "empty signatures are not supported".to_string(),
        ));
    }
    Ok(tx.with_signature(signature))
}

/// Encode a signed transaction; fails with `UnsignedTransaction` otherwise
pub fn serialize(tx: &MetaTransaction) -> AccountResult<Bytes> {
    let meta = &tx.meta;
    let signature = meta
        .custom_signature
        .as_ref()
        .ok_or(AccountError::UnsignedTransaction)?;

    let mut stream = RlpStream::new_list(FIELD_COUNT);
    stream.append(&tx.nonce);
    stream.append(&tx.max_priority_fee_per_gas);
    stream.append(&tx.max_fee_per_gas);
    stream.append(&tx.gas_limit);
    stream.append(&tx.to);
    stream.append(&tx.value);
    stream.append(&tx.data.to_vec());
    // Native signature slots; the account signature travels in custom data
    stream.append(&tx.chain_id);
    stream.append_empty_data();
    stream.append_empty_data();
    stream.append(&tx.chain_id);
    stream.append(&tx.from);
    stream.append(&meta.gas_per_pubdata);

    stream.begin_list(meta.factory_deps.len());
    for dep in &meta.factory_deps {
        stream.append(&dep.to_vec());
    }

    stream.append(&signature.to_vec());

    match &meta.paymaster_params {
        Some(params) => {
            stream.begin_list(2);
            stream.append(&params.paymaster);
            stream.append(&params.paymaster_input.to_vec());
        }
        None => {
            stream.begin_list(0);
        }
    }

    let encoded = stream.out();
    let mut out = Vec::with_capacity(encoded.len() + 1);
    out.push(EIP712_TX_TYPE);
    out.extend_from_slice(&encoded);
    Ok(Bytes::from(out))
}

/// Decode the wire form back into a transaction
pub fn deserialize(raw: &[u8]) -> AccountResult<MetaTransaction> {
    let (tx_type, payload) = raw
        .split_first()
        .ok_or_else(|| AccountError::Decode("empty transaction".to_string()))?;

    if *tx_type != EIP712_TX_TYPE {
        return Err(AccountError::Decode(format!(
            "unexpected transaction type 0x{:02x}",
            tx_type
        )));
    }

    let rlp = Rlp::new(payload);
    if rlp.payload_info()?.total() != payload.len() {
        return Err(AccountError::Decode("trailing bytes after transaction".to_string()));
    }
    let count = rlp.item_count()?;
    if count != FIELD_COUNT {
        return Err(AccountError::Decode(format!(
            "expected {} fields, found {}",
            FIELD_COUNT, count
        )));
    }

    let factory_deps: Vec<Vec<u8>> = rlp.list_at(13)?;
    let custom_signature: Vec<u8> = rlp.val_at(14)?;

    let paymaster = rlp.at(15)?;
    let paymaster_params = match paymaster.item_count()? {
        0 => None,
        2 => Some(PaymasterParams {
            paymaster: paymaster.val_at::<Address>(0)?,
            paymaster_input: Bytes::from(paymaster.val_at::<Vec<u8>>(1)?),
        }),
        n => {
            return Err(AccountError::Decode(format!(
                "paymaster params must have 0 or 2 fields, found {}",
                n
            )))
        }
    };

    let tx = MetaTransaction {
        nonce: rlp.val_at::<U256>(0)?,
        max_priority_fee_per_gas: rlp.val_at::<U256>(1)?,
        max_fee_per_gas: rlp.val_at::<U256>(2)?,
        gas_limit: rlp.val_at::<U256>(3)?,
        to: rlp.val_at::<Address>(4)?,
        value: rlp.val_at::<U256>(5)?,
        data: Bytes::from(rlp.val_at::<Vec<u8>>(6)?),
        chain_id: rlp.val_at::<u64>(10)?,
        from: rlp.val_at::<Address>(11)?,
        meta: Eip712Meta {
            gas_per_pubdata: rlp.val_at::<U256>(12)?,
            factory_deps: factory_deps.into_iter().map(Bytes::from).collect(),
            paymaster_params,
            custom_signature: if custom_signature.is_empty() {
                None
            } else {
                Some(Bytes::from(custom_signature))
            },
        },
    };

    tx.validate()?;
    Ok(tx)
}

/// Network transaction hash for a signed type-113 transaction
pub fn transaction_hash(digest: &SigningDigest, signature: Option<&Bytes>) -> H256 {
    let signature_hash = keccak256(signature.map(|s| s.as_ref()).unwrap_or_default());
    let mut preimage = Vec::with_capacity(64);
    preimage.extend_from_slice(digest.as_bytes());
    preimage.extend_from_slice(&signature_hash);
    H256::from(keccak256(&preimage))
}
