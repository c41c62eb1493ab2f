//! Solidity bindings for the contracts the scripts talk to
//!
//! Calldata is produced with `alloy-sol-types`; the rest of the crate speaks
//! `ethers` types, so conversions live here too.

use crate::chain::TargetCall;
use crate::error::{AccountError, AccountResult};

use alloy_primitives as alloy;
use alloy_sol_types::{sol, SolCall, SolEvent};
use ethers::types::{Address, Bytes, Log, H160, H256, U256};

/// zkSync `ContractDeployer` system contract
pub const CONTRACT_DEPLOYER_ADDRESS: Address = H160([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x80, 0x06,
]);

/// `IContractDeployer.AccountAbstractionVersion.Version1`
const AA_VERSION_1: u8 = 1;

sol! {
    interface IMockERC20 {
        function mint(address to, uint256 amount) external;
        function totalSupply() external view returns (uint256);
    }

    interface IZkMinimalAccount {
        function owner() external view returns (address);
    }

    interface IContractDeployer {
        event ContractDeployed(
            address indexed deployerAddress,
            bytes32 indexed bytecodeHash,
            address indexed contractAddress
        );

        function create(bytes32 salt, bytes32 bytecodeHash, bytes input)
            external payable returns (address);

        function createAccount(bytes32 salt, bytes32 bytecodeHash, bytes input, uint8 aaVersion)
            external payable returns (address);
    }
}

/// How the deployer system contract registers new code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentKind {
    /// Plain contract (`create`)
    Contract,
    /// Smart-contract account (`createAccount`), allowed to be a transaction `from`
    Account,
}

pub fn to_alloy_address(address: Address) -> alloy::Address {
    alloy::Address::from(address.0)
}

pub fn from_alloy_address(address: alloy::Address) -> Address {
    Address::from_slice(address.as_slice())
}

pub fn to_alloy_u256(value: U256) -> alloy::U256 {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    alloy::U256::from_be_bytes(bytes)
}

pub fn from_alloy_u256(value: alloy::U256) -> U256 {
    U256::from_big_endian(&value.to_be_bytes::<32>())
}

pub fn mint_call(token: Address, to: Address, amount: U256) -> TargetCall {
    let data = IMockERC20::mintCall {
        to: to_alloy_address(to),
        amount: to_alloy_u256(amount),
    }
    .abi_encode();
    TargetCall::new(token, data)
}

pub fn total_supply_call(token: Address) -> TargetCall {
    TargetCall::new(token, IMockERC20::totalSupplyCall {}.abi_encode())
}

pub fn decode_total_supply(output: &Bytes) -> AccountResult<U256> {
    let ret = IMockERC20::totalSupplyCall::abi_decode_returns(output, true)
        .map_err(|e| AccountError::Abi(format!("totalSupply: {}", e)))?;
    Ok(from_alloy_u256(ret._0))
}

pub fn owner_call(account: Address) -> TargetCall {
    TargetCall::new(account, IZkMinimalAccount::ownerCall {}.abi_encode())
}

pub fn decode_owner(output: &Bytes) -> AccountResult<Address> {
    let ret = IZkMinimalAccount::ownerCall::abi_decode_returns(output, true)
        .map_err(|e| AccountError::Abi(format!("owner: {}", e)))?;
    Ok(from_alloy_address(ret._0))
}

/// Call to the deployer system contract registering `bytecode_hash` with constructor `input`
pub fn deploy_call(kind: DeploymentKind, bytecode_hash: [u8; 32], input: Vec<u8>) -> TargetCall {
    let salt = alloy::B256::ZERO;
    let bytecode_hash = alloy::B256::from(bytecode_hash);
    let input = alloy::Bytes::from(input);

    let data = match kind {
        DeploymentKind::Contract => IContractDeployer::createCall {
            salt,
            bytecodeHash: bytecode_hash,
            input,
        }
        .abi_encode(),
        DeploymentKind::Account => IContractDeployer::createAccountCall {
            salt,
            bytecodeHash: bytecode_hash,
            input,
            aaVersion: AA_VERSION_1,
        }
        .abi_encode(),
    };

    TargetCall::new(CONTRACT_DEPLOYER_ADDRESS, data)
}

/// Addresses announced by `ContractDeployed` events of the deployer system contract
pub fn deployed_addresses(logs: &[Log]) -> Vec<Address> {
    let signature = H256::from(IContractDeployer::ContractDeployed::SIGNATURE_HASH.0);

    logs.iter()
        .filter(|log| log.address == CONTRACT_DEPLOYER_ADDRESS)
        .filter(|log| log.topics.len() == 4 && log.topics[0] == signature)
        .map(|log| Address::from_slice(&log.topics[3].as_bytes()[12..]))
        .collect()
}
