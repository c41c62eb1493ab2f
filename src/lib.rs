//! zkSync smart-contract account sender
//!
//! Builds, signs and broadcasts type-113 (EIP-712) transactions originating
//! from a smart-contract account, plus the deployment and verification flows
//! that set such an account up.

pub mod chain;
pub mod config;
pub mod contracts;
pub mod deploy;
pub mod error;
pub mod scripts;
pub mod tx;
pub mod verify;

pub use error::{AccountError, AccountResult};
