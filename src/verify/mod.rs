//! Source verification of deployed contracts
//!
//! Verification runs after a settling delay so the explorer has indexed the
//! deployment. It is best effort: failures are logged and never reach the
//! caller.

mod explorer;

pub use explorer::ExplorerVerifier;

use crate::error::AccountResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes};
use std::time::Duration;
use tracing::{info, warn};

/// Interval between verification status checks
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Status checks before giving up on a pending verification
const MAX_STATUS_CHECKS: usize = 20;

/// What to verify and how it was constructed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub contract_address: Address,
    /// Fully qualified name, `contracts/Foo.sol:Foo`
    pub contract_name: String,
    /// ABI-encoded constructor arguments
    pub constructor_arguments: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Queued,
    InProgress,
    Successful,
    Failed(String),
}

/// Block explorer accepting source verification requests
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Submit a request, returning the explorer's request id
    async fn submit(&self, request: &VerificationRequest) -> AccountResult<u64>;

    async fn status(&self, request_id: u64) -> AccountResult<VerificationStatus>;
}

/// Time source for the settling delay
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Wait `delay`, submit `request` and follow it to a final status
///
/// Returns the final status, or `None` when verification could not complete.
pub async fn schedule_verification(
    verifier: &dyn Verifier,
    clock: &dyn Clock,
    delay: Duration,
    request: VerificationRequest,
) -> Option<VerificationStatus> {
    info!(
        "Sleeping {:?} before verifying {} at {:?}",
        delay, request.contract_name, request.contract_address
    );
    clock.sleep(delay).await;

    let request_id = match verifier.submit(&request).await {
        Ok(id) => id,
        Err(e) => {
            warn!("Verification of {} failed: {}", request.contract_name, e);
            return None;
        }
    };
    info!(
        "Verification of {} submitted (request {})",
        request.contract_name, request_id
    );

    for _ in 0..MAX_STATUS_CHECKS {
        match verifier.status(request_id).await {
            Ok(VerificationStatus::Successful) => {
                info!("{} verified", request.contract_name);
                return Some(VerificationStatus::Successful);
            }
            Ok(VerificationStatus::Failed(reason)) => {
                warn!("Verification of {} rejected: {}", request.contract_name, reason);
                return Some(VerificationStatus::Failed(reason));
            }
            Ok(_) => clock.sleep(STATUS_POLL_INTERVAL).await,
            Err(e) => {
                warn!(
                    "Verification status of {} unavailable: {}",
                    request.contract_name, e
                );
                return None;
            }
        }
    }

    warn!(
        "Verification of {} still pending after {} checks",
        request.contract_name, MAX_STATUS_CHECKS
    );
    None
}
