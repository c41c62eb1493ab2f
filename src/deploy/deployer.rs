//! Contract deployment through the zkSync deployer system contract

use super::artifact::ArtifactStore;
use crate::chain::FeeNonceOracle;
use crate::contracts::{deploy_call, DeploymentKind};
use crate::error::{AccountError, AccountResult};
use crate::tx::{AccountPipeline, AccountSigner, TransactionBuilder};

use ethers::types::{Address, Bytes, H256};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A confirmed deployment
#[derive(Debug, Clone)]
pub struct Deployment {
    pub contract_name: String,
    pub source_name: String,
    pub address: Address,
    pub tx_hash: H256,
    /// Constructor arguments as given
    pub constructor_args: Vec<String>,
    /// ABI-encoded constructor arguments
    pub constructor_input: Bytes,
}

impl Deployment {
    /// `source:Contract`, the form explorers expect
    pub fn qualified_name(&self) -> String {
        if self.source_name.is_empty() {
            self.contract_name.clone()
        } else {
            format!("{}:{}", self.source_name, self.contract_name)
        }
    }
}

/// Deploys artifacts from the signer's own address
pub struct Deployer {
    oracle: Arc<dyn FeeNonceOracle>,
    signer: Arc<dyn AccountSigner>,
    artifacts: ArtifactStore,
    inclusion_timeout: Option<Duration>,
}

impl Deployer {
    pub fn new(
        oracle: Arc<dyn FeeNonceOracle>,
        signer: Arc<dyn AccountSigner>,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            oracle,
            signer,
            artifacts,
            inclusion_timeout: None,
        }
    }

    pub fn with_inclusion_timeout(mut self, limit: Option<Duration>) -> Self {
        self.inclusion_timeout = limit;
        self
    }

    /// Deploy `contract_name` with string constructor arguments
    pub async fn deploy(
        &self,
        contract_name: &str,
        kind: DeploymentKind,
        constructor_args: &[String],
    ) -> AccountResult<Deployment> {
        let artifact = self.artifacts.load(contract_name)?;
        let bytecode_hash = artifact.bytecode_hash()?;
        let input = artifact.encode_constructor_args(constructor_args)?;
        let factory_deps = self.artifacts.deployment_bytecodes(&artifact)?;

        info!(
            "Deploying {} ({:?}) with {} factory deps",
            artifact.contract_name,
            kind,
            factory_deps.len()
        );

        let call = deploy_call(kind, bytecode_hash, input.clone()).with_factory_deps(factory_deps);
        let builder = TransactionBuilder::new(self.oracle.clone(), self.signer.address());
        let pipeline = AccountPipeline::new(self.oracle.clone(), self.signer.clone(), builder)
            .with_inclusion_timeout(self.inclusion_timeout);

        let execution = pipeline.execute(&call).await?;
        let confirmation = execution.confirmation;

        let address = confirmation
            .deployed_contracts
            .first()
            .copied()
            .ok_or_else(|| {
                AccountError::Deployment(format!(
                    "transaction {:?} confirmed but no contract was deployed",
                    confirmation.tx_hash
                ))
            })?;

        info!("{} was deployed to {:?}", artifact.contract_name, address);

        Ok(Deployment {
            contract_name: artifact.contract_name,
            source_name: artifact.source_name,
            address,
            tx_hash: confirmation.tx_hash,
            constructor_args: constructor_args.to_vec(),
            constructor_input: Bytes::from(input),
        })
    }
}
