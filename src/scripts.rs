//! Operator flows behind the CLI subcommands

use crate::chain::FeeNonceOracle;
use crate::config::Settings;
use crate::contracts::{
    decode_owner, decode_total_supply, mint_call, owner_call, total_supply_call, DeploymentKind,
};
use crate::deploy::{ArtifactStore, Deployer, Deployment};
use crate::error::{AccountError, AccountResult};
use crate::tx::{AccountPipeline, AccountSigner, Execution, TransactionBuilder};
use crate::verify::{schedule_verification, Clock, VerificationRequest, Verifier};

use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Everything a flow needs, injected by the binary
pub struct ScriptContext {
    pub settings: Settings,
    pub oracle: Arc<dyn FeeNonceOracle>,
    pub signer: Arc<dyn AccountSigner>,
    /// Present when verification is enabled
    pub verifier: Option<Arc<dyn Verifier>>,
    pub clock: Arc<dyn Clock>,
}

impl ScriptContext {
    fn deployer(&self) -> Deployer {
        Deployer::new(
            self.oracle.clone(),
            self.signer.clone(),
            ArtifactStore::new(&self.settings.artifacts.dir),
        )
        .with_inclusion_timeout(self.settings.inclusion_timeout())
    }

    async fn verify(&self, deployment: &Deployment) {
        let Some(verifier) = &self.verifier else {
            return;
        };

        let request = VerificationRequest {
            contract_address: deployment.address,
            contract_name: deployment.qualified_name(),
            constructor_arguments: deployment.constructor_input.clone(),
        };
        let delay = Duration::from_secs(self.settings.verification.delay_secs);
        schedule_verification(verifier.as_ref(), self.clock.as_ref(), delay, request).await;
    }
}

/// Deploy the smart-contract account artifact
pub async fn deploy_account(ctx: &ScriptContext) -> AccountResult<Deployment> {
    let name = &ctx.settings.artifacts.account_contract;
    info!("Running deploy script for {}", name);

    let deployment = ctx.deployer().deploy(name, DeploymentKind::Account, &[]).await?;
    ctx.verify(&deployment).await;
    Ok(deployment)
}

/// Deploy the mintable test token
pub async fn deploy_token(ctx: &ScriptContext) -> AccountResult<Deployment> {
    let artifacts = &ctx.settings.artifacts;
    info!("Running deploy script for {}", artifacts.token_contract);

    let deployment = ctx
        .deployer()
        .deploy(
            &artifacts.token_contract,
            DeploymentKind::Contract,
            &artifacts.token_constructor_args,
        )
        .await?;
    ctx.verify(&deployment).await;
    Ok(deployment)
}

/// Mint tokens to the signer through a transaction originating from the account
pub async fn send_tx(ctx: &ScriptContext) -> AccountResult<Execution> {
    let account_cfg = &ctx.settings.account;
    let account = parse_address("account.minimal_account", account_cfg.minimal_account.as_deref())?;
    let token = parse_address("account.token", account_cfg.token.as_deref())?;
    let amount = U256::from_dec_str(&account_cfg.mint_amount).map_err(|e| {
        AccountError::Config(format!(
            "account.mint_amount {:?} is not a decimal amount: {}",
            account_cfg.mint_amount, e
        ))
    })?;
    let signer_address = ctx.signer.address();

    let owner = decode_owner(&ctx.oracle.call(&owner_call(account)).await?)?;
    info!("The owner of account {:?} is {:?}", account, owner);
    if owner != signer_address {
        warn!(
            "Signer {:?} is not the owner of account {:?}; the account will reject the transaction",
            signer_address, account
        );
    }

    let supply_before = total_supply(ctx.oracle.as_ref(), token).await?;
    info!("Current total supply is {}", supply_before);

    info!("Populating transaction");
    let call = mint_call(token, signer_address, amount);
    let builder = TransactionBuilder::new(ctx.oracle.clone(), account).estimate_as(signer_address);
    let pipeline = AccountPipeline::new(ctx.oracle.clone(), ctx.signer.clone(), builder)
        .with_inclusion_timeout(ctx.settings.inclusion_timeout());

    let execution = pipeline.execute(&call).await?;
    info!(
        "The account nonce before the tx was {}, after the tx is {}",
        execution.nonce_before, execution.nonce_after
    );

    let supply_after = total_supply(ctx.oracle.as_ref(), token).await?;
    info!("Current total supply is {}", supply_after);

    Ok(execution)
}

async fn total_supply(oracle: &dyn FeeNonceOracle, token: Address) -> AccountResult<U256> {
    decode_total_supply(&oracle.call(&total_supply_call(token)).await?)
}

fn parse_address(field: &str, value: Option<&str>) -> AccountResult<Address> {
    let value = value.ok_or_else(|| AccountError::Config(format!("{} not set", field)))?;
    value
        .parse()
        .map_err(|e| AccountError::Config(format!("{} {:?} is not an address: {}", field, value, e)))
}
