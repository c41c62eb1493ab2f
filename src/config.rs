//! Configuration management for the account sender
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the configuration file path
pub const CONFIG_ENV: &str = "ZK_ACCOUNT_CONFIG";

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub network: NetworkConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub tx: TxConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub rpc_urls: Vec<String>,
    /// Expected chain id; checked against the node when set
    pub chain_id: Option<u64>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Name of the environment variable holding the hex private key
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub minimal_account: Option<String>,
    pub token: Option<String>,
    #[serde(default = "default_mint_amount")]
    pub mint_amount: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            minimal_account: None,
            token: None,
            mint_amount: default_mint_amount(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifacts_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_account_contract")]
    pub account_contract: String,
    #[serde(default = "default_token_contract")]
    pub token_contract: String,
    #[serde(default = "default_token_args")]
    pub token_constructor_args: Vec<String>,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
            account_contract: default_account_contract(),
            token_contract: default_token_contract(),
            token_constructor_args: default_token_args(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationConfig {
    #[serde(default)]
    pub enabled: bool,
    pub url: Option<String>,
    #[serde(default = "default_verification_delay_secs")]
    pub delay_secs: u64,
    pub zksolc_version: Option<String>,
    pub solc_version: Option<String>,
    /// Solidity standard-JSON input submitted as the source
    pub source_path: Option<PathBuf>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            delay_secs: default_verification_delay_secs(),
            zksolc_version: None,
            solc_version: None,
            source_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxConfig {
    /// Upper bound on the inclusion wait; unbounded when absent
    pub inclusion_timeout_secs: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_private_key_env() -> String {
    "PRIVATE_KEY".to_string()
}

fn default_mint_amount() -> String {
    "1000000".to_string()
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts-zk")
}

fn default_account_contract() -> String {
    "ZkMinimalAccount".to_string()
}

fn default_token_contract() -> String {
    "MockERC20".to_string()
}

fn default_token_args() -> Vec<String> {
    vec!["0".to_string(), "18".to_string()]
}

fn default_verification_delay_secs() -> u64 {
    10
}

impl Settings {
    /// Load settings from `path`, `$ZK_ACCOUNT_CONFIG`, or `config/default.toml`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => env::var(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/default.toml")),
        };

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from a TOML string
    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.network.rpc_urls.iter().all(|u| u.trim().is_empty()) {
            anyhow::bail!("Network {} has no RPC URLs configured", self.network.name);
        }

        if self.verification.enabled && self.verification.url.is_none() {
            anyhow::bail!("Verification is enabled but no verification url is set");
        }

        if self.account.minimal_account.is_none() {
            tracing::warn!("No minimal account address configured - send-tx will be unavailable");
        }

        Ok(())
    }

    pub fn inclusion_timeout(&self) -> Option<std::time::Duration> {
        self.tx
            .inclusion_timeout_secs
            .map(std::time::Duration::from_secs)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
