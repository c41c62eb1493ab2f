//! zkSync block explorer verification API

use super::{VerificationRequest, VerificationStatus, Verifier};
use crate::config::VerificationConfig;
use crate::error::{AccountError, AccountResult};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const CODE_FORMAT: &str = "solidity-standard-json-input";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    compilation_errors: Vec<String>,
}

/// Verifier posting standard-JSON sources to the explorer's verification endpoint
pub struct ExplorerVerifier {
    client: Client,
    url: String,
    /// Solidity standard-JSON compiler input
    source: Value,
    zksolc_version: String,
    solc_version: String,
}

impl ExplorerVerifier {
    pub fn new(
        url: impl Into<String>,
        source: Value,
        zksolc_version: impl Into<String>,
        solc_version: impl Into<String>,
    ) -> AccountResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AccountError::Verification(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            source,
            zksolc_version: zksolc_version.into(),
            solc_version: solc_version.into(),
        })
    }

    /// Build from the `[verification]` section, reading the source file
    pub fn from_config(config: &VerificationConfig) -> AccountResult<Self> {
        let missing = |field: &str| AccountError::Config(format!("verification.{} not set", field));

        let url = config.url.clone().ok_or_else(|| missing("url"))?;
        let source_path = config.source_path.as_ref().ok_or_else(|| missing("source_path"))?;
        let zksolc_version = config.zksolc_version.clone().ok_or_else(|| missing("zksolc_version"))?;
        let solc_version = config.solc_version.clone().ok_or_else(|| missing("solc_version"))?;

        let text = std::fs::read_to_string(source_path).map_err(|e| {
            AccountError::Verification(format!("{}: {}", source_path.display(), e))
        })?;
        let source: Value = serde_json::from_str(&text).map_err(|e| {
            AccountError::Verification(format!("{}: invalid JSON: {}", source_path.display(), e))
        })?;

        Self::new(url, source, zksolc_version, solc_version)
    }

    fn request_body(&self, request: &VerificationRequest) -> Value {
        json!({
            "contractAddress": request.contract_address,
            "contractName": request.contract_name,
            "sourceCode": self.source,
            "codeFormat": CODE_FORMAT,
            "compilerZksolcVersion": self.zksolc_version,
            "compilerSolcVersion": self.solc_version,
            "optimizationUsed": true,
            "constructorArguments": request.constructor_arguments,
        })
    }
}

fn parse_status(response: StatusResponse) -> VerificationStatus {
    match response.status.as_str() {
        "queued" => VerificationStatus::Queued,
        "in_progress" => VerificationStatus::InProgress,
        "successful" => VerificationStatus::Successful,
        _ => {
            let mut reason = response.error.unwrap_or_else(|| response.status.clone());
            if !response.compilation_errors.is_empty() {
                reason = format!("{}: {}", reason, response.compilation_errors.join("; "));
            }
            VerificationStatus::Failed(reason)
        }
    }
}

#[async_trait]
impl Verifier for ExplorerVerifier {
    async fn submit(&self, request: &VerificationRequest) -> AccountResult<u64> {
        debug!("Posting verification request to {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| AccountError::Verification(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AccountError::Verification(format!("reading response: {}", e)))?;

        if !status.is_success() {
            return Err(AccountError::Verification(format!("HTTP {}: {}", status, text)));
        }

        // The explorer answers with the bare request id
        text.trim()
            .trim_matches('"')
            .parse::<u64>()
            .map_err(|_| AccountError::Verification(format!("unexpected response: {}", text)))
    }

    async fn status(&self, request_id: u64) -> AccountResult<VerificationStatus> {
        let response = self
            .client
            .get(format!("{}/{}", self.url, request_id))
            .send()
            .await
            .map_err(|e| AccountError::Verification(format!("status request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AccountError::Verification(e.to_string()))?
            .json::<StatusResponse>()
            .await
            .map_err(|e| AccountError::Verification(format!("invalid status response: {}", e)))?;

        Ok(parse_status(response))
    }
}
