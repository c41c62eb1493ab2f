//! hardhat-zksync compilation artifacts

use crate::error::{AccountError, AccountResult};
use crate::tx::digest::hash_bytecode;

use ethers::abi::token::{LenientTokenizer, Tokenizer};
use ethers::abi::{Abi, Token};
use ethers::types::Bytes;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk artifact layout written by `hardhat-zksync-solc`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    contract_name: String,
    #[serde(default)]
    source_name: String,
    abi: Abi,
    bytecode: String,
    /// Bytecode hash → `source:Contract` of every contract this one may deploy
    #[serde(default)]
    factory_deps: BTreeMap<String, String>,
}

/// A compiled contract ready for deployment
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: Abi,
    pub bytecode: Bytes,
    pub factory_deps: BTreeMap<String, String>,
}

impl ContractArtifact {
    /// Parse an artifact from its JSON text
    pub fn from_json(json: &str) -> AccountResult<Self> {
        let file: ArtifactFile = serde_json::from_str(json)
            .map_err(|e| AccountError::Artifact(format!("invalid artifact: {}", e)))?;

        let hex_code = file.bytecode.trim_start_matches("0x");
        let bytecode = hex::decode(hex_code).map_err(|e| {
            AccountError::Artifact(format!("{}: invalid bytecode hex: {}", file.contract_name, e))
        })?;
        if bytecode.is_empty() {
            return Err(AccountError::Artifact(format!(
                "{} has no bytecode (abstract contract or interface?)",
                file.contract_name
            )));
        }

        Ok(Self {
            contract_name: file.contract_name,
            source_name: file.source_name,
            abi: file.abi,
            bytecode: Bytes::from(bytecode),
            factory_deps: file.factory_deps,
        })
    }

    /// zkSync bytecode hash used by the deployer system contract
    pub fn bytecode_hash(&self) -> AccountResult<[u8; 32]> {
        hash_bytecode(&self.bytecode)
    }

    /// ABI-encode constructor arguments given as strings
    ///
    /// Arguments are parsed leniently: `"18"` is a valid `uint8`, `"0x..."`
    /// a valid `address` or `bytes`.
    pub fn encode_constructor_args(&self, args: &[String]) -> AccountResult<Vec<u8>> {
        let Some(constructor) = self.abi.constructor() else {
            if args.is_empty() {
                return Ok(Vec::new());
            }
            return Err(AccountError::Abi(format!(
                "{} has no constructor but {} arguments were given",
                self.contract_name,
                args.len()
            )));
        };

        if constructor.inputs.len() != args.len() {
            return Err(AccountError::Abi(format!(
                "{} constructor takes {} arguments, got {}",
                self.contract_name,
                constructor.inputs.len(),
                args.len()
            )));
        }

        let tokens = constructor
            .inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                LenientTokenizer::tokenize(&param.kind, arg).map_err(|e| {
                    AccountError::Abi(format!("argument {} ({}): {}", param.name, arg, e))
                })
            })
            .collect::<AccountResult<Vec<Token>>>()?;

        Ok(constructor.encode_input(Vec::new(), &tokens)?)
    }
}

/// Directory of compiled artifacts, searched recursively by contract name
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load the artifact for `contract_name`
    pub fn load(&self, contract_name: &str) -> AccountResult<ContractArtifact> {
        let file_name = format!("{}.json", contract_name);
        let path = find_file(&self.dir, &file_name)?.ok_or_else(|| {
            AccountError::Artifact(format!(
                "artifact {} not found under {}",
                contract_name,
                self.dir.display()
            ))
        })?;

        debug!("Loading artifact {}", path.display());
        let json = fs::read_to_string(&path)
            .map_err(|e| AccountError::Artifact(format!("{}: {}", path.display(), e)))?;
        ContractArtifact::from_json(&json)
    }

    /// Bytecode to publish with a deployment: the contract's own, then its
    /// factory dependencies, transitively and without duplicates
    pub fn deployment_bytecodes(&self, artifact: &ContractArtifact) -> AccountResult<Vec<Bytes>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        self.collect_bytecodes(artifact, &mut seen, &mut out)?;
        Ok(out)
    }

    fn collect_bytecodes(
        &self,
        artifact: &ContractArtifact,
        seen: &mut HashSet<[u8; 32]>,
        out: &mut Vec<Bytes>,
    ) -> AccountResult<()> {
        if !seen.insert(artifact.bytecode_hash()?) {
            return Ok(());
        }
        out.push(artifact.bytecode.clone());

        for qualified in artifact.factory_deps.values() {
            let name = qualified.rsplit(':').next().unwrap_or(qualified);
            let dep = self.load(name)?;
            self.collect_bytecodes(&dep, seen, out)?;
        }
        Ok(())
    }
}

fn find_file(dir: &Path, file_name: &str) -> AccountResult<Option<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| AccountError::Artifact(format!("{}: {}", dir.display(), e)))?;

    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| AccountError::Artifact(format!("{}: {}", dir.display(), e)))?
            .path();
        if path.is_dir() {
            subdirs.push(path);
        } else if path.file_name().and_then(|n| n.to_str()) == Some(file_name) {
            return Ok(Some(path));
        }
    }

    subdirs.sort();
    for subdir in subdirs {
        if let Some(found) = find_file(&subdir, file_name)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}
