use crate::contracts::ContractKind;
use crate::error::DeploymentError;
use alloy::primitives::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Hardhat writes `bytecode` as a hex string, Foundry as `{ "object": "0x..." }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArtifactBytecode {
    Plain(String),
    Object { object: String },
}

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    #[serde(rename = "contractName")]
    contract_name: Option<String>,
    bytecode: ArtifactBytecode,
}

/// Resolves creation bytecode for each [`ContractKind`] from compiled artifacts on disk.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    cache: Mutex<HashMap<ContractKind, Bytes>>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidate_paths(&self, name: &str) -> [PathBuf; 3] {
        let file = format!("{name}.json");
        let dir = format!("{name}.sol");
        [
            self.root.join("contracts").join(&dir).join(&file),
            self.root.join(&dir).join(&file),
            self.root.join(&file),
        ]
    }

    pub fn bytecode(&self, kind: ContractKind) -> Result<Bytes, DeploymentError> {
        if let Some(hit) = self
            .cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&kind).cloned())
        {
            return Ok(hit);
        }

        let name = kind.artifact_name();
        let artifact_err = |reason: String| DeploymentError::Artifact {
            contract: name.to_string(),
            reason,
        };
        let path = self
            .candidate_paths(name)
            .into_iter()
            .find(|p| p.exists())
            .ok_or_else(|| {
                artifact_err(format!("no artifact JSON under {}", self.root.display()))
            })?;
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| artifact_err(format!("{}: {e}", path.display())))?;
        let bytecode = parse_artifact_bytecode(&raw).map_err(artifact_err)?;

        tracing::debug!(
            "[DEPLOY] artifact {} resolved from {} ({} bytes)",
            name,
            path.display(),
            bytecode.len()
        );
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(kind, bytecode.clone());
        }
        Ok(bytecode)
    }
}

fn parse_artifact_bytecode(raw: &str) -> Result<Bytes, String> {
    let artifact: ArtifactFile =
        serde_json::from_str(raw).map_err(|e| format!("artifact JSON malformed: {e}"))?;
    let hex_code = match artifact.bytecode {
        ArtifactBytecode::Plain(code) => code,
        ArtifactBytecode::Object { object } => object,
    };
    let digits = crate::utils::hex::clean_hex(&hex_code);
    if digits.is_empty() {
        return Err(format!(
            "{} has empty creation bytecode (abstract contract or interface?)",
            artifact.contract_name.as_deref().unwrap_or("artifact")
        ));
    }
    if digits.contains("__$") {
        return Err("bytecode has unlinked library placeholders".to_string());
    }
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| format!("bytecode is not valid hex: {e}"))
}
