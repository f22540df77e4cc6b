use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::data::abi::{AbiError, ContractAbi};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} has no \"abi\" field")]
    MissingAbi(PathBuf),
    #[error("invalid ABI in {path}: {source}")]
    Abi {
        path: PathBuf,
        #[source]
        source: AbiError,
    },
}

/// Byte offsets of one library placeholder set inside unlinked bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReference {
    pub file: String,
    pub library: String,
    pub offsets: Vec<(usize, usize)>, // (start, length) in bytes
}

/// Everything needed to deploy or attach a compiled contract.
#[derive(Debug, Clone)]
pub struct ContractDetails {
    pub name: String,
    pub abi: Arc<ContractAbi>,
    /// Creation bytecode as hex without `0x`, possibly with placeholders.
    pub bytecode: String,
    pub link_references: Vec<LinkReference>,
}

impl ContractDetails {
    /// Parse a compiler artifact. Understands the Foundry (`bytecode.object`),
    /// Hardhat (`bytecode` string) and solc (`evm.bytecode.object`) layouts.
    pub fn from_artifact(fallback_name: &str, path: &Path, value: &Value) -> Result<Self, ArtifactError> {
        let abi_value = value
            .get("abi")
            .ok_or_else(|| ArtifactError::MissingAbi(path.to_path_buf()))?;
        let abi = ContractAbi::parse(abi_value).map_err(|source| ArtifactError::Abi {
            path: path.to_path_buf(),
            source,
        })?;

        let bytecode_value = value
            .get("evm")
            .and_then(|evm| evm.get("bytecode"))
            .or_else(|| value.get("bytecode"));

        let (bytecode, links) = match bytecode_value {
            Some(Value::String(code)) => (code.as_str(), value.get("linkReferences")),
            Some(obj @ Value::Object(_)) => (
                obj.get("object").and_then(Value::as_str).unwrap_or_default(),
                obj.get("linkReferences"),
            ),
            _ => ("", None),
        };

        let name = value
            .get("contractName")
            .and_then(Value::as_str)
            .unwrap_or(fallback_name)
            .to_string();

        Ok(Self {
            name,
            abi: Arc::new(abi),
            bytecode: bytecode.trim_start_matches("0x").to_string(),
            link_references: links.map(parse_link_references).unwrap_or_default(),
        })
    }
}

fn parse_link_references(value: &Value) -> Vec<LinkReference> {
    let Some(files) = value.as_object() else {
        return Vec::new();
    };

    let mut references = Vec::new();
    for (file, libraries) in files {
        let Some(libraries) = libraries.as_object() else {
            continue;
        };
        for (library, positions) in libraries {
            let offsets = positions
                .as_array()
                .map(|ps| {
                    ps.iter()
                        .filter_map(|p| {
                            let start = p.get("start")?.as_u64()? as usize;
                            let length = p.get("length")?.as_u64()? as usize;
                            Some((start, length))
                        })
                        .collect()
                })
                .unwrap_or_default();
            references.push(LinkReference {
                file: file.clone(),
                library: library.clone(),
                offsets,
            });
        }
    }
    references
}

/// Compiled contracts known to the session, keyed by contract name.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: BTreeMap<String, Arc<ContractDetails>>,
}

impl ContractRegistry {
    pub fn insert(&mut self, details: ContractDetails) {
        self.contracts.insert(details.name.clone(), Arc::new(details));
    }

    pub fn get(&self, name: &str) -> Option<&ContractDetails> {
        self.contracts.get(name).map(|c| c.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Load a single artifact file, or every `*.json` artifact below a directory.
    ///
    /// Files inside a directory that are not artifacts are skipped with a
    /// warning; an explicitly named file must parse.
    pub fn load_path(&mut self, path: &Path) -> Result<usize, ArtifactError> {
        if path.is_dir() {
            let mut loaded = 0;
            for file in json_files(path)? {
                match load_file(&file) {
                    Ok(details) => {
                        self.insert(details);
                        loaded += 1;
                    }
                    Err(e) => warn!("skipping {}: {e}", file.display()),
                }
            }
            Ok(loaded)
        } else {
            self.insert(load_file(path)?);
            Ok(1)
        }
    }
}

fn load_file(path: &Path) -> Result<ContractDetails, ArtifactError> {
    let content = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Contract");
    let details = ContractDetails::from_artifact(stem, path, &value)?;
    debug!(name = %details.name, path = %path.display(), "loaded artifact");
    Ok(details)
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>, ArtifactError> {
    let io_err = |source| ArtifactError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            files.extend(json_files(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foundry_artifact() {
        let value: Value = serde_json::from_str(
            r#"{
                "abi": [{"type":"function","name":"get","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"}],
                "bytecode": {
                    "object": "0x6080__$aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa$__",
                    "linkReferences": {"src/Math.sol": {"Math": [{"start": 2, "length": 20}]}}
                }
            }"#,
        )
        .unwrap();
        let details = ContractDetails::from_artifact("Store", Path::new("Store.json"), &value).unwrap();
        assert_eq!(details.name, "Store");
        assert!(details.bytecode.starts_with("6080"));
        assert_eq!(details.abi.functions().len(), 1);
        assert_eq!(
            details.link_references,
            vec![LinkReference {
                file: "src/Math.sol".to_string(),
                library: "Math".to_string(),
                offsets: vec![(2, 20)],
            }]
        );
    }

    #[test]
    fn test_hardhat_artifact() {
        let value: Value = serde_json::from_str(
            r#"{"contractName":"Token","abi":[],"bytecode":"0x6001","linkReferences":{}}"#,
        )
        .unwrap();
        let details = ContractDetails::from_artifact("ignored", Path::new("x.json"), &value).unwrap();
        assert_eq!(details.name, "Token");
        assert_eq!(details.bytecode, "6001");
        assert!(details.link_references.is_empty());
    }

    #[test]
    fn test_solc_artifact() {
        let value: Value = serde_json::from_str(
            r#"{"abi":[],"evm":{"bytecode":{"object":"6002","linkReferences":{}}}}"#,
        )
        .unwrap();
        let details = ContractDetails::from_artifact("Lib", Path::new("Lib.json"), &value).unwrap();
        assert_eq!(details.bytecode, "6002");
    }

    #[test]
    fn test_missing_abi() {
        let value: Value = serde_json::from_str(r#"{"bytecode":"0x"}"#).unwrap();
        assert!(matches!(
            ContractDetails::from_artifact("X", Path::new("X.json"), &value),
            Err(ArtifactError::MissingAbi(_))
        ));
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ContractRegistry::default();
        assert!(registry.is_empty());
        registry.insert(ContractDetails {
            name: "Math".to_string(),
            abi: Arc::new(ContractAbi::default()),
            bytecode: String::new(),
            link_references: Vec::new(),
        });
        assert!(!registry.is_empty());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("Math").is_some());
        assert!(registry.get("Other").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Math"]);
    }
}
