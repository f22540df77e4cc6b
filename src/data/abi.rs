use std::num::NonZeroUsize;
use std::sync::Mutex;

use alloy::json_abi::{Constructor, Function};
use alloy::primitives::Address;
use lru::LruCache;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum AbiError {
    #[error("ABI must be a JSON array")]
    NotAnArray,
    #[error("invalid ABI entry `{name}`: {source}")]
    InvalidEntry {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid ABI JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// How an invocation reaches the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `view`/`pure` function, executed with `eth_call`.
    ReadCall,
    /// State-changing function.
    Transaction,
    /// Raw call data sent to the fallback function.
    Fallback,
    /// Library deployed while linking call data.
    LibraryDeploy,
    /// Constructor of a contract from the registry.
    Deploy,
}

impl CallKind {
    pub fn is_read_only(self) -> bool {
        matches!(self, CallKind::ReadCall)
    }
}

/// A callable ABI entry: a named function or the fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDescriptor {
    pub name: Option<String>,
    pub inputs: Vec<(String, String)>,  // (param_name, param_type)
    pub outputs: Vec<(String, String)>, // (param_name, param_type)
    pub constant: bool,
    pub payable: bool,
    function: Option<Function>,
}

impl FunctionDescriptor {
    fn from_function(function: Function, constant: bool) -> Self {
        let params = |ps: &[alloy::json_abi::Param]| {
            ps.iter()
                .map(|p| (p.name.clone(), p.selector_type().into_owned()))
                .collect::<Vec<_>>()
        };
        Self {
            name: Some(function.name.clone()),
            inputs: params(&function.inputs),
            outputs: params(&function.outputs),
            constant,
            payable: function.state_mutability == alloy::json_abi::StateMutability::Payable,
            function: Some(function),
        }
    }

    fn fallback(payable: bool) -> Self {
        Self {
            name: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            constant: false,
            payable,
            function: None,
        }
    }

    pub fn kind(&self) -> CallKind {
        match &self.function {
            None => CallKind::Fallback,
            Some(_) if self.constant => CallKind::ReadCall,
            Some(_) => CallKind::Transaction,
        }
    }

    /// Name used in log messages and button labels.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(fallback)")
    }

    /// Parameter list as typed by the user, e.g. `address to, uint256 amount`.
    pub fn inputs_signature(&self) -> String {
        self.inputs
            .iter()
            .map(|(name, ty)| {
                if name.is_empty() {
                    ty.clone()
                } else {
                    format!("{ty} {name}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Canonical signature, `name(type,...)`, or `()` for the fallback.
    pub fn signature(&self) -> String {
        match &self.function {
            Some(f) => f.signature(),
            None => "()".to_string(),
        }
    }

    pub fn function(&self) -> Option<&Function> {
        self.function.as_ref()
    }
}

/// Contract ABI with entry order preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractAbi {
    functions: Vec<FunctionDescriptor>,
    fallback: Option<FunctionDescriptor>,
    constructor: Option<Constructor>,
}

impl ContractAbi {
    pub fn from_json_str(s: &str) -> Result<Self, AbiError> {
        let value: Value = serde_json::from_str(s)?;
        Self::parse(&value)
    }

    /// Walk the raw ABI array in order. Events, errors and `receive` are skipped.
    pub fn parse(value: &Value) -> Result<Self, AbiError> {
        let entries = value.as_array().ok_or(AbiError::NotAnArray)?;
        let mut abi = ContractAbi::default();

        for entry in entries {
            let kind = entry.get("type").and_then(Value::as_str).unwrap_or("function");
            match kind {
                "function" => {
                    let constant = is_constant(entry);
                    let normalized = normalize_entry(entry);
                    let function: Function =
                        serde_json::from_value(normalized).map_err(|source| {
                            AbiError::InvalidEntry {
                                name: entry_name(entry),
                                source,
                            }
                        })?;
                    abi.functions
                        .push(FunctionDescriptor::from_function(function, constant));
                }
                "fallback" => {
                    abi.fallback = Some(FunctionDescriptor::fallback(is_payable(entry)));
                }
                "constructor" => {
                    let constructor: Constructor = serde_json::from_value(normalize_entry(entry))
                        .map_err(|source| AbiError::InvalidEntry {
                            name: "constructor".to_string(),
                            source,
                        })?;
                    abi.constructor = Some(constructor);
                }
                _ => {}
            }
        }

        Ok(abi)
    }

    pub fn functions(&self) -> &[FunctionDescriptor] {
        &self.functions
    }

    pub fn fallback(&self) -> Option<&FunctionDescriptor> {
        self.fallback.as_ref()
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    /// Every entry that gets a call control: the fallback first, then functions in ABI order.
    pub fn callables(&self) -> Vec<FunctionDescriptor> {
        self.fallback()
            .into_iter()
            .chain(self.functions())
            .cloned()
            .collect()
    }
}

fn entry_name(entry: &Value) -> String {
    entry
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>")
        .to_string()
}

fn state_mutability(entry: &Value) -> Option<&str> {
    entry.get("stateMutability").and_then(Value::as_str)
}

fn is_constant(entry: &Value) -> bool {
    let legacy = entry.get("constant").and_then(Value::as_bool).unwrap_or(false);
    legacy || matches!(state_mutability(entry), Some("view" | "pure"))
}

fn is_payable(entry: &Value) -> bool {
    let legacy = entry.get("payable").and_then(Value::as_bool).unwrap_or(false);
    legacy || state_mutability(entry) == Some("payable")
}

/// Fill in fields that pre-0.5 compilers omit so alloy's deserializer accepts the entry.
fn normalize_entry(entry: &Value) -> Value {
    let mut normalized = entry.clone();
    if let Some(obj) = normalized.as_object_mut() {
        if !obj.contains_key("stateMutability") {
            let mutability = if is_constant(entry) {
                "view"
            } else if is_payable(entry) {
                "payable"
            } else {
                "nonpayable"
            };
            obj.insert("stateMutability".into(), Value::from(mutability));
        }
        obj.entry("inputs").or_insert_with(|| Value::Array(Vec::new()));
        if obj.get("type").and_then(Value::as_str) != Some("constructor") {
            obj.entry("outputs").or_insert_with(|| Value::Array(Vec::new()));
        }
    }
    normalized
}

/// A resolved ABI along with the source it was obtained from.
#[derive(Debug, Clone)]
pub struct ResolvedAbi {
    pub abi: ContractAbi,
    /// Contract name, when the source records one.
    pub name: Option<String>,
    pub source: String,
}

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    result: String,
}

/// Resolves the ABI of an attached address with no local artifact:
/// Sourcify first, then Etherscan when an API key is configured.
pub struct AbiResolver {
    client: reqwest::Client,
    etherscan_api_key: Option<String>,
    cache: Mutex<LruCache<(u64, Address), ResolvedAbi>>,
}

impl AbiResolver {
    pub fn new(etherscan_api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            etherscan_api_key,
            cache: Mutex::new(LruCache::new(NonZeroUsize::MIN.saturating_add(63))),
        }
    }

    pub async fn resolve(&self, chain_id: u64, address: Address) -> Option<ResolvedAbi> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&(chain_id, address)) {
                debug!(%address, "ABI cache hit");
                return Some(cached.clone());
            }
        }

        let resolved = match self.try_sourcify(chain_id, address).await {
            Some(r) => r,
            None => self.try_etherscan(address).await?,
        };
        info!(%address, source = %resolved.source, "resolved ABI");

        if let Ok(mut cache) = self.cache.lock() {
            cache.put((chain_id, address), resolved.clone());
        }
        Some(resolved)
    }

    /// GET https://repo.sourcify.dev/contracts/full_match/{chainId}/{address}/metadata.json
    async fn try_sourcify(&self, chain_id: u64, address: Address) -> Option<ResolvedAbi> {
        let url = format!(
            "https://repo.sourcify.dev/contracts/full_match/{chain_id}/{address}/metadata.json"
        );

        let response = self.client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }

        let body: Value = response.json().await.ok()?;
        let abi = ContractAbi::parse(body.get("output")?.get("abi")?).ok()?;
        let name = body
            .pointer("/settings/compilationTarget")
            .and_then(Value::as_object)
            .and_then(|targets| targets.values().next())
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(ResolvedAbi {
            abi,
            name,
            source: "Sourcify".to_string(),
        })
    }

    /// GET https://api.etherscan.io/api?module=contract&action=getabi&address={address}&apikey={key}
    async fn try_etherscan(&self, address: Address) -> Option<ResolvedAbi> {
        let api_key = self.etherscan_api_key.as_ref()?;

        let url = format!(
            "https://api.etherscan.io/api?module=contract&action=getabi&address={address}&apikey={api_key}"
        );

        let response = self.client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }

        let body: EtherscanResponse = response.json().await.ok()?;
        if body.status != "1" {
            return None;
        }

        // The ABI comes back as a JSON string inside "result"
        let abi = ContractAbi::from_json_str(&body.result).ok()?;

        Some(ResolvedAbi {
            abi,
            name: None,
            source: "Etherscan".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN_ABI: &str = r#"[
        {"type":"constructor","inputs":[{"name":"supply","type":"uint256"}],"stateMutability":"nonpayable"},
        {"type":"function","name":"transfer","inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}],"stateMutability":"nonpayable"},
        {"type":"event","name":"Transfer","inputs":[{"name":"from","type":"address","indexed":true}],"anonymous":false},
        {"type":"function","name":"balanceOf","inputs":[{"name":"owner","type":"address"}],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
        {"type":"fallback","stateMutability":"payable"}
    ]"#;

    #[test]
    fn test_parse_preserves_order() {
        let abi = ContractAbi::from_json_str(TOKEN_ABI).unwrap();
        let names: Vec<_> = abi.functions().iter().map(|f| f.display_name()).collect();
        assert_eq!(names, vec!["transfer", "balanceOf"]);
    }

    #[test]
    fn test_callables_put_fallback_first() {
        let abi = ContractAbi::from_json_str(TOKEN_ABI).unwrap();
        let callables = abi.callables();
        assert_eq!(callables.len(), 3);
        assert_eq!(callables[0].kind(), CallKind::Fallback);
        assert_eq!(callables[0].display_name(), "(fallback)");
        assert!(callables[0].payable);
    }

    #[test]
    fn test_kinds() {
        let abi = ContractAbi::from_json_str(TOKEN_ABI).unwrap();
        assert_eq!(abi.functions()[0].kind(), CallKind::Transaction);
        assert_eq!(abi.functions()[1].kind(), CallKind::ReadCall);
        assert!(abi.constructor().is_some());
    }

    #[test]
    fn test_legacy_constant_flag() {
        let abi = ContractAbi::from_json_str(
            r#"[{"constant":true,"name":"get","inputs":[],"outputs":[{"name":"","type":"uint256"}],"payable":false,"type":"function"}]"#,
        )
        .unwrap();
        assert!(abi.functions()[0].constant);
        assert_eq!(abi.functions()[0].kind(), CallKind::ReadCall);
    }

    #[test]
    fn test_inputs_signature() {
        let abi = ContractAbi::from_json_str(TOKEN_ABI).unwrap();
        assert_eq!(abi.functions()[0].inputs_signature(), "address to, uint256 amount");
        assert_eq!(abi.functions()[0].signature(), "transfer(address,uint256)");
    }

    #[test]
    fn test_empty_abi() {
        let abi = ContractAbi::from_json_str("[]").unwrap();
        assert!(abi.callables().is_empty());
        assert!(abi.fallback().is_none());
    }

    #[test]
    fn test_not_an_array() {
        assert!(matches!(
            ContractAbi::from_json_str("{}"),
            Err(AbiError::NotAnArray)
        ));
    }
}
