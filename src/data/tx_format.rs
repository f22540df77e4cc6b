use alloy::dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier};
use alloy::json_abi::Param;
use alloy::primitives::{hex, Address, Bytes, U256};
use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::debug;

use crate::data::abi::FunctionDescriptor;
use crate::data::artifacts::{ContractDetails, ContractRegistry, LinkReference};
use crate::data::types::TxData;
use crate::events::LogSink;
use crate::invocation::InvocationError;

/// Libraries can link against other libraries; bail out on cycles.
const MAX_LINK_DEPTH: usize = 8;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("expected {expected} argument(s), got {got}")]
    ArgumentCount { expected: usize, got: usize },
    #[error("unsupported type '{ty}': {reason}")]
    UnsupportedType { ty: String, reason: String },
    #[error("invalid value for {name} ({ty}): {reason}")]
    InvalidArgument {
        name: String,
        ty: String,
        reason: String,
    },
    #[error("fallback data is not valid hex: {0}")]
    InvalidFallbackData(String),
    #[error("library {0} not found in the loaded contracts")]
    MissingLibrary(String),
    #[error("deploying library {library} failed: {source}")]
    LibraryDeploy {
        library: String,
        #[source]
        source: InvocationError,
    },
    #[error("bytecode of {0} is not fully linked")]
    Unlinked(String),
    #[error("link reference of {library} is out of range")]
    LinkOutOfRange { library: String },
    #[error("library link depth exceeded while linking {0}")]
    LinkDepth(String),
    #[error("{0} has no deployable bytecode")]
    NoBytecode(String),
    #[error("abi encoding failed: {0}")]
    Encode(String),
}

/// Deploys a library needed while linking a contract's bytecode.
#[async_trait]
pub trait LibraryDeployer: Send + Sync {
    /// Address of a library already deployed in this session.
    fn deployed_library(&self, name: &str) -> Option<Address>;

    /// Deploy already-linked library bytecode and return the new address.
    async fn deploy_library(&self, name: &str, bytecode: Bytes) -> Result<Address, InvocationError>;
}

/// What the call data is being built for.
#[derive(Debug, Clone, Copy)]
pub enum BuildTarget<'a> {
    Function {
        address: Address,
        func: &'a FunctionDescriptor,
    },
    Constructor(&'a ContractDetails),
}

#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub contract_name: &'a str,
    pub target: BuildTarget<'a>,
    pub args: &'a [String],
}

/// Split a comma separated argument line, keeping commas inside brackets,
/// parentheses and double quotes.
pub fn parse_arg_list(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '[' | '(' if !in_quotes => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' if !in_quotes => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if !in_quotes && depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if !current.trim().is_empty() || !args.is_empty() {
        args.push(current.trim().to_string());
    }
    args
}

/// Build the transaction data for a function call or a contract creation.
///
/// Constructors are linked first: every library referenced by the bytecode
/// is deployed through `deployer`, and progress goes to `log`.
pub async fn build_data(
    request: BuildRequest<'_>,
    registry: &ContractRegistry,
    deployer: &dyn LibraryDeployer,
    log: &LogSink,
) -> Result<TxData, EncodeError> {
    match request.target {
        BuildTarget::Function { address, func } => {
            encode_function_call(request.contract_name, address, func, request.args)
        }
        BuildTarget::Constructor(contract) => {
            let mut code = linked_bytecode(contract, registry, deployer, log, 0)
                .await?
                .to_vec();
            let signature = match contract.abi.constructor() {
                Some(ctor) => {
                    let values = coerce_args(&ctor.inputs, request.args)?;
                    let encoded = ctor
                        .abi_encode_input(&values)
                        .map_err(|e| EncodeError::Encode(e.to_string()))?;
                    code.extend_from_slice(&encoded);
                    let types: Vec<_> = ctor.inputs.iter().map(|p| p.selector_type()).collect();
                    format!("constructor({})", types.join(","))
                }
                None => {
                    if !request.args.is_empty() {
                        return Err(EncodeError::ArgumentCount {
                            expected: 0,
                            got: request.args.len(),
                        });
                    }
                    "constructor()".to_string()
                }
            };
            Ok(TxData {
                to: None,
                data: Bytes::from(code),
                value: U256::ZERO,
                contract_name: request.contract_name.to_string(),
                signature,
            })
        }
    }
}

/// Selector plus encoded arguments; the fallback takes raw hex call data.
pub fn encode_function_call(
    contract_name: &str,
    address: Address,
    func: &FunctionDescriptor,
    args: &[String],
) -> Result<TxData, EncodeError> {
    let data = match func.function() {
        Some(function) => {
            let values = coerce_args(&function.inputs, args)?;
            let encoded = function
                .abi_encode_input(&values)
                .map_err(|e| EncodeError::Encode(e.to_string()))?;
            Bytes::from(encoded)
        }
        None => {
            let raw = args.first().map(|s| s.trim()).unwrap_or_default();
            if raw.is_empty() {
                Bytes::new()
            } else {
                hex::decode(raw)
                    .map(Bytes::from)
                    .map_err(|e| EncodeError::InvalidFallbackData(e.to_string()))?
            }
        }
    };

    debug!(contract = contract_name, signature = %func.signature(), len = data.len(), "encoded call");

    Ok(TxData {
        to: Some(address),
        data,
        value: U256::ZERO,
        contract_name: contract_name.to_string(),
        signature: func.signature(),
    })
}

fn coerce_args(params: &[Param], args: &[String]) -> Result<Vec<DynSolValue>, EncodeError> {
    if params.len() != args.len() {
        return Err(EncodeError::ArgumentCount {
            expected: params.len(),
            got: args.len(),
        });
    }

    params
        .iter()
        .zip(args.iter())
        .map(|(param, arg)| {
            let ty: DynSolType = param.resolve().map_err(|e| EncodeError::UnsupportedType {
                ty: param.ty.clone(),
                reason: e.to_string(),
            })?;
            let text = match &ty {
                DynSolType::String => strip_quotes(arg.trim()),
                _ => arg.trim(),
            };
            ty.coerce_str(text).map_err(|e| EncodeError::InvalidArgument {
                name: param.name.clone(),
                ty: param.selector_type().into_owned(),
                reason: e.to_string(),
            })
        })
        .collect()
}

fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

fn linked_bytecode<'a>(
    contract: &'a ContractDetails,
    registry: &'a ContractRegistry,
    deployer: &'a dyn LibraryDeployer,
    log: &'a LogSink,
    depth: usize,
) -> BoxFuture<'a, Result<Bytes, EncodeError>> {
    Box::pin(async move {
        if depth > MAX_LINK_DEPTH {
            return Err(EncodeError::LinkDepth(contract.name.clone()));
        }
        if contract.bytecode.is_empty() {
            return Err(EncodeError::NoBytecode(contract.name.clone()));
        }

        let mut code = contract.bytecode.clone();
        for reference in &contract.link_references {
            let library = registry
                .get(&reference.library)
                .ok_or_else(|| EncodeError::MissingLibrary(reference.library.clone()))?;

            let address = match deployer.deployed_library(&library.name) {
                Some(address) => {
                    debug!(library = %library.name, %address, "reusing deployed library");
                    address
                }
                None => {
                    log.log(format!("deploying library {}", library.name));
                    let library_code = linked_bytecode(library, registry, deployer, log, depth + 1).await?;
                    let address = deployer
                        .deploy_library(&library.name, library_code)
                        .await
                        .map_err(|source| EncodeError::LibraryDeploy {
                            library: library.name.clone(),
                            source,
                        })?;
                    log.log(format!(
                        "library {} deployed at {}",
                        library.name,
                        crate::utils::format_address(&address)
                    ));
                    address
                }
            };

            code = link_bytecode(&code, reference, &address)?;
        }

        hex::decode(&code)
            .map(Bytes::from)
            .map_err(|_| EncodeError::Unlinked(contract.name.clone()))
    })
}

/// Write `address` over every placeholder of `reference` in the hex bytecode.
pub fn link_bytecode(
    bytecode: &str,
    reference: &LinkReference,
    address: &Address,
) -> Result<String, EncodeError> {
    let address_hex = hex::encode(address.as_slice());
    let mut code = bytecode.to_string();

    for &(start, length) in &reference.offsets {
        let from = start * 2;
        let to = from + length * 2;
        if length != 20 || to > code.len() || !code.is_char_boundary(from) || !code.is_char_boundary(to) {
            return Err(EncodeError::LinkOutOfRange {
                library: reference.library.clone(),
            });
        }
        code.replace_range(from..to, &address_hex);
    }

    Ok(code)
}
