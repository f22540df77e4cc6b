//! Sequencing of one call, transaction or deployment:
//! encode, confirm when needed, submit, then decode or report status.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::data::abi::{CallKind, FunctionDescriptor};
use crate::data::artifacts::ContractRegistry;
use crate::data::backend::Backend;
use crate::data::decoder::decode_response;
use crate::data::tx_execution::check_vm_error;
use crate::data::tx_format::{self, BuildRequest, BuildTarget, EncodeError, LibraryDeployer};
use crate::data::types::{DisplayNode, ExecStatus, Network, TxData, TxResult};
use crate::events::LogSink;
use crate::utils;

const GAS_PRICE_WARNING: &str = " Please fix this issue before sending any transaction. ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Idle,
    Encoding,
    EncodingFailed,
    Confirming,
    Confirmed,
    Cancelled,
    Submitting,
    Succeeded,
    Failed,
}

impl InvocationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InvocationState::EncodingFailed
                | InvocationState::Cancelled
                | InvocationState::Succeeded
                | InvocationState::Failed
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            InvocationState::Idle => "idle",
            InvocationState::Encoding => "encoding",
            InvocationState::EncodingFailed => "encoding failed",
            InvocationState::Confirming => "waiting for confirmation",
            InvocationState::Confirmed => "confirmed",
            InvocationState::Cancelled => "cancelled",
            InvocationState::Submitting => "pending",
            InvocationState::Succeeded => "done",
            InvocationState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Encode,
    EncodeFailed,
    NeedsConfirmation,
    SkipConfirmation,
    Accept,
    Cancel,
    Submit,
    Succeed,
    Fail,
}

#[derive(Debug, Error)]
#[error("illegal invocation transition: {from:?} -> {step:?}")]
pub struct IllegalTransition {
    pub from: InvocationState,
    pub step: Step,
}

pub fn transition(from: InvocationState, step: Step) -> Result<InvocationState, IllegalTransition> {
    use InvocationState::*;

    let to = match (from, step) {
        (Idle, Step::Encode) => Encoding,
        (Encoding, Step::EncodeFailed) => EncodingFailed,
        (Encoding, Step::NeedsConfirmation) => Confirming,
        (Encoding, Step::SkipConfirmation) => Submitting,
        (Confirming, Step::Accept) => Confirmed,
        (Encoding | Confirming, Step::Cancel) => Cancelled,
        (Confirmed, Step::Submit) => Submitting,
        (Submitting, Step::Succeed) => Succeeded,
        (Encoding | Confirming | Confirmed | Submitting, Step::Fail) => Failed,
        _ => return Err(IllegalTransition { from, step }),
    };
    Ok(to)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("{0}")]
    Encoding(String),
    #[error("{0}")]
    NetworkQuery(String),
    #[error("{0}")]
    UserCancelled(String),
    #[error("{0}")]
    Execution(String),
    #[error("instance was removed")]
    Detached,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    /// Return value of a read-only call.
    Decoded(DisplayNode),
    /// Status text of a mined transaction.
    Transacted { tx_hash: Option<B256>, status: String },
    Deployed { address: Address },
}

/// What the confirmation dialog needs to show.
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub network: Network,
    pub from: Address,
    pub tx: TxData,
    pub gas_limit: u64,
    /// Network gas price in wei, or the warning to show when it could not be fetched.
    pub gas_price: Result<U256, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Confirmed { gas_price: U256 },
    Cancelled(String),
}

/// Asks the user to accept a transaction on the production network.
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, request: ConfirmationRequest) -> Decision;
}

/// Library addresses deployed during this session, by library name.
pub type LibraryCache = Arc<Mutex<HashMap<String, Address>>>;

/// Everything an invocation needs, passed explicitly instead of globals.
#[derive(Clone)]
pub struct InvocationContext {
    pub backend: Arc<dyn Backend>,
    pub confirmer: Arc<dyn Confirmer>,
    pub registry: Arc<ContractRegistry>,
    pub log: LogSink,
    pub libraries: LibraryCache,
}

impl InvocationContext {
    pub fn new(
        backend: Arc<dyn Backend>,
        confirmer: Arc<dyn Confirmer>,
        registry: Arc<ContractRegistry>,
        log: LogSink,
    ) -> Self {
        Self {
            backend,
            confirmer,
            registry,
            log,
            libraries: LibraryCache::default(),
        }
    }
}

/// A function of a rendered instance.
#[derive(Debug, Clone)]
pub struct CallTarget {
    pub contract_name: String,
    pub address: Address,
    pub function: FunctionDescriptor,
    /// Set when the instance is removed from the view.
    pub detached: Arc<AtomicBool>,
}

/// Receives every state the invocation enters.
pub type Progress<'a> = &'a (dyn Fn(InvocationState) + Send + Sync);

struct Tracker<'a> {
    state: InvocationState,
    progress: Progress<'a>,
}

impl<'a> Tracker<'a> {
    fn new(progress: Progress<'a>) -> Self {
        Self {
            state: InvocationState::Idle,
            progress,
        }
    }

    fn advance(&mut self, step: Step) {
        match transition(self.state, step) {
            Ok(next) => {
                self.state = next;
                (self.progress)(next);
            }
            Err(e) => warn!("{e}"),
        }
    }

    fn fail(&mut self, err: &InvocationError) {
        match err {
            InvocationError::Encoding(_) => self.advance(Step::EncodeFailed),
            InvocationError::UserCancelled(_) => self.advance(Step::Cancel),
            _ => self.advance(Step::Fail),
        }
    }
}

/// One invocation: shared steps of calls, transactions and deployments.
struct Invocation<'a> {
    ctx: &'a InvocationContext,
    detached: &'a AtomicBool,
    log_msg: String,
    tracker: Tracker<'a>,
}

impl<'a> Invocation<'a> {
    fn new(
        ctx: &'a InvocationContext,
        detached: &'a AtomicBool,
        log_msg: String,
        progress: Progress<'a>,
    ) -> Self {
        Self {
            ctx,
            detached,
            log_msg,
            tracker: Tracker::new(progress),
        }
    }

    fn ensure_attached(&self) -> Result<(), InvocationError> {
        if self.detached.load(Ordering::Acquire) {
            return Err(InvocationError::Detached);
        }
        Ok(())
    }

    /// Record a terminal error; everything but a detach goes to the terminal.
    fn abort<T>(&mut self, err: InvocationError) -> Result<T, InvocationError> {
        self.tracker.fail(&err);
        if err != InvocationError::Detached {
            self.ctx.log.log(format!("{} errored: {err} ", self.log_msg));
        } else {
            debug!("{} dropped: instance removed", self.log_msg);
        }
        Err(err)
    }

    /// Decide whether the user must confirm, and ask. Returns the accepted gas price.
    async fn confirm(&mut self, kind: CallKind, tx: &TxData) -> Result<Option<U256>, InvocationError> {
        if kind.is_read_only() {
            self.tracker.advance(Step::SkipConfirmation);
            return Ok(None);
        }

        self.ensure_attached()?;
        let backend = &self.ctx.backend;
        let network = backend
            .network()
            .await
            .map_err(|e| InvocationError::NetworkQuery(format!("Unable to retrieve the current network: {e}")))?;
        if !network.is_production() {
            self.tracker.advance(Step::SkipConfirmation);
            return Ok(None);
        }

        self.tracker.advance(Step::NeedsConfirmation);
        let gas_limit = backend
            .estimate_gas(tx)
            .await
            .map_err(|e| InvocationError::Execution(format!("gas estimation failed: {e}")))?;
        let gas_price = backend.gas_price().await.map_err(|e| {
            format!("Unable to retrieve the current network gas price.{GAS_PRICE_WARNING}{e}")
        });

        let request = ConfirmationRequest {
            network,
            from: backend.context().from,
            tx: tx.clone(),
            gas_limit,
            gas_price,
        };
        match self.ctx.confirmer.confirm(request).await {
            Decision::Confirmed { gas_price } => {
                self.tracker.advance(Step::Accept);
                self.tracker.advance(Step::Submit);
                Ok(Some(gas_price))
            }
            Decision::Cancelled(reason) => Err(InvocationError::UserCancelled(reason)),
        }
    }

    /// Fail on a VM-level halt when the backend simulates the VM.
    fn check_vm(&self, result: &TxResult) -> Result<(), InvocationError> {
        if self.ctx.backend.simulates_vm() {
            let vm = check_vm_error(result);
            if vm.error {
                return Err(InvocationError::Execution(vm.message));
            }
        }
        Ok(())
    }

    /// Confirm, send a creation transaction and return the new contract address.
    async fn create(&mut self, kind: CallKind, tx: &TxData) -> Result<Address, InvocationError> {
        let gas_price = self.confirm(kind, tx).await?;
        self.ensure_attached()?;
        let result = self
            .ctx
            .backend
            .run_tx(tx, gas_price)
            .await
            .map_err(|e| InvocationError::Execution(e.to_string()))?;
        self.check_vm(&result)?;
        result
            .contract_address
            .ok_or_else(|| InvocationError::Execution("no contract address in receipt".to_string()))
    }
}

/// Deploys libraries through the same confirm-and-submit flow as transactions.
struct SessionDeployer {
    ctx: InvocationContext,
    detached: Arc<AtomicBool>,
}

#[async_trait]
impl LibraryDeployer for SessionDeployer {
    fn deployed_library(&self, name: &str) -> Option<Address> {
        self.ctx.libraries.lock().ok()?.get(name).copied()
    }

    async fn deploy_library(&self, name: &str, bytecode: Bytes) -> Result<Address, InvocationError> {
        let tx = TxData {
            to: None,
            data: bytecode,
            value: U256::ZERO,
            contract_name: name.to_string(),
            signature: format!("library {name}"),
        };
        let ignore = |_: InvocationState| {};
        let mut invocation = Invocation::new(
            &self.ctx,
            &self.detached,
            format!("creation of library {name}"),
            &ignore,
        );
        invocation.tracker.advance(Step::Encode);
        // Errors are logged once, by the invocation that needed the library
        let address = invocation.create(CallKind::LibraryDeploy, &tx).await?;
        invocation.tracker.advance(Step::Succeed);
        if let Ok(mut libraries) = self.ctx.libraries.lock() {
            libraries.insert(name.to_string(), address);
        }
        Ok(address)
    }
}

/// Cancellations and detaches while deploying a library end the outer
/// invocation the same way; any other failure is an encoding error.
fn build_error(err: EncodeError) -> InvocationError {
    match err {
        EncodeError::LibraryDeploy {
            source: source @ (InvocationError::UserCancelled(_) | InvocationError::Detached),
            ..
        } => source,
        other => InvocationError::Encoding(other.to_string()),
    }
}

fn status_text(result: &TxResult) -> String {
    let mined = match result.status {
        ExecStatus::Success => "0x1 Transaction mined and execution succeed",
        _ => "0x0 Transaction mined but execution failed",
    };
    match result.tx_hash {
        Some(hash) => format!("{mined} ({hash})"),
        None => mined.to_string(),
    }
}

/// Run a function of an instance: a call when it is constant, a transaction otherwise.
pub async fn run_call(
    ctx: &InvocationContext,
    target: &CallTarget,
    args: &[String],
    progress: Progress<'_>,
) -> Result<InvocationOutcome, InvocationError> {
    let func = &target.function;
    let kind = func.kind();
    let verb = if kind.is_read_only() { "call to" } else { "transact to" };
    let log_msg = format!("{verb} {}.{}", target.contract_name, func.display_name());
    let mut invocation = Invocation::new(ctx, &target.detached, log_msg, progress);

    invocation.ensure_attached()?;
    invocation.tracker.advance(Step::Encode);

    let deployer = SessionDeployer {
        ctx: ctx.clone(),
        detached: Arc::clone(&target.detached),
    };
    let request = BuildRequest {
        contract_name: &target.contract_name,
        target: BuildTarget::Function {
            address: target.address,
            func,
        },
        args,
    };
    let tx = match tx_format::build_data(request, &ctx.registry, &deployer, &ctx.log).await {
        Ok(tx) => tx,
        Err(e) => return invocation.abort(build_error(e)),
    };

    if kind.is_read_only() {
        ctx.log.log(invocation.log_msg.clone());
    } else {
        ctx.log.log(format!("{} pending ... ", invocation.log_msg));
    }

    let gas_price = match invocation.confirm(kind, &tx).await {
        Ok(price) => price,
        Err(e) => return invocation.abort(e),
    };

    if let Err(e) = invocation.ensure_attached() {
        return invocation.abort(e);
    }
    let result = match ctx
        .backend
        .call_function(target.address, &tx, func, gas_price)
        .await
    {
        Ok(result) => result,
        Err(e) => return invocation.abort(InvocationError::Execution(e.to_string())),
    };
    if let Err(e) = invocation.check_vm(&result) {
        return invocation.abort(e);
    }
    invocation.tracker.advance(Step::Succeed);

    if kind.is_read_only() {
        Ok(InvocationOutcome::Decoded(decode_response(&result.return_data, func)))
    } else {
        Ok(InvocationOutcome::Transacted {
            tx_hash: result.tx_hash,
            status: status_text(&result),
        })
    }
}

/// Deploy a contract of the registry, linking its libraries first.
pub async fn run_deploy(
    ctx: &InvocationContext,
    contract_name: &str,
    args: &[String],
    progress: Progress<'_>,
) -> Result<InvocationOutcome, InvocationError> {
    // Deployments are not tied to an instance yet
    let detached = Arc::new(AtomicBool::new(false));
    let mut invocation = Invocation::new(ctx, &detached, format!("creation of {contract_name}"), progress);
    invocation.tracker.advance(Step::Encode);

    let Some(contract) = ctx.registry.get(contract_name) else {
        return invocation.abort(InvocationError::Encoding(format!(
            "contract {contract_name} is not loaded"
        )));
    };
    let deployer = SessionDeployer {
        ctx: ctx.clone(),
        detached: Arc::clone(&detached),
    };
    let request = BuildRequest {
        contract_name,
        target: BuildTarget::Constructor(contract),
        args,
    };
    let tx = match tx_format::build_data(request, &ctx.registry, &deployer, &ctx.log).await {
        Ok(tx) => tx,
        Err(e) => return invocation.abort(build_error(e)),
    };
    ctx.log.log(format!("{} pending ... ", invocation.log_msg));

    match invocation.create(CallKind::Deploy, &tx).await {
        Ok(address) => {
            invocation.tracker.advance(Step::Succeed);
            ctx.log.log(format!(
                "{contract_name} deployed at {}",
                utils::format_address(&address)
            ));
            Ok(InvocationOutcome::Deployed { address })
        }
        Err(e) => invocation.abort(e),
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::{Arc, Mutex};

    use alloy::primitives::{Address, Bytes, U256};
    use async_trait::async_trait;

    use super::{ConfirmationRequest, Confirmer, Decision};
    use crate::data::abi::FunctionDescriptor;
    use crate::data::backend::{Backend, BackendError};
    use crate::data::types::{ExecStatus, ExecutionContext, Network, TxData, TxResult};

    pub type Journal = Arc<Mutex<Vec<String>>>;

    pub struct MockBackend {
        pub context: ExecutionContext,
        pub chain_id: u64,
        pub journal: Journal,
        pub return_data: Bytes,
        pub status: ExecStatus,
        pub gas_price: Result<U256, String>,
    }

    impl MockBackend {
        pub fn new(chain_id: u64, journal: Journal) -> Self {
            Self {
                context: ExecutionContext {
                    rpc_url: "mock".to_string(),
                    chain_id,
                    from: Address::repeat_byte(0x01),
                    simulates_vm: false,
                },
                chain_id,
                journal,
                return_data: Bytes::new(),
                status: ExecStatus::Success,
                gas_price: Ok(U256::from(20_000_000_000u64)),
            }
        }

        fn record(&self, entry: &str) {
            self.journal.lock().unwrap().push(entry.to_string());
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        fn context(&self) -> &ExecutionContext {
            &self.context
        }

        async fn network(&self) -> Result<Network, BackendError> {
            self.record("network");
            Ok(Network::from_chain_id(self.chain_id))
        }

        async fn gas_price(&self) -> Result<U256, BackendError> {
            self.record("gas_price");
            self.gas_price.clone().map_err(BackendError::Rpc)
        }

        async fn estimate_gas(&self, _tx: &TxData) -> Result<u64, BackendError> {
            self.record("estimate_gas");
            Ok(21_000)
        }

        async fn call_function(
            &self,
            _address: Address,
            _tx: &TxData,
            _func: &FunctionDescriptor,
            _gas_price: Option<U256>,
        ) -> Result<TxResult, BackendError> {
            self.record("call_function");
            Ok(TxResult {
                status: self.status.clone(),
                ..TxResult::call_output(self.return_data.clone())
            })
        }

        async fn run_tx(&self, tx: &TxData, _gas_price: Option<U256>) -> Result<TxResult, BackendError> {
            self.record(&format!("run_tx {}", tx.contract_name));
            Ok(TxResult {
                contract_address: Some(Address::repeat_byte(0xcc)),
                ..TxResult::call_output(Bytes::new())
            })
        }
    }

    pub struct ScriptedConfirmer {
        pub decision: Decision,
        pub journal: Journal,
        pub requests: Mutex<Vec<ConfirmationRequest>>,
    }

    #[async_trait]
    impl Confirmer for ScriptedConfirmer {
        async fn confirm(&self, request: ConfirmationRequest) -> Decision {
            self.journal.lock().unwrap().push("confirm".to_string());
            self.requests.lock().unwrap().push(request);
            self.decision.clone()
        }
    }
}
