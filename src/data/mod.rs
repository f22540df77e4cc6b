pub mod abi;
pub mod artifacts;
pub mod backend;
pub mod chains;
pub mod decoder;
pub mod provider;
pub mod tx_execution;
pub mod tx_format;
pub mod types;

use std::sync::Arc;

use alloy::primitives::Address;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::components::confirm_dialog::DialogConfirmer;
use crate::data::abi::AbiResolver;
use crate::data::artifacts::ContractRegistry;
use crate::data::backend::Backend;
use crate::data::types::ExecutionContext;
use crate::events::{AppEvent, InstanceId, LogSink};
use crate::invocation::{self, CallTarget, InvocationContext, InvocationOutcome, InvocationState};
use crate::utils;

/// Runs invocations and instance lookups off the UI task and reports back
/// through `AppEvent`s.
pub struct DappService {
    ctx: InvocationContext,
    abi_resolver: Arc<AbiResolver>,
    event_tx: mpsc::UnboundedSender<AppEvent>,
}

impl DappService {
    pub fn new(
        backend: Arc<dyn Backend>,
        registry: ContractRegistry,
        etherscan_api_key: Option<String>,
        event_tx: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let ctx = InvocationContext::new(
            backend,
            Arc::new(DialogConfirmer::new(event_tx.clone())),
            Arc::new(registry),
            LogSink::new(event_tx.clone()),
        );
        Self {
            ctx,
            abi_resolver: Arc::new(AbiResolver::new(etherscan_api_key)),
            event_tx,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        self.ctx.backend.context()
    }

    /// Run one function of an instance. Progress and the final outcome are
    /// tagged with the instance and function index.
    pub fn invoke(&self, instance: InstanceId, function: usize, target: CallTarget, args: Vec<String>) {
        let ctx = self.ctx.clone();
        let tx = self.event_tx.clone();

        tokio::spawn(async move {
            let progress_tx = tx.clone();
            let progress = move |state: InvocationState| {
                let _ = progress_tx.send(AppEvent::InvocationProgress {
                    instance,
                    function,
                    state,
                });
            };
            let outcome = invocation::run_call(&ctx, &target, &args, &progress).await;
            let _ = tx.send(AppEvent::InvocationFinished {
                instance,
                function,
                outcome,
            });
        });
    }

    /// Deploy a loaded contract and render the new instance.
    pub fn deploy(&self, name: String, args: Vec<String>) {
        let ctx = self.ctx.clone();
        let tx = self.event_tx.clone();

        tokio::spawn(async move {
            let progress = |state: InvocationState| debug!(contract = %name, state = state.label(), "deploy");
            if let Ok(InvocationOutcome::Deployed { address }) =
                invocation::run_deploy(&ctx, &name, &args, &progress).await
            {
                if let Some(contract) = ctx.registry.get(&name) {
                    let _ = tx.send(AppEvent::InstanceReady {
                        name: name.clone(),
                        address,
                        abi: Arc::clone(&contract.abi),
                    });
                }
            }
        });
    }

    /// Attach a loaded contract at an existing address.
    pub fn attach(&self, name: &str, address: Address) {
        match self.ctx.registry.get(name) {
            Some(contract) => {
                let _ = self.event_tx.send(AppEvent::InstanceReady {
                    name: contract.name.clone(),
                    address,
                    abi: Arc::clone(&contract.abi),
                });
            }
            None => {
                let _ = self
                    .event_tx
                    .send(AppEvent::Error(format!("contract {name} is not loaded")));
            }
        }
    }

    /// Attach an address whose ABI is looked up on Sourcify or Etherscan.
    pub fn attach_remote(&self, address: Address) {
        let resolver = Arc::clone(&self.abi_resolver);
        let chain_id = self.context().chain_id;
        let log = self.ctx.log.clone();
        let tx = self.event_tx.clone();

        tokio::spawn(async move {
            let shown = utils::shorten_address(&address);
            match resolver.resolve(chain_id, address).await {
                Some(resolved) => {
                    info!(%address, source = %resolved.source, "attached remote contract");
                    log.log(format!("ABI of {shown} loaded from {}", resolved.source));
                    let _ = tx.send(AppEvent::InstanceReady {
                        name: resolved.name.unwrap_or_else(|| "Contract".to_string()),
                        address,
                        abi: Arc::new(resolved.abi),
                    });
                }
                None => {
                    let _ = tx.send(AppEvent::Error(format!("No verified ABI found for {shown}")));
                }
            }
        });
    }
}
