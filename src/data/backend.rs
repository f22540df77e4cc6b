use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::data::abi::FunctionDescriptor;
use crate::data::chains;
use crate::data::provider::{transaction_request, CallOutput, EthProvider};
use crate::data::tx_execution::failure_status;
use crate::data::types::{ExecStatus, ExecutionContext, Network, TxData, TxResult};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    Rpc(String),
    #[error("execution reverted")]
    Reverted,
    #[error("no account available to send transactions")]
    NoAccount,
}

impl BackendError {
    fn rpc(err: impl std::fmt::Display) -> Self {
        BackendError::Rpc(err.to_string())
    }
}

/// Execution backend the instance panel drives.
#[async_trait]
pub trait Backend: Send + Sync {
    fn context(&self) -> &ExecutionContext;

    /// Whether results come from a local simulated VM, which enables VM-error checks.
    fn simulates_vm(&self) -> bool {
        self.context().simulates_vm
    }

    async fn network(&self) -> Result<Network, BackendError>;

    /// Current network gas price in wei.
    async fn gas_price(&self) -> Result<U256, BackendError>;

    async fn estimate_gas(&self, tx: &TxData) -> Result<u64, BackendError>;

    /// Execute `func` on `address`: an `eth_call` for constant functions,
    /// a transaction otherwise.
    async fn call_function(
        &self,
        address: Address,
        tx: &TxData,
        func: &FunctionDescriptor,
        gas_price: Option<U256>,
    ) -> Result<TxResult, BackendError>;

    /// Send a transaction (contract creation when `tx.to` is `None`).
    async fn run_tx(&self, tx: &TxData, gas_price: Option<U256>) -> Result<TxResult, BackendError>;
}

/// Backend talking JSON-RPC to a node that signs with its own unlocked accounts.
pub struct RpcBackend {
    provider: EthProvider,
    context: ExecutionContext,
}

impl RpcBackend {
    /// Build the execution context from the connected node.
    ///
    /// The sender defaults to the node's first account; the VM capability is
    /// on for local development chains or when forced.
    pub async fn new(
        provider: EthProvider,
        rpc_url: &str,
        from: Option<Address>,
        force_vm: bool,
    ) -> Result<Self, BackendError> {
        let chain_id = provider.chain_id();
        let from = match from {
            Some(from) => from,
            None => provider
                .get_accounts()
                .await
                .map_err(BackendError::rpc)?
                .first()
                .copied()
                .unwrap_or(Address::ZERO),
        };
        let context = ExecutionContext {
            rpc_url: rpc_url.to_string(),
            chain_id,
            from,
            simulates_vm: force_vm || chains::is_local_dev_chain(chain_id),
        };
        info!(chain_id, from = %from, vm = context.simulates_vm, "backend ready");
        Ok(Self { provider, context })
    }

    fn sender(&self) -> Result<Address, BackendError> {
        if self.context.from.is_zero() {
            return Err(BackendError::NoAccount);
        }
        Ok(self.context.from)
    }
}

#[async_trait]
impl Backend for RpcBackend {
    fn context(&self) -> &ExecutionContext {
        &self.context
    }

    async fn network(&self) -> Result<Network, BackendError> {
        let chain_id = self.provider.get_chain_id().await.map_err(BackendError::rpc)?;
        Ok(Network::from_chain_id(chain_id))
    }

    async fn gas_price(&self) -> Result<U256, BackendError> {
        let price = self.provider.get_gas_price().await.map_err(BackendError::rpc)?;
        Ok(U256::from(price))
    }

    async fn estimate_gas(&self, tx: &TxData) -> Result<u64, BackendError> {
        let request = transaction_request(self.context.from, tx.to, tx.data.clone(), tx.value, None);
        self.provider
            .estimate_gas(&request)
            .await
            .map_err(BackendError::rpc)
    }

    async fn call_function(
        &self,
        address: Address,
        tx: &TxData,
        func: &FunctionDescriptor,
        gas_price: Option<U256>,
    ) -> Result<TxResult, BackendError> {
        if !func.constant {
            let mut tx = tx.clone();
            tx.to = Some(address);
            return self.run_tx(&tx, gas_price).await;
        }

        let request = transaction_request(self.context.from, Some(address), tx.data.clone(), tx.value, None);
        debug!(signature = %tx.signature, "eth_call");
        match self.provider.call(&request).await.map_err(BackendError::rpc)? {
            CallOutput::Returned(data) => Ok(TxResult::call_output(data)),
            CallOutput::Reverted(data) if self.simulates_vm() => Ok(TxResult {
                status: ExecStatus::Reverted(data),
                ..TxResult::call_output(Bytes::new())
            }),
            CallOutput::Reverted(_) => Err(BackendError::Reverted),
        }
    }

    async fn run_tx(&self, tx: &TxData, gas_price: Option<U256>) -> Result<TxResult, BackendError> {
        let from = self.sender()?;
        let request = transaction_request(from, tx.to, tx.data.clone(), tx.value, gas_price);
        debug!(signature = %tx.signature, "eth_sendTransaction");
        let receipt = self
            .provider
            .send_transaction(request.clone())
            .await
            .map_err(BackendError::rpc)?;

        let status = if receipt.status() {
            ExecStatus::Success
        } else if self.simulates_vm() {
            // Replay as a call to recover the revert data or the halt reason
            let replay = self.provider.call(&request).await.map_err(|e| e.to_string());
            let gas_limit = match self.provider.get_transaction_gas(receipt.transaction_hash).await {
                Ok(limit) => limit,
                Err(e) => {
                    debug!(error = %e, "gas limit of failed transaction unavailable");
                    None
                }
            };
            failure_status(receipt.gas_used, gas_limit, replay)
        } else {
            ExecStatus::Reverted(Bytes::new())
        };

        Ok(TxResult {
            tx_hash: Some(receipt.transaction_hash),
            return_data: Bytes::new(),
            status,
            contract_address: receipt.contract_address,
            gas_used: Some(receipt.gas_used),
        })
    }
}
