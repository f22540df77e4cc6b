use alloy::primitives::{Address, B256, Bytes, TxKind, U256, U64};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, TransactionInput, TransactionReceipt, TransactionRequest};
use color_eyre::eyre::{eyre, Result};
use serde::Deserialize;

/// Outcome of an `eth_call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutput {
    Returned(Bytes),
    /// The node reported a revert; carries the revert data when available.
    Reverted(Bytes),
}

/// The concrete provider type returned by `ProviderBuilder::new().on_http(url)`.
/// We use a trait-object-based wrapper to avoid spelling out the full generic type.
pub struct EthProvider {
    provider: Box<dyn Provider + Send + Sync>,
    chain_id: u64,
}

impl EthProvider {
    /// Connect to an Ethereum node via HTTP RPC.
    pub async fn connect(rpc_url: &str) -> Result<Self> {
        let url = rpc_url.parse()?;
        let provider = ProviderBuilder::new().on_http(url);
        let chain_id = provider.get_chain_id().await?;
        Ok(Self {
            provider: Box::new(provider),
            chain_id,
        })
    }

    /// Return the chain ID obtained at connection time.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Query the chain ID again, in case the node switched networks.
    pub async fn get_chain_id(&self) -> Result<u64> {
        let chain_id = self.provider.get_chain_id().await?;
        Ok(chain_id)
    }

    /// Accounts unlocked on the node, used as transaction senders.
    pub async fn get_accounts(&self) -> Result<Vec<Address>> {
        let accounts = self.provider.get_accounts().await?;
        Ok(accounts)
    }

    /// Get the current gas price in wei.
    pub async fn get_gas_price(&self) -> Result<u128> {
        let price = self.provider.get_gas_price().await?;
        Ok(price)
    }

    /// Execute a read-only call against the latest block.
    pub async fn call(&self, request: &TransactionRequest) -> Result<CallOutput> {
        let result: alloy::transports::TransportResult<Bytes> = self
            .provider
            .client()
            .request("eth_call", (request.clone(), BlockNumberOrTag::Latest))
            .await;
        match result {
            Ok(data) => Ok(CallOutput::Returned(data)),
            Err(err) => match err.as_error_resp() {
                Some(payload) if payload.message.contains("revert") || payload.as_revert_data().is_some() => {
                    Ok(CallOutput::Reverted(payload.as_revert_data().unwrap_or_default()))
                }
                _ => Err(eyre!(err)),
            },
        }
    }

    /// Estimate the gas a transaction would consume.
    pub async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64> {
        let gas: U64 = self
            .provider
            .client()
            .request("eth_estimateGas", (request.clone(),))
            .await?;
        Ok(gas.to::<u64>())
    }

    /// Gas limit of a mined transaction, `None` when the node does not know it.
    pub async fn get_transaction_gas(&self, hash: B256) -> Result<Option<u64>> {
        #[derive(Debug, Deserialize)]
        struct GasField {
            gas: U64,
        }

        let tx: Option<GasField> = self
            .provider
            .client()
            .request("eth_getTransactionByHash", (hash,))
            .await?;
        Ok(tx.map(|tx| tx.gas.to::<u64>()))
    }

    /// Submit a transaction signed by the node and wait for its receipt.
    pub async fn send_transaction(&self, request: TransactionRequest) -> Result<TransactionReceipt> {
        let pending = self.provider.send_transaction(request).await?;
        let receipt = pending.get_receipt().await?;
        Ok(receipt)
    }
}

/// Build a request for a call (`to = Some`) or a contract creation (`to = None`).
pub fn transaction_request(
    from: Address,
    to: Option<Address>,
    data: Bytes,
    value: U256,
    gas_price: Option<U256>,
) -> TransactionRequest {
    TransactionRequest {
        from: Some(from),
        to: Some(to.map(TxKind::Call).unwrap_or(TxKind::Create)),
        input: TransactionInput::new(data),
        value: Some(value),
        gas_price: gas_price.map(|p| p.saturating_to::<u128>()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_request() {
        let to = Address::repeat_byte(0x22);
        let req = transaction_request(Address::ZERO, Some(to), Bytes::from(vec![1, 2]), U256::ZERO, None);
        assert_eq!(req.to, Some(TxKind::Call(to)));
        assert_eq!(req.from, Some(Address::ZERO));
        assert!(req.gas_price.is_none());
    }

    #[test]
    fn test_create_request_with_gas_price() {
        let req = transaction_request(
            Address::ZERO,
            None,
            Bytes::new(),
            U256::ZERO,
            Some(U256::from(20_000_000_000u64)),
        );
        assert_eq!(req.to, Some(TxKind::Create));
        assert_eq!(req.gas_price, Some(20_000_000_000u128));
    }
}
