use alloy::primitives::{Address, Bytes, B256, U256};

/// Network the backend is currently connected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub chain_id: u64,
    pub name: String,
}

impl Network {
    pub fn from_chain_id(chain_id: u64) -> Self {
        Self {
            chain_id,
            name: crate::data::chains::network_name(chain_id).to_string(),
        }
    }

    /// Transactions on the production network go through the confirmation dialog.
    pub fn is_production(&self) -> bool {
        self.chain_id == crate::data::chains::MAINNET_CHAIN_ID
    }
}

/// Execution environment shared by every component, built once at startup.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub rpc_url: String,
    pub chain_id: u64,
    pub from: Address,
    pub simulates_vm: bool,
}

impl ExecutionContext {
    /// Short label shown next to every instance title.
    pub fn label(&self) -> &'static str {
        if self.simulates_vm { "vm" } else { "web3" }
    }
}

/// Transaction data produced by the encoding layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxData {
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
    pub contract_name: String,
    /// Human readable signature, e.g. `transfer(address,uint256)`.
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecStatus {
    Success,
    Reverted(Bytes),
    OutOfGas,
    Invalid,
}

/// Raw outcome of a call or transaction as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    pub tx_hash: Option<B256>,
    pub return_data: Bytes,
    pub status: ExecStatus,
    pub contract_address: Option<Address>,
    pub gas_used: Option<u64>,
}

impl TxResult {
    pub fn call_output(return_data: Bytes) -> Self {
        Self {
            tx_hash: None,
            return_data,
            status: ExecStatus::Success,
            contract_address: None,
            gas_used: None,
        }
    }
}

/// One node of a decoded return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayNode {
    pub key: String,
    pub value: Option<String>,
    pub children: Vec<DisplayNode>,
}

impl DisplayNode {
    pub fn leaf(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            children: Vec::new(),
        }
    }

    pub fn branch(key: impl Into<String>, children: Vec<DisplayNode>) -> Self {
        Self {
            key: key.into(),
            value: None,
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Depth-first list of every leaf below (and including) this node.
    #[cfg(test)]
    pub fn leaves(&self) -> Vec<&DisplayNode> {
        if self.is_leaf() {
            return vec![self];
        }
        self.children.iter().flat_map(|c| c.leaves()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_is_production() {
        assert!(Network::from_chain_id(1).is_production());
        assert!(!Network::from_chain_id(11155111).is_production());
        assert!(!Network::from_chain_id(31337).is_production());
    }

    #[test]
    fn test_context_label() {
        let mut ctx = ExecutionContext {
            rpc_url: String::new(),
            chain_id: 31337,
            from: Address::ZERO,
            simulates_vm: true,
        };
        assert_eq!(ctx.label(), "vm");
        ctx.simulates_vm = false;
        assert_eq!(ctx.label(), "web3");
    }

    #[test]
    fn test_leaves_collects_nested() {
        let tree = DisplayNode::branch(
            "",
            vec![
                DisplayNode::leaf("0", "1"),
                DisplayNode::branch("1", vec![DisplayNode::leaf("0", "2"), DisplayNode::leaf("1", "3")]),
            ],
        );
        let values: Vec<_> = tree.leaves().iter().filter_map(|n| n.value.clone()).collect();
        assert_eq!(values, vec!["1", "2", "3"]);
    }
}
