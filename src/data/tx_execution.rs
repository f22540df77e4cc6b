use alloy::primitives::Bytes;
use alloy::sol_types::decode_revert_reason;

use crate::data::provider::CallOutput;
use crate::data::types::{ExecStatus, TxResult};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VmError {
    pub error: bool,
    pub message: String,
}

/// Inspect a result produced by a simulated VM for an exceptional halt.
pub fn check_vm_error(result: &TxResult) -> VmError {
    let (kind, detail) = match &result.status {
        ExecStatus::Success => return VmError::default(),
        ExecStatus::Reverted(data) => {
            let detail = match decode_revert_reason(data) {
                Some(reason) if !data.is_empty() => format!(
                    "\tThe transaction has been reverted to the initial state.\nReason provided by the contract: \"{}\".",
                    strip_reason_prefix(&reason)
                ),
                _ => "\tThe transaction has been reverted to the initial state.\nNote: The called function should be payable if you send value.".to_string(),
            };
            ("revert", detail)
        }
        ExecStatus::OutOfGas => (
            "out of gas",
            "\tThe transaction ran out of gas. Please increase the Gas Limit.".to_string(),
        ),
        ExecStatus::Invalid => (
            "invalid opcode",
            "\tThe execution might have thrown.".to_string(),
        ),
    };

    VmError {
        error: true,
        message: format!("VM error: {kind}.\n{kind}\n{detail}\n\tDebug the transaction to get more information."),
    }
}

/// Classify a failed receipt from a simulated VM.
///
/// `replay` is the same request run as a call, or the node's error message.
/// A halt that consumed the whole gas limit without reverting ran out of gas.
pub fn failure_status(gas_used: u64, gas_limit: Option<u64>, replay: Result<CallOutput, String>) -> ExecStatus {
    match replay {
        Ok(CallOutput::Reverted(data)) => ExecStatus::Reverted(data),
        Err(message) if is_invalid_opcode(&message) => ExecStatus::Invalid,
        _ if gas_limit == Some(gas_used) => ExecStatus::OutOfGas,
        _ => ExecStatus::Reverted(Bytes::new()),
    }
}

fn is_invalid_opcode(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("invalid opcode") || message.contains("invalidfeopcode")
}

// alloy prefixes decoded reasons with "revert: "
fn strip_reason_prefix(reason: &str) -> &str {
    reason.strip_prefix("revert: ").unwrap_or(reason)
}
