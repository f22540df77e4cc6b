use alloy::dyn_abi::{DynSolValue, FunctionExt};
use alloy::json_abi::Param;
use alloy::primitives::hex;

use crate::data::abi::FunctionDescriptor;
use crate::data::types::DisplayNode;
use crate::utils;

/// Decode the raw return data of a call into a display tree.
///
/// The root has one child per declared output, keyed `index: type name`.
/// Integers of any width become a single base-10 leaf; tuples and arrays are
/// decomposed into nested nodes.
pub fn decode_response(response: &[u8], func: &FunctionDescriptor) -> DisplayNode {
    let Some(function) = func.function() else {
        return DisplayNode::branch("", Vec::new());
    };

    match function.abi_decode_output(response, false) {
        Ok(values) => {
            let children = function
                .outputs
                .iter()
                .zip(values.iter())
                .enumerate()
                .map(|(i, (param, value))| {
                    let key = if param.name.is_empty() {
                        format!("{i}: {}", param.selector_type())
                    } else {
                        format!("{i}: {} {}", param.selector_type(), param.name)
                    };
                    value_node(key, value, &param.components)
                })
                .collect();
            DisplayNode::branch("", children)
        }
        Err(e) => DisplayNode::leaf("error", format!("Failed to decode output: {e}")),
    }
}

fn value_node(key: String, value: &DynSolValue, components: &[Param]) -> DisplayNode {
    match value {
        DynSolValue::Int(i, _) => DisplayNode::leaf(key, i.to_string()),
        DynSolValue::Uint(u, _) => DisplayNode::leaf(key, u.to_string()),
        DynSolValue::Bool(b) => DisplayNode::leaf(key, b.to_string()),
        DynSolValue::Address(a) => DisplayNode::leaf(key, utils::format_address(a)),
        DynSolValue::FixedBytes(b, size) => {
            DisplayNode::leaf(key, hex::encode_prefixed(&b[..(*size).min(32)]))
        }
        DynSolValue::Function(f) => DisplayNode::leaf(key, hex::encode_prefixed(f)),
        DynSolValue::Bytes(b) => DisplayNode::leaf(key, hex::encode_prefixed(b)),
        DynSolValue::String(s) => DisplayNode::leaf(key, s.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => DisplayNode::branch(
            key,
            items
                .iter()
                .enumerate()
                .map(|(i, item)| value_node(i.to_string(), item, components))
                .collect(),
        ),
        DynSolValue::Tuple(items) => DisplayNode::branch(
            key,
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let component = components.get(i);
                    let name = component
                        .map(|c| c.name.as_str())
                        .filter(|n| !n.is_empty())
                        .map(str::to_string)
                        .unwrap_or_else(|| i.to_string());
                    let nested = component.map(|c| c.components.as_slice()).unwrap_or(&[]);
                    value_node(name, item, nested)
                })
                .collect(),
        ),
    }
}
