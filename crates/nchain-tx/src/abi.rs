//! Dynamic ABI encoding for contract method invocations.
//!
//! Contract records carry their compiled artifact (ABI + bytecode) as
//! runtime data, so method calls are encoded by coercing the JSON argument
//! list against the ABI rather than through compile-time codegen.

use alloy_dyn_abi::{DynSolType, DynSolValue, JsonAbiExt};
use alloy_json_abi::{Function, JsonAbi, StateMutability};
use thiserror::Error;

/// Errors raised while encoding a method call.
#[derive(Debug, Error)]
pub enum AbiError {
	#[error("invalid ABI document: {0}")]
	InvalidAbi(String),
	#[error("method not found in ABI: {0}")]
	UnknownMethod(String),
	#[error("method {method} expects {expected} argument(s), got {actual}")]
	ArityMismatch {
		method: String,
		expected: usize,
		actual: usize,
	},
	#[error("failed to coerce argument {index} for method {method}: {message}")]
	Coercion {
		method: String,
		index: usize,
		message: String,
	},
	#[error("encoding failed: {0}")]
	Encoding(String),
}

/// An encoded method call plus whether it can be served by a read-only
/// call instead of a broadcast.
#[derive(Debug, Clone)]
pub struct EncodedCall {
	pub data: Vec<u8>,
	pub read_only: bool,
}

/// Encodes `method(args...)` against the contract's ABI document.
pub fn encode_function_call(
	abi: &serde_json::Value,
	method: &str,
	args: &[serde_json::Value],
) -> Result<EncodedCall, AbiError> {
	let abi: JsonAbi =
		serde_json::from_value(abi.clone()).map_err(|e| AbiError::InvalidAbi(e.to_string()))?;

	let function = abi
		.function(method)
		.and_then(|overloads| overloads.first())
		.ok_or_else(|| AbiError::UnknownMethod(method.to_string()))?;

	if function.inputs.len() != args.len() {
		return Err(AbiError::ArityMismatch {
			method: method.to_string(),
			expected: function.inputs.len(),
			actual: args.len(),
		});
	}

	let values = coerce_arguments(function, args)?;
	let data = function
		.abi_encode_input(&values)
		.map_err(|e| AbiError::Encoding(e.to_string()))?;

	Ok(EncodedCall {
		data,
		read_only: matches!(
			function.state_mutability,
			StateMutability::View | StateMutability::Pure
		),
	})
}

fn coerce_arguments(
	function: &Function,
	args: &[serde_json::Value],
) -> Result<Vec<DynSolValue>, AbiError> {
	function
		.inputs
		.iter()
		.zip(args)
		.enumerate()
		.map(|(index, (param, arg))| {
			let ty = DynSolType::parse(&param.selector_type()).map_err(|e| AbiError::Coercion {
				method: function.name.clone(),
				index,
				message: e.to_string(),
			})?;
			// Strings coerce directly; everything else through its JSON
			// rendering, which matches the coercion grammar for numbers,
			// bools and arrays.
			let rendered = match arg {
				serde_json::Value::String(s) => s.clone(),
				other => other.to_string(),
			};
			ty.coerce_str(&rendered).map_err(|e| AbiError::Coercion {
				method: function.name.clone(),
				index,
				message: e.to_string(),
			})
		})
		.collect()
}
