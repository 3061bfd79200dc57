//! Message handlers for the four lifecycle subjects.
//!
//! Each handler is a pure async function from a parsed message to a
//! [`Disposition`]; the coordinator maps dispositions onto queue outcomes.
//! Keeping handlers outcome-free makes every branch directly testable
//! without broker plumbing.

pub mod create;
pub mod execute;
pub mod finalize;
pub mod receipt;

use crate::Context;
use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use nchain_signer::{ResolvedSigner, UnsignedTx};
use nchain_types::{NetworkConfig, TxParams};

/// How the coordinator should resolve a delivery after handling.
#[derive(Debug, PartialEq, Eq)]
pub enum Disposition {
	/// Handled; acknowledge and remove.
	Ack,
	/// Transient failure; negative-acknowledge for bounded redelivery.
	Retry(String),
	/// Permanent failure; terminate, no redelivery.
	Reject(String),
	/// Neither acknowledge nor retry: leave the delivery in flight so the
	/// ack-wait timeout drives redelivery.
	Leave(String),
}

pub(crate) struct BroadcastOutcome {
	pub hash: String,
	pub broadcast_at: DateTime<Utc>,
}

/// Builds, signs and broadcasts a transaction on the given network.
///
/// Gas, gas price and nonce fall back to policy defaults and live chain
/// state when the request does not pin them. Returns the broadcast failure
/// as a message string so callers can pattern-match business failures
/// (insufficient funds) out of it.
pub(crate) async fn sign_and_broadcast(
	ctx: &Context,
	network: &NetworkConfig,
	signer: &ResolvedSigner,
	to: Option<Address>,
	value: U256,
	data: Vec<u8>,
	params: &TxParams,
) -> Result<BroadcastOutcome, String> {
	let rpc = ctx
		.rpc
		.provider(&network.id)
		.await
		.map_err(|e| e.to_string())?;

	let gas_limit = params.gas.unwrap_or(ctx.lifecycle.default_gas_limit);
	let address = format!("{:#x}", signer.address());

	let nonce = match params.nonce {
		Some(nonce) => nonce,
		None => rpc.get_nonce(&address).await.map_err(|e| e.to_string())?,
	};
	let gas_price = match params.gas_price {
		Some(price) => price,
		None => rpc.gas_price().await.map_err(|e| e.to_string())?,
	};

	let unsigned = UnsignedTx {
		chain_id: network.chain_id,
		nonce,
		gas_price,
		gas_limit,
		to,
		value,
		data,
	};

	let raw = signer
		.sign_transaction(&unsigned)
		.map_err(|e| e.to_string())?;
	let hash = rpc.broadcast_raw(&raw).await.map_err(|e| e.to_string())?;

	Ok(BroadcastOutcome {
		hash,
		broadcast_at: Utc::now(),
	})
}

/// Decodes hex call data, tolerating a 0x prefix.
pub(crate) fn decode_hex_data(data: &str) -> Result<Vec<u8>, String> {
	let stripped = data.trim_start_matches("0x");
	if stripped.is_empty() {
		return Ok(Vec::new());
	}
	hex::decode(stripped).map_err(|e| format!("invalid hex data: {}", e))
}
