//! Typed payloads for the transaction lifecycle subjects.
//!
//! Each subject carries one message type with an explicit required/optional
//! field enumeration; deserialization failure of a required field is a
//! permanent rejection at the consumer, never a retry.

use crate::signer::{AmbiguousSigner, SignerReference};
use crate::transaction::TxParams;
use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Durable stream and subject names for the lifecycle consumers.
pub mod subjects {
	/// Stream holding every lifecycle subject.
	pub const STREAM: &str = "nchain";
	/// Contract execution requests.
	pub const TX: &str = "nchain.tx";
	/// Transaction creation requests.
	pub const TX_CREATE: &str = "nchain.tx.create";
	/// Finalization notifications from chain observers.
	pub const TX_FINALIZE: &str = "nchain.tx.finalize";
	/// Receipt polling requests.
	pub const TX_RECEIPT: &str = "nchain.tx.receipt";
}

/// Request to build, sign and broadcast a transaction for a contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxCreateMessage {
	pub contract_id: Uuid,
	/// Hex-encoded call data.
	pub data: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub account_id: Option<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub wallet_id: Option<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hd_derivation_path: Option<String>,
	pub value: U256,
	pub params: TxParams,
	/// When the producer published the request; start of the latency clock.
	pub published_at: DateTime<Utc>,
}

impl TxCreateMessage {
	/// Resolves the message's signing identity fields into a reference.
	pub fn signer(&self) -> Result<SignerReference, AmbiguousSigner> {
		SignerReference::from_parts(
			self.account_id,
			self.wallet_id,
			self.hd_derivation_path.clone(),
		)
	}
}

/// Identity object embedded inline in an execution request. Producers may
/// send either a bare id field or a partial record; only the id matters
/// for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedIdentity {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<Uuid>,
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Errors produced while reconciling an execution message's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecuteIdentityError {
	/// The id field and the embedded object name different identities.
	#[error("message specifies contradictory id and embedded identity")]
	Conflicting,
	#[error(transparent)]
	Ambiguous(#[from] AmbiguousSigner),
}

/// Request to invoke a method on a resolved contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteMessage {
	/// Contract id, or its on-chain address as a fallback lookup key.
	pub contract_id: String,
	pub method: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub params: Vec<serde_json::Value>,
	#[serde(default)]
	pub value: U256,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub account_id: Option<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub wallet_id: Option<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hd_derivation_path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub account: Option<EmbeddedIdentity>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub wallet: Option<EmbeddedIdentity>,
	/// Pre-encoded call data, bypassing ABI encoding when present.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub published_at: Option<DateTime<Utc>>,
}

impl ExecuteMessage {
	/// Normalizes the account/wallet reference, whether supplied as a raw
	/// id or a partial embedded object, rejecting contradictory pairs.
	pub fn signer(&self) -> Result<SignerReference, ExecuteIdentityError> {
		let account_id = reconcile(self.account_id, self.account.as_ref())?;
		let wallet_id = reconcile(self.wallet_id, self.wallet.as_ref())?;
		Ok(SignerReference::from_parts(
			account_id,
			wallet_id,
			self.hd_derivation_path.clone(),
		)?)
	}
}

fn reconcile(
	id: Option<Uuid>,
	embedded: Option<&EmbeddedIdentity>,
) -> Result<Option<Uuid>, ExecuteIdentityError> {
	match (id, embedded.and_then(|e| e.id)) {
		(Some(a), Some(b)) if a != b => Err(ExecuteIdentityError::Conflicting),
		(Some(a), _) => Ok(Some(a)),
		(None, other) => Ok(other),
	}
}

/// Notification that a transaction reached a known block.
///
/// Malformed finalize messages are never retried: the producer is expected
/// to resend correct data under a new message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxFinalizeMessage {
	pub block: u64,
	pub block_timestamp: DateTime<Utc>,
	pub finalized_at: DateTime<Utc>,
	pub hash: String,
}

/// Request to fetch and reconcile the on-chain receipt for a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxReceiptMessage {
	pub transaction_id: Uuid,
}
