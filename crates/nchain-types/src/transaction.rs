//! Transaction records and the lifecycle status state machine.
//!
//! A `Transaction` row represents one signed and broadcast (or pending)
//! value transfer or contract invocation. Rows are created only after a
//! successful signing attempt, mutated by the finalize/receipt consumers,
//! and never deleted except when superseded by a subsidized retry.

use crate::signer::SignerReference;
use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a transaction.
///
/// Transitions are monotonic: `pending → broadcast → mined → success`,
/// with `failed` reachable from any non-terminal state. A `failed` row can
/// still be promoted to `success` by a late finalize message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
	/// Signed and persisted, not yet confirmed on-chain.
	Pending,
	/// Broadcast to the network, awaiting inclusion.
	Broadcast,
	/// Included in a block, awaiting finality.
	Mined,
	/// Terminally failed; the `errors` list carries the reason.
	Failed,
	/// Finalized with a known block and timestamp.
	Success,
}

impl TransactionStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			TransactionStatus::Pending => "pending",
			TransactionStatus::Broadcast => "broadcast",
			TransactionStatus::Mined => "mined",
			TransactionStatus::Failed => "failed",
			TransactionStatus::Success => "success",
		}
	}

	/// Whether no further transition is possible from this status.
	pub fn is_terminal(&self) -> bool {
		matches!(self, TransactionStatus::Success)
	}

	/// Whether the state machine permits moving from `self` to `next`.
	pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
		use TransactionStatus::*;
		match (*self, next) {
			(Pending, Broadcast) | (Pending, Mined) | (Pending, Failed) | (Pending, Success) => {
				true
			},
			(Broadcast, Mined) | (Broadcast, Failed) | (Broadcast, Success) => true,
			(Mined, Failed) | (Mined, Success) => true,
			(Failed, Success) => true,
			_ => false,
		}
	}
}

impl std::fmt::Display for TransactionStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Structured broadcast parameters supplied with a create or execute
/// request. Unknown keys are retained in `extra` so callers can round-trip
/// network-specific knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxParams {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gas: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gas_price: Option<u128>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nonce: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub method: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub args: Vec<serde_json::Value>,
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Durable record of one submitted or pending transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
	pub id: Uuid,
	/// Owning application, mutually exclusive with `user_id`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub application_id: Option<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub organization_id: Option<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<Uuid>,
	pub network_id: Uuid,
	/// Signing identity: exactly one of account or wallet + path.
	pub signer: SignerReference,
	/// Destination address; `None` denotes contract creation.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub to: Option<String>,
	/// Value in the smallest network denomination.
	pub value: U256,
	/// Opaque hex-encoded call data.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
	/// Broadcast hash; null until signed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hash: Option<String>,
	pub status: TransactionStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub block: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub block_timestamp: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub published_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub broadcast_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub finalized_at: Option<DateTime<Utc>>,
	/// broadcast_at − published_at, in milliseconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub queue_latency_ms: Option<u64>,
	/// finalized_at − broadcast_at, in milliseconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub network_latency_ms: Option<u64>,
	/// finalized_at − published_at, in milliseconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub e2e_latency_ms: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub params: Option<TxParams>,
	/// Receipt or call result payload.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response: Option<serde_json::Value>,
	/// Ordered execution trace entries, when tracing is available.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub traces: Vec<serde_json::Value>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub errors: Vec<String>,
}

impl Transaction {
	/// Computes the derived latency metrics from the record's timestamps.
	///
	/// Each metric is written at most once; fields that are already set are
	/// left untouched so repeated finalize deliveries cannot backdate them.
	/// Negative deltas (clock skew between producers) clamp to zero rather
	/// than wrapping. Returns true when skew was clamped, so callers can
	/// surface the inconsistency.
	pub fn compute_latencies(&mut self) -> bool {
		let mut clamped = false;
		if let Some(broadcast_at) = self.broadcast_at {
			if let Some(published_at) = self.published_at {
				if self.queue_latency_ms.is_none() {
					self.queue_latency_ms =
						Some(millis_between(broadcast_at, published_at, &mut clamped));
				}
				if let Some(finalized_at) = self.finalized_at {
					if self.e2e_latency_ms.is_none() {
						self.e2e_latency_ms =
							Some(millis_between(finalized_at, published_at, &mut clamped));
					}
				}
			}
			if let Some(finalized_at) = self.finalized_at {
				if self.network_latency_ms.is_none() {
					self.network_latency_ms =
						Some(millis_between(finalized_at, broadcast_at, &mut clamped));
				}
			}
		}
		clamped
	}

	/// Appends a human-readable error message to the record.
	pub fn push_error(&mut self, message: impl Into<String>) {
		self.errors.push(message.into());
	}
}

/// Millisecond delta between two timestamps, clamped at zero.
fn millis_between(later: DateTime<Utc>, earlier: DateTime<Utc>, clamped: &mut bool) -> u64 {
	let delta = later.signed_duration_since(earlier).num_milliseconds();
	if delta < 0 {
		*clamped = true;
		0
	} else {
		delta as u64
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_tx() -> Transaction {
		Transaction {
			id: Uuid::new_v4(),
			application_id: Some(Uuid::new_v4()),
			organization_id: None,
			user_id: None,
			network_id: Uuid::new_v4(),
			signer: SignerReference::Account {
				account_id: Uuid::new_v4(),
			},
			to: None,
			value: U256::ZERO,
			data: None,
			hash: Some("0xabc".into()),
			status: TransactionStatus::Pending,
			block: None,
			block_timestamp: None,
			published_at: None,
			broadcast_at: None,
			finalized_at: None,
			queue_latency_ms: None,
			network_latency_ms: None,
			e2e_latency_ms: None,
			params: None,
			response: None,
			traces: Vec::new(),
			errors: Vec::new(),
		}
	}

	fn ts(s: &str) -> DateTime<Utc> {
		s.parse().unwrap()
	}

	#[test]
	fn test_latency_computation() {
		let mut tx = base_tx();
		tx.published_at = Some(ts("2024-01-01T00:00:00Z"));
		tx.broadcast_at = Some(ts("2024-01-01T00:00:01Z"));
		tx.finalized_at = Some(ts("2024-01-01T00:00:05Z"));

		let clamped = tx.compute_latencies();
		assert!(!clamped);
		assert_eq!(tx.queue_latency_ms, Some(1_000));
		assert_eq!(tx.network_latency_ms, Some(4_000));
		assert_eq!(tx.e2e_latency_ms, Some(5_000));
	}

	#[test]
	fn test_latency_computed_once() {
		let mut tx = base_tx();
		tx.published_at = Some(ts("2024-01-01T00:00:00Z"));
		tx.broadcast_at = Some(ts("2024-01-01T00:00:01Z"));
		tx.finalized_at = Some(ts("2024-01-01T00:00:05Z"));
		tx.compute_latencies();

		// A second application with shifted timestamps must not backdate.
		tx.finalized_at = Some(ts("2024-01-01T00:00:09Z"));
		tx.compute_latencies();
		assert_eq!(tx.network_latency_ms, Some(4_000));
		assert_eq!(tx.e2e_latency_ms, Some(5_000));
	}

	#[test]
	fn test_latency_clock_skew_clamps() {
		let mut tx = base_tx();
		tx.published_at = Some(ts("2024-01-01T00:00:10Z"));
		tx.broadcast_at = Some(ts("2024-01-01T00:00:00Z"));
		tx.finalized_at = Some(ts("2024-01-01T00:00:05Z"));

		let clamped = tx.compute_latencies();
		assert!(clamped);
		assert_eq!(tx.queue_latency_ms, Some(0));
		assert_eq!(tx.e2e_latency_ms, Some(0));
		assert_eq!(tx.network_latency_ms, Some(5_000));
	}

	#[test]
	fn test_status_transitions_monotonic() {
		use TransactionStatus::*;
		assert!(Pending.can_transition_to(Broadcast));
		assert!(Pending.can_transition_to(Failed));
		assert!(Broadcast.can_transition_to(Success));
		assert!(Failed.can_transition_to(Success));
		assert!(!Success.can_transition_to(Failed));
		assert!(!Success.can_transition_to(Pending));
		assert!(!Mined.can_transition_to(Broadcast));
	}

	#[test]
	fn test_status_serde_lowercase() {
		let s = serde_json::to_string(&TransactionStatus::Pending).unwrap();
		assert_eq!(s, "\"pending\"");
		let s: TransactionStatus = serde_json::from_str("\"success\"").unwrap();
		assert_eq!(s, TransactionStatus::Success);
	}
}
