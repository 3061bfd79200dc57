//! Per-network status snapshots.

use serde::{Deserialize, Serialize};

/// Metadata key carrying the rolling mean inter-block interval in seconds.
pub const META_AVERAGE_BLOCKTIME: &str = "average_blocktime";
/// Metadata key carrying the per-interval block-time series.
pub const META_BLOCKTIMES: &str = "blocktimes";
/// Metadata key carrying the hash of the most recent block.
pub const META_LAST_BLOCK_HASH: &str = "last_block_hash";
/// Metadata key carrying the most recent normalized header.
pub const META_LAST_BLOCK_HEADER: &str = "last_block_header";

/// Network-agnostic liveness snapshot maintained by the stats daemon.
///
/// Not persisted; discarded when the owning daemon is evicted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkStatus {
	/// Current block height.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub block: Option<u64>,
	/// Total chain height; null once syncing has completed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub height: Option<u64>,
	/// Textual sync state, e.g. "configuring", "syncing", "synced".
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
	pub syncing: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub chain_id: Option<String>,
	/// Millisecond timestamp of the most recent ingested block.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_block_at: Option<u64>,
	/// Network-specific metadata; append/overwrite-only per ingest cycle.
	#[serde(default)]
	pub meta: serde_json::Map<String, serde_json::Value>,
}

impl NetworkStatus {
	/// Initial snapshot for a daemon that has not ingested anything yet.
	pub fn configuring(chain_id: Option<String>) -> Self {
		Self {
			state: Some("configuring".to_string()),
			chain_id,
			..Default::default()
		}
	}
}
