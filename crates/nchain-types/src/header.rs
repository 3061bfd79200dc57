//! Canonical block headers and stats ingest events.
//!
//! Head data arrives in two wire shapes: a pushed subscription header and a
//! polled status snapshot embedding the last seen header. Both normalize
//! into [`BlockHeader`], synthesizing placeholder proof-of-work fields for
//! encodings that omit them.

use crate::status::{NetworkStatus, META_LAST_BLOCK_HEADER};
use serde::{Deserialize, Serialize};

/// Placeholder mix hash for headers from chains without proof-of-work.
pub const EMPTY_MIX_HASH: &str =
	"0x0000000000000000000000000000000000000000000000000000000000000000";
/// Placeholder proof-of-work nonce.
pub const EMPTY_POW_NONCE: &str = "0x0000000000000000";

/// Normalized block header shared by the streaming and polling sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
	pub number: u64,
	pub hash: String,
	pub parent_hash: String,
	/// Block timestamp in seconds since the epoch.
	pub timestamp: u64,
	pub mix_hash: String,
	pub nonce: String,
}

impl BlockHeader {
	/// Normalizes a JSON header of either wire shape into the canonical
	/// form. Returns `None` when the required number/hash fields are
	/// missing or unparseable.
	pub fn from_json(value: &serde_json::Value) -> Option<Self> {
		let number = parse_quantity(value.get("number")?)?;
		let hash = value.get("hash")?.as_str()?.to_string();
		let parent_hash = value
			.get("parentHash")
			.and_then(|v| v.as_str())
			.unwrap_or_default()
			.to_string();
		let timestamp = value.get("timestamp").and_then(parse_quantity).unwrap_or(0);
		let mix_hash = value
			.get("mixHash")
			.and_then(|v| v.as_str())
			.unwrap_or(EMPTY_MIX_HASH)
			.to_string();
		let nonce = value
			.get("nonce")
			.and_then(|v| v.as_str())
			.unwrap_or(EMPTY_POW_NONCE)
			.to_string();

		Some(Self {
			number,
			hash,
			parent_hash,
			timestamp,
			mix_hash,
			nonce,
		})
	}
}

/// Parses a JSON quantity that may be a hex string, a decimal string or a
/// plain integer.
fn parse_quantity(value: &serde_json::Value) -> Option<u64> {
	if let Some(n) = value.as_u64() {
		return Some(n);
	}
	let s = value.as_str()?;
	if let Some(hex) = s.strip_prefix("0x") {
		u64::from_str_radix(hex, 16).ok()
	} else {
		s.parse().ok()
	}
}

/// One ingestible event for the stats daemon run loop.
///
/// Each variant normalizes into the canonical header shape; events that do
/// not carry a usable header are dropped by the daemon.
#[derive(Debug, Clone)]
pub enum StatsEvent {
	/// A header pushed by the real-time stream.
	Header(Box<BlockHeader>),
	/// A polled status snapshot; the header rides in its metadata.
	Status(Box<NetworkStatus>),
}

impl StatsEvent {
	/// Converges the event onto the canonical header type.
	pub fn normalize(&self) -> Option<BlockHeader> {
		match self {
			StatsEvent::Header(header) => Some((**header).clone()),
			StatsEvent::Status(status) => status
				.meta
				.get(META_LAST_BLOCK_HEADER)
				.and_then(BlockHeader::from_json),
		}
	}
}
