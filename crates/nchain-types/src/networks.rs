//! Network configuration types.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Faucet subsidy settings for one network. Presence of this section marks
/// the network as subsidy-eligible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetConfig {
	/// Drip value in wei; falls back to the global policy default.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub drip_wei: Option<u64>,
}

/// Configuration for one reachable blockchain network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
	pub id: Uuid,
	pub name: String,
	pub chain_id: u64,
	/// JSON-RPC endpoint; absent when the network is push-only.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rpc_url: Option<String>,
	/// Websocket endpoint for head subscriptions; absent forces polling.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub websocket_url: Option<String>,
	/// Known reachable peers; networks without any are considered down.
	#[serde(default)]
	pub peers: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub faucet: Option<FaucetConfig>,
}

impl NetworkConfig {
	pub fn available_peer_count(&self) -> usize {
		self.peers.len()
	}

	/// Whether the network declares a real-time streaming endpoint.
	pub fn has_streaming_endpoint(&self) -> bool {
		self.websocket_url.as_deref().is_some_and(|u| !u.is_empty())
	}

	/// Whether transactions on this network may be faucet-subsidized.
	pub fn subsidy_eligible(&self) -> bool {
		self.faucet.is_some()
	}
}

/// Networks keyed by network id.
pub type NetworksConfig = HashMap<Uuid, NetworkConfig>;

/// Deserializes an array of network tables into the id-keyed map,
/// rejecting duplicate ids.
pub fn deserialize_networks<'de, D>(deserializer: D) -> Result<NetworksConfig, D::Error>
where
	D: Deserializer<'de>,
{
	let list = Vec::<NetworkConfig>::deserialize(deserializer)?;
	let mut networks = HashMap::with_capacity(list.len());
	for network in list {
		let id = network.id;
		if networks.insert(id, network).is_some() {
			return Err(serde::de::Error::custom(format!(
				"duplicate network id: {}",
				id
			)));
		}
	}
	Ok(networks)
}
