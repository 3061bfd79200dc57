//! Configuration for the nchain service.
//!
//! Configuration loads from a single TOML file and covers node identity,
//! reachable networks, durable-queue policies, the storage backend,
//! lifecycle policy constants and stats daemon tuning. Values that encode
//! normative behavior (gas defaults, faucet drip, backoff ceilings) live
//! here so operators can adjust them without a rebuild.

use nchain_types::networks::{deserialize_networks, NetworksConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("configuration error: {0}")]
	Parse(String),
	#[error("validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub node: NodeConfig,
	/// Reachable networks, keyed by network id.
	#[serde(deserialize_with = "deserialize_networks")]
	pub networks: NetworksConfig,
	#[serde(default)]
	pub queue: QueueConfig,
	pub storage: StorageConfig,
	#[serde(default)]
	pub lifecycle: LifecycleConfig,
	#[serde(default)]
	pub stats: StatsConfig,
	/// Payments (faucet) service; absent disables the subsidy path.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payments: Option<PaymentsConfig>,
}

/// Identity of this node instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
	pub id: String,
}

/// Redelivery policy for one durable subject.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubjectPolicyConfig {
	/// Visibility timeout before an unacknowledged delivery is redelivered.
	pub ack_wait_secs: u64,
	/// Total deliveries permitted before the message is dropped.
	pub max_deliveries: u32,
	/// Simultaneous unacknowledged deliveries permitted on the subject.
	pub max_in_flight: usize,
}

/// Durable queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
	/// Worker pool width per subject.
	#[serde(default = "default_concurrency")]
	pub concurrency: usize,
	/// Per-subject policy overrides, keyed by subject name.
	#[serde(default)]
	pub subjects: HashMap<String, SubjectPolicyConfig>,
}

fn default_concurrency() -> usize {
	4
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			concurrency: default_concurrency(),
			subjects: HashMap::new(),
		}
	}
}

impl QueueConfig {
	/// Policy for a subject, falling back to the built-in defaults used by
	/// the lifecycle consumers: broadcast-bearing subjects get long ack
	/// waits and few deliveries, reconciliation subjects get short ack
	/// waits and many.
	pub fn policy_for(&self, subject: &str) -> SubjectPolicyConfig {
		if let Some(policy) = self.subjects.get(subject) {
			return policy.clone();
		}
		match subject {
			nchain_types::messages::subjects::TX_FINALIZE
			| nchain_types::messages::subjects::TX_RECEIPT => SubjectPolicyConfig {
				ack_wait_secs: 5,
				max_deliveries: 100,
				max_in_flight: 1024,
			},
			_ => SubjectPolicyConfig {
				ack_wait_secs: 60,
				max_deliveries: 5,
				max_in_flight: 1024,
			},
		}
	}
}

/// Storage backend selection plus backend-specific sections.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use, e.g. "memory" or "file".
	pub backend: String,
	/// Backend-specific configuration tables, keyed by implementation.
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

/// Policy constants for the transaction lifecycle.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LifecycleConfig {
	/// Gas limit applied when a request does not specify one.
	#[serde(default = "default_gas_limit")]
	pub default_gas_limit: u64,
	/// Faucet drip in wei for subsidized retries, unless the network
	/// overrides it.
	#[serde(default = "default_faucet_drip_wei")]
	pub faucet_drip_wei: u64,
}

fn default_gas_limit() -> u64 {
	210_000 * 2
}

fn default_faucet_drip_wei() -> u64 {
	100_000_000_000_000_000
}

impl Default for LifecycleConfig {
	fn default() -> Self {
		Self {
			default_gas_limit: default_gas_limit(),
			faucet_drip_wei: default_faucet_drip_wei(),
		}
	}
}

/// Stats daemon tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsConfig {
	/// JSON-RPC polling interval when no stream is available.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Capacity of the recent-block ring buffer.
	#[serde(default = "default_recent_block_capacity")]
	pub recent_block_capacity: usize,
	/// Samples required before block-time statistics are computed.
	#[serde(default = "default_min_samples")]
	pub min_samples: usize,
	/// Reconnect backoff ceiling; exceeding it resets the backoff.
	#[serde(default = "default_max_backoff_ms")]
	pub max_backoff_ms: u64,
	/// Depth of the daemon's ingest channels.
	#[serde(default = "default_queue_depth")]
	pub queue_depth: usize,
}

fn default_poll_interval_ms() -> u64 {
	2_500
}

fn default_recent_block_capacity() -> usize {
	32
}

fn default_min_samples() -> usize {
	3
}

fn default_max_backoff_ms() -> u64 {
	12_800
}

fn default_queue_depth() -> usize {
	8
}

impl Default for StatsConfig {
	fn default() -> Self {
		Self {
			poll_interval_ms: default_poll_interval_ms(),
			recent_block_capacity: default_recent_block_capacity(),
			min_samples: default_min_samples(),
			max_backoff_ms: default_max_backoff_ms(),
			queue_depth: default_queue_depth(),
		}
	}
}

/// Payments service used for faucet subsidies.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentsConfig {
	pub url: String,
	/// Bearer token presented to the payments API.
	pub access_token: nchain_types::SecretString,
}

impl Config {
	/// Loads and validates configuration from a TOML file.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let raw = std::fs::read_to_string(path)?;
		Self::from_toml_str(&raw)
	}

	/// Parses and validates configuration from a TOML string.
	pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
		let config: Config = toml::from_str(raw)?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.node.id.is_empty() {
			return Err(ConfigError::Validation("node.id must not be empty".into()));
		}
		if self.networks.is_empty() {
			return Err(ConfigError::Validation(
				"at least one network must be configured".into(),
			));
		}
		for network in self.networks.values() {
			if network.rpc_url.is_none() && network.websocket_url.is_none() {
				return Err(ConfigError::Validation(format!(
					"network {} declares neither an rpc_url nor a websocket_url",
					network.name
				)));
			}
		}
		if self.queue.concurrency == 0 {
			return Err(ConfigError::Validation(
				"queue.concurrency must be at least 1".into(),
			));
		}
		if self.storage.backend.is_empty() {
			return Err(ConfigError::Validation(
				"storage.backend must name an implementation".into(),
			));
		}
		if self.stats.min_samples < 2 {
			return Err(ConfigError::Validation(
				"stats.min_samples must be at least 2".into(),
			));
		}
		if self.stats.recent_block_capacity < self.stats.min_samples {
			return Err(ConfigError::Validation(
				"stats.recent_block_capacity must be >= stats.min_samples".into(),
			));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
		[node]
		id = "nchain-test"

		[[networks]]
		id = "8e2f1ab8-3d65-4a49-9a44-5e8f1cfa2f53"
		name = "ropsten"
		chain_id = 3
		rpc_url = "http://127.0.0.1:8545"
		websocket_url = "ws://127.0.0.1:8546"
		peers = ["enode://a@127.0.0.1:30303"]

		[networks.faucet]
		drip_wei = 50000000000000000

		[storage]
		backend = "memory"
	"#;

	#[test]
	fn test_minimal_config_parses_with_defaults() {
		let config = Config::from_toml_str(MINIMAL).unwrap();
		assert_eq!(config.node.id, "nchain-test");
		assert_eq!(config.networks.len(), 1);
		assert_eq!(config.queue.concurrency, 4);
		assert_eq!(config.lifecycle.default_gas_limit, 420_000);
		assert_eq!(config.lifecycle.faucet_drip_wei, 100_000_000_000_000_000);
		assert_eq!(config.stats.poll_interval_ms, 2_500);
		assert_eq!(config.stats.recent_block_capacity, 32);
		assert_eq!(config.stats.max_backoff_ms, 12_800);

		let network = config.networks.values().next().unwrap();
		assert!(network.subsidy_eligible());
		assert_eq!(network.available_peer_count(), 1);
	}

	#[test]
	fn test_subject_policy_defaults() {
		let config = Config::from_toml_str(MINIMAL).unwrap();
		let create = config
			.queue
			.policy_for(nchain_types::messages::subjects::TX_CREATE);
		assert_eq!(create.ack_wait_secs, 60);
		assert_eq!(create.max_deliveries, 5);

		let finalize = config
			.queue
			.policy_for(nchain_types::messages::subjects::TX_FINALIZE);
		assert_eq!(finalize.ack_wait_secs, 5);
		assert_eq!(finalize.max_deliveries, 100);
	}

	#[test]
	fn test_network_without_endpoints_rejected() {
		let raw = r#"
			[node]
			id = "n"

			[[networks]]
			id = "8e2f1ab8-3d65-4a49-9a44-5e8f1cfa2f53"
			name = "dark"
			chain_id = 99

			[storage]
			backend = "memory"
		"#;
		assert!(matches!(
			Config::from_toml_str(raw),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_duplicate_network_ids_rejected() {
		let raw = r#"
			[node]
			id = "n"

			[[networks]]
			id = "8e2f1ab8-3d65-4a49-9a44-5e8f1cfa2f53"
			name = "a"
			chain_id = 1
			rpc_url = "http://127.0.0.1:8545"

			[[networks]]
			id = "8e2f1ab8-3d65-4a49-9a44-5e8f1cfa2f53"
			name = "b"
			chain_id = 2
			rpc_url = "http://127.0.0.1:8546"

			[storage]
			backend = "memory"
		"#;
		assert!(matches!(
			Config::from_toml_str(raw),
			Err(ConfigError::Parse(_))
		));
	}
}
