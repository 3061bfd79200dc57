//! Stats daemon registry.
//!
//! Owns the map of running daemons, keyed by network id and guarded by a
//! single mutex so concurrent callers never start duplicates. Constructed
//! once at process startup and passed by reference; there is no ambient
//! global state.

use crate::daemon::StatsDaemon;
use crate::StatsError;
use nchain_config::StatsConfig;
use nchain_rpc::RpcService;
use nchain_types::NetworkConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Registry of running stats daemons, at most one per network.
pub struct StatsRegistry {
	daemons: Mutex<HashMap<Uuid, Arc<StatsDaemon>>>,
	rpc: Arc<RpcService>,
	config: StatsConfig,
}

impl StatsRegistry {
	pub fn new(rpc: Arc<RpcService>, config: StatsConfig) -> Self {
		Self {
			daemons: Mutex::new(HashMap::new()),
			rpc,
			config,
		}
	}

	/// Returns the single running daemon for the network, starting one if
	/// absent. A network with no reachable peers gets no daemon.
	pub async fn require(&self, network: &NetworkConfig) -> Option<Arc<StatsDaemon>> {
		if network.available_peer_count() == 0 {
			tracing::debug!(
				network = %network.name,
				"stats daemon instance not initialized; no available peers"
			);
			return None;
		}

		let mut daemons = self.daemons.lock().await;
		if let Some(daemon) = daemons.get(&network.id) {
			tracing::debug!(
				network = %network.name,
				network_id = %network.id,
				"cached stats daemon instance found"
			);
			return Some(daemon.clone());
		}

		tracing::info!(
			network = %network.name,
			network_id = %network.id,
			"initializing new stats daemon instance"
		);
		let daemon = StatsDaemon::spawn(network.clone(), self.rpc.clone(), self.config.clone());
		daemons.insert(network.id, daemon.clone());
		Some(daemon)
	}

	/// The running daemon for a network, if any.
	pub async fn get(&self, network_id: &Uuid) -> Option<Arc<StatsDaemon>> {
		self.daemons.lock().await.get(network_id).cloned()
	}

	/// Signals shutdown for a network's daemon and removes the registry
	/// entry.
	pub async fn evict(&self, network_id: &Uuid) -> Result<(), StatsError> {
		let mut daemons = self.daemons.lock().await;
		match daemons.remove(network_id) {
			Some(daemon) => {
				tracing::debug!(network_id = %network_id, "evicting stats daemon instance");
				daemon.shutdown();
				Ok(())
			},
			None => Err(StatsError::NotFound(network_id.to_string())),
		}
	}

	/// Evicts every running daemon; used during process shutdown.
	pub async fn evict_all(&self) {
		let mut daemons = self.daemons.lock().await;
		for (_, daemon) in daemons.drain() {
			daemon.shutdown();
		}
	}
}
