//! Main entry point for the nchain service.
//!
//! Wires the configured storage backend, per-network chain access, the
//! durable queue, the transaction lifecycle coordinator and the stats
//! daemon registry, then runs until interrupted.

use clap::Parser;
use nchain_config::Config;
use nchain_queue::{memory::MemoryQueue, QueueInterface};
use nchain_rpc::implementations::evm::alloy::AlloyRpc;
use nchain_rpc::implementations::payments::http::HttpPayments;
use nchain_rpc::{PaymentsInterface, RpcService};
use nchain_stats::StatsRegistry;
use nchain_storage::{StorageFactory, StorageService};
use nchain_tx::{Coordinator, CoordinatorConfig};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Command-line arguments for the nchain service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};
	let env_filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
	fmt()
		.with_env_filter(env_filter)
		.with_target(true)
		.init();

	tracing::info!("starting nchain");

	let config = Config::from_file(&args.config)?;
	tracing::info!("loaded configuration [{}]", config.node.id);

	let storage = build_storage(&config)?;

	// Per-network chain access.
	let rpc = Arc::new(RpcService::new());
	for network in config.networks.values() {
		if network.rpc_url.is_none() {
			tracing::warn!(
				network = %network.name,
				"network declares no JSON-RPC endpoint; lifecycle operations will be unavailable"
			);
			continue;
		}
		match AlloyRpc::new(network) {
			Ok(provider) => {
				rpc.insert_provider(network.id, Arc::new(provider)).await;
				tracing::info!(component = "rpc", network = %network.name, chain_id = network.chain_id, "Loaded");
			},
			Err(e) => {
				tracing::error!(
					component = "rpc",
					network = %network.name,
					error = %e,
					"failed to create chain access for network, skipping"
				);
			},
		}
	}

	let payments: Option<Arc<dyn PaymentsInterface>> = match &config.payments {
		Some(payments_config) => {
			tracing::info!(component = "payments", url = %payments_config.url, "Loaded");
			Some(Arc::new(HttpPayments::new(
				payments_config.url.clone(),
				payments_config.access_token.clone(),
			)))
		},
		None => {
			tracing::info!("payments service not configured; faucet subsidies disabled");
			None
		},
	};

	let queue: Arc<dyn QueueInterface> = Arc::new(MemoryQueue::new());

	let coordinator = Coordinator::new(
		CoordinatorConfig {
			networks: config.networks.clone(),
			lifecycle: config.lifecycle.clone(),
			queue: config.queue.clone(),
		},
		storage,
		rpc.clone(),
		payments,
		queue,
	);
	let consumer_handles = coordinator.start().await?;
	tracing::info!(component = "coordinator", "Loaded");

	// One stats daemon per reachable network.
	let registry = StatsRegistry::new(rpc, config.stats.clone());
	for network in config.networks.values() {
		registry.require(network).await;
	}

	tokio::signal::ctrl_c().await?;
	tracing::info!("shutting down");

	registry.evict_all().await;
	for handle in consumer_handles {
		handle.abort();
	}

	tracing::info!("stopped nchain");
	Ok(())
}

/// Creates the configured storage backend through the factory registry.
fn build_storage(config: &Config) -> Result<Arc<StorageService>, Box<dyn std::error::Error>> {
	let factories: HashMap<&str, StorageFactory> =
		nchain_storage::get_all_implementations().into_iter().collect();

	let factory = factories
		.get(config.storage.backend.as_str())
		.ok_or_else(|| format!("unknown storage backend: {}", config.storage.backend))?;

	let section = config
		.storage
		.implementations
		.get(&config.storage.backend)
		.cloned()
		.unwrap_or(toml::Value::Table(toml::map::Map::new()));

	let backend = factory(&section)?;
	tracing::info!(component = "storage", implementation = %config.storage.backend, "Loaded");
	Ok(Arc::new(StorageService::new(backend)))
}
