//! The per-network stats daemon.
//!
//! Two tasks per daemon: a source consumer that prefers the network's
//! real-time head stream and falls back to JSON-RPC polling, reconnecting
//! under exponential backoff; and a run loop that multiplexes ingested
//! events with the shutdown signal and folds them into the status
//! snapshot. Shutdown is cooperative and idempotent.

use crate::window::BlockWindow;
use crate::StatsError;
use chrono::Utc;
use futures::StreamExt;
use nchain_config::StatsConfig;
use nchain_rpc::{RpcError, RpcService};
use nchain_types::{
	BlockHeader, NetworkConfig, NetworkStatus, StatsEvent, META_AVERAGE_BLOCKTIME,
	META_BLOCKTIMES, META_LAST_BLOCK_HASH, META_LAST_BLOCK_HEADER,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use uuid::Uuid;

/// Reconnect backoff: doubles from 100ms per consecutive failure and
/// resets to zero once the ceiling is exceeded.
#[derive(Debug)]
pub struct Backoff {
	current: u64,
	max: u64,
}

impl Backoff {
	const BASE_MILLIS: u64 = 100;

	pub fn new(max: u64) -> Self {
		Self { current: 0, max }
	}

	/// Advances the backoff state and returns the delay to apply, in
	/// milliseconds.
	pub fn next_delay(&mut self) -> u64 {
		if self.current == 0 {
			self.current = Self::BASE_MILLIS;
		} else {
			self.current *= 2;
		}
		if self.current > self.max {
			self.current = 0;
		}
		self.current
	}
}

/// One running stats daemon instance for a network.
pub struct StatsDaemon {
	network: NetworkConfig,
	status: Arc<RwLock<NetworkStatus>>,
	shutdown_tx: watch::Sender<bool>,
	closing: AtomicBool,
}

impl StatsDaemon {
	/// Starts the daemon's source-consumer and run-loop tasks and returns
	/// the instance handle.
	pub fn spawn(
		network: NetworkConfig,
		rpc: Arc<RpcService>,
		config: StatsConfig,
	) -> Arc<StatsDaemon> {
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let status = Arc::new(RwLock::new(NetworkStatus::configuring(Some(format!(
			"0x{:x}",
			network.chain_id
		)))));

		let (header_tx, header_rx) = mpsc::channel(config.queue_depth.max(1));
		let (status_tx, status_rx) = mpsc::channel(config.queue_depth.max(1));

		let daemon = Arc::new(StatsDaemon {
			network: network.clone(),
			status: status.clone(),
			shutdown_tx,
			closing: AtomicBool::new(false),
		});

		tokio::spawn(consume_sources(
			network,
			rpc,
			config.clone(),
			header_tx,
			status_tx,
			shutdown_rx.clone(),
		));

		let ingestor = Ingestor::new(&config, status);
		tokio::spawn(run_loop(ingestor, header_rx, status_rx, shutdown_rx));

		daemon
	}

	pub fn network_id(&self) -> Uuid {
		self.network.id
	}

	/// A copy of the current status snapshot.
	pub async fn status(&self) -> NetworkStatus {
		self.status.read().await.clone()
	}

	/// Signals shutdown. Idempotent: only the first call sends the
	/// cancellation, later calls are no-ops.
	pub fn shutdown(&self) {
		if !self.closing.swap(true, Ordering::SeqCst) {
			tracing::debug!(network = %self.network.name, "shutting down stats daemon instance");
			self.shutdown_tx.send(true).ok();
		}
	}

	pub fn shutting_down(&self) -> bool {
		self.closing.load(Ordering::SeqCst)
	}
}

/// Folds normalized events into the window and status snapshot.
pub(crate) struct Ingestor {
	window: BlockWindow,
	status: Arc<RwLock<NetworkStatus>>,
}

impl Ingestor {
	pub(crate) fn new(config: &StatsConfig, status: Arc<RwLock<NetworkStatus>>) -> Self {
		Self {
			window: BlockWindow::new(config.recent_block_capacity, config.min_samples),
			status,
		}
	}

	/// Ingests one event. `realtime` marks events from the push stream,
	/// whose arrival time stands in for the block time; polled events use
	/// the header's own timestamp.
	pub(crate) async fn ingest(&mut self, event: StatsEvent, realtime: bool) {
		let Some(header) = event.normalize() else {
			tracing::warn!("received malformed stats message; dropping");
			return;
		};
		if header.number == 0 {
			tracing::debug!("ignoring genesis header");
			return;
		}

		let last_block_at = if realtime {
			Utc::now().timestamp_millis().max(0) as u64
		} else {
			header.timestamp.saturating_mul(1_000)
		};

		self.window.push(header.clone(), last_block_at);
		self.fold(&header, last_block_at).await;
	}

	async fn fold(&self, header: &BlockHeader, last_block_at: u64) {
		let mut status = self.status.write().await;
		status.block = Some(header.number);
		status.state = None;
		status.syncing = false;
		status.last_block_at = Some(last_block_at);

		if let Ok(header_json) = serde_json::to_value(header) {
			status
				.meta
				.insert(META_LAST_BLOCK_HEADER.to_string(), header_json);
		}

		if let Some((intervals, mean)) = self.window.block_times() {
			status
				.meta
				.insert(META_AVERAGE_BLOCKTIME.to_string(), mean.into());
			status
				.meta
				.insert(META_BLOCKTIMES.to_string(), intervals.into());
			status
				.meta
				.insert(META_LAST_BLOCK_HASH.to_string(), header.hash.clone().into());
		}
	}
}

/// The daemon's governing loop: multiplexes streamed headers, polled
/// statuses and the shutdown signal.
async fn run_loop(
	mut ingestor: Ingestor,
	mut header_rx: mpsc::Receiver<BlockHeader>,
	mut status_rx: mpsc::Receiver<NetworkStatus>,
	mut shutdown_rx: watch::Receiver<bool>,
) {
	loop {
		tokio::select! {
			Some(header) = header_rx.recv() => {
				ingestor.ingest(StatsEvent::Header(Box::new(header)), true).await;
			},
			Some(status) = status_rx.recv() => {
				ingestor.ingest(StatsEvent::Status(Box::new(status)), false).await;
			},
			_ = shutdown_rx.changed() => {
				tracing::debug!("closing stats daemon on shutdown");
				return;
			},
			else => return,
		}
	}
}

/// Supervised source consumption: streaming first, polling fallback, with
/// bounded-backoff reconnects. The provider registry is re-read on every
/// attempt because endpoint URLs may have been rebalanced externally.
async fn consume_sources(
	network: NetworkConfig,
	rpc: Arc<RpcService>,
	config: StatsConfig,
	header_tx: mpsc::Sender<BlockHeader>,
	status_tx: mpsc::Sender<NetworkStatus>,
	mut shutdown_rx: watch::Receiver<bool>,
) {
	let mut backoff = Backoff::new(config.max_backoff_ms);
	let mut attempt: u64 = 0;

	while !*shutdown_rx.borrow() {
		attempt += 1;
		tracing::debug!(
			attempt,
			network = %network.name,
			"attempting to consume configured stats daemon data source"
		);

		match consume_once(
			&network,
			&rpc,
			&config,
			&header_tx,
			&status_tx,
			&mut shutdown_rx,
		)
		.await
		{
			// Cooperative shutdown surfaced from inside the source loop.
			Ok(()) => return,
			Err(e) => {
				tracing::warn!(
					network = %network.name,
					error = %e,
					"stats daemon data source returned error; restarting stream"
				);
				let delay = backoff.next_delay();
				if delay > 0 {
					tokio::select! {
						_ = tokio::time::sleep(Duration::from_millis(delay)) => {},
						_ = shutdown_rx.changed() => return,
					}
				}
			},
		}
	}
}

async fn consume_once(
	network: &NetworkConfig,
	rpc: &Arc<RpcService>,
	config: &StatsConfig,
	header_tx: &mpsc::Sender<BlockHeader>,
	status_tx: &mpsc::Sender<NetworkStatus>,
	shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<(), StatsError> {
	let provider = rpc
		.provider(&network.id)
		.await
		.map_err(|e| StatsError::Unavailable(e.to_string()))?;

	if network.has_streaming_endpoint() {
		match provider.subscribe_heads().await {
			Ok(mut stream) => loop {
				tokio::select! {
					maybe = stream.next() => match maybe {
						Some(header) => {
							if header_tx.send(header).await.is_err() {
								return Ok(());
							}
						},
						None => {
							return Err(StatsError::Unavailable("head stream ended".to_string()));
						},
					},
					_ = shutdown_rx.changed() => return Ok(()),
				}
			},
			Err(RpcError::StreamingNotSupported) => {
				tracing::warn!(
					network = %network.name,
					"data source does not support streaming; falling back to JSON-RPC polling"
				);
			},
			// Transport-level stream failure: retried (with backoff)
			// before any fallback to polling.
			Err(e) => return Err(StatsError::Unavailable(e.to_string())),
		}
	}

	let mut interval = tokio::time::interval(Duration::from_millis(config.poll_interval_ms.max(1)));
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
	interval.tick().await;

	loop {
		tokio::select! {
			_ = interval.tick() => {
				match provider.poll_status().await {
					Ok(status) => {
						if status_tx.send(status).await.is_err() {
							return Ok(());
						}
					},
					Err(e) => {
						return Err(StatsError::Unavailable(format!(
							"failed to retrieve network status via JSON-RPC: {}",
							e
						)));
					},
				}
			},
			_ = shutdown_rx.changed() => return Ok(()),
		}
	}
}
