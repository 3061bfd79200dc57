//! Per-network chain access for the nchain service.
//!
//! This crate defines the RPC contract the lifecycle coordinator and stats
//! daemon consume — broadcast, receipt/call/balance queries, head-stream
//! subscription and polled status snapshots — together with an Alloy-backed
//! EVM implementation and the outbound payments (faucet) client.

use alloy_primitives::U256;
use async_trait::async_trait;
use futures::stream::BoxStream;
use nchain_types::{BlockHeader, NetworkStatus};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
	pub mod payments {
		pub mod http;
	}
}

pub mod payments;

pub use payments::{PaymentReceipt, PaymentsError, PaymentsInterface};

/// Errors that can occur during chain access.
#[derive(Debug, Error)]
pub enum RpcError {
	/// Network-level failure talking to an endpoint.
	#[error("network error: {0}")]
	Network(String),
	/// A broadcast was rejected by the node.
	#[error("transaction rejected: {0}")]
	TransactionRejected(String),
	/// The network does not declare the requested transport.
	#[error("streaming not supported")]
	StreamingNotSupported,
	/// No provider is registered for the requested network.
	#[error("no provider available")]
	NoProviderAvailable,
}

/// On-chain receipt data for a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TxReceiptData {
	pub hash: String,
	/// Block the transaction was included in; `None` until mined.
	pub block_number: Option<u64>,
	pub success: bool,
	/// Address of the created contract, for deployment transactions.
	pub contract_address: Option<String>,
}

/// Chain access contract implemented per network.
#[async_trait]
pub trait RpcInterface: Send + Sync {
	/// Broadcasts a raw signed transaction, returning its hash.
	async fn broadcast_raw(&self, raw: &[u8]) -> Result<String, RpcError>;

	/// Fetches the receipt for a transaction hash. `Ok(None)` means the
	/// transaction is known but not yet mined.
	async fn get_receipt(&self, hash: &str) -> Result<Option<TxReceiptData>, RpcError>;

	/// Executes a read-only contract call.
	async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, RpcError>;

	/// Native balance of an address, in wei.
	async fn get_balance(&self, address: &str) -> Result<U256, RpcError>;

	/// Next valid nonce for an address.
	async fn get_nonce(&self, address: &str) -> Result<u64, RpcError>;

	/// Current recommended gas price, in wei.
	async fn gas_price(&self) -> Result<u128, RpcError>;

	async fn chain_id(&self) -> Result<u64, RpcError>;

	async fn get_block_number(&self) -> Result<u64, RpcError>;

	/// Subscribes to new chain heads over the network's streaming
	/// endpoint. Fails with [`RpcError::StreamingNotSupported`] when the
	/// network declares none.
	async fn subscribe_heads(&self) -> Result<BoxStream<'static, BlockHeader>, RpcError>;

	/// Takes a one-shot status snapshot over JSON-RPC, embedding the
	/// latest header in the snapshot metadata.
	async fn poll_status(&self) -> Result<NetworkStatus, RpcError>;
}

/// Routes chain access by network id.
///
/// Providers are held behind a lock so endpoint rebalancing can swap an
/// entry while daemons and consumers hold the service.
pub struct RpcService {
	providers: RwLock<HashMap<Uuid, Arc<dyn RpcInterface>>>,
}

impl RpcService {
	pub fn new() -> Self {
		Self {
			providers: RwLock::new(HashMap::new()),
		}
	}

	/// Registers or replaces the provider for a network.
	pub async fn insert_provider(&self, network_id: Uuid, provider: Arc<dyn RpcInterface>) {
		self.providers.write().await.insert(network_id, provider);
	}

	/// Resolves the provider for a network, re-reading the registry each
	/// call so callers observe endpoint swaps.
	pub async fn provider(&self, network_id: &Uuid) -> Result<Arc<dyn RpcInterface>, RpcError> {
		self.providers
			.read()
			.await
			.get(network_id)
			.cloned()
			.ok_or(RpcError::NoProviderAvailable)
	}
}

impl Default for RpcService {
	fn default() -> Self {
		Self::new()
	}
}
