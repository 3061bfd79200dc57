//! Alloy-backed EVM chain access.
//!
//! One instance serves one network, holding an HTTP provider for queries
//! and broadcasts and dialing the websocket endpoint on demand for head
//! subscriptions. Headers from either transport are normalized through
//! their JSON form so encoding differences between node implementations
//! collapse into the canonical header shape.

use crate::{RpcError, RpcInterface, TxReceiptData};
use alloy_primitives::{Address, FixedBytes, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider, WsConnect};
use alloy_rpc_types::{BlockNumberOrTag, TransactionRequest};
use alloy_transport_http::Http;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use nchain_types::{BlockHeader, NetworkConfig, NetworkStatus, META_LAST_BLOCK_HEADER};

/// Alloy-based implementation of [`RpcInterface`] for EVM networks.
pub struct AlloyRpc {
	provider: RootProvider<Http<reqwest::Client>>,
	websocket_url: Option<String>,
	chain_id: u64,
}

impl AlloyRpc {
	/// Creates chain access for one configured network.
	pub fn new(network: &NetworkConfig) -> Result<Self, RpcError> {
		let rpc_url = network
			.rpc_url
			.as_deref()
			.ok_or(RpcError::NoProviderAvailable)?;
		let provider = RootProvider::new_http(
			rpc_url
				.parse()
				.map_err(|e| RpcError::Network(format!("invalid RPC URL: {}", e)))?,
		);

		Ok(Self {
			provider,
			websocket_url: network.websocket_url.clone(),
			chain_id: network.chain_id,
		})
	}

	fn parse_address(address: &str) -> Result<Address, RpcError> {
		address
			.parse()
			.map_err(|e| RpcError::Network(format!("invalid address {}: {}", address, e)))
	}

	fn parse_hash(hash: &str) -> Result<FixedBytes<32>, RpcError> {
		let bytes = hex::decode(hash.trim_start_matches("0x"))
			.map_err(|e| RpcError::Network(format!("invalid tx hash {}: {}", hash, e)))?;
		if bytes.len() != 32 {
			return Err(RpcError::Network(format!("invalid tx hash length: {}", hash)));
		}
		Ok(FixedBytes::from_slice(&bytes))
	}
}

/// Normalizes any serializable header or block shape into the canonical
/// header, synthesizing placeholder proof-of-work fields where absent.
fn normalize_header<T: serde::Serialize>(raw: &T) -> Option<BlockHeader> {
	let value = serde_json::to_value(raw).ok()?;
	// Blocks nest their header; bare headers are already flat.
	let header = value.get("header").unwrap_or(&value);
	BlockHeader::from_json(header)
}

#[async_trait]
impl RpcInterface for AlloyRpc {
	async fn broadcast_raw(&self, raw: &[u8]) -> Result<String, RpcError> {
		let pending = self
			.provider
			.send_raw_transaction(raw)
			.await
			.map_err(|e| RpcError::TransactionRejected(e.to_string()))?;
		let hash = format!("0x{}", hex::encode(pending.tx_hash().0));
		tracing::debug!(tx_hash = %hash, chain_id = self.chain_id, "broadcast raw transaction");
		Ok(hash)
	}

	async fn get_receipt(&self, hash: &str) -> Result<Option<TxReceiptData>, RpcError> {
		let tx_hash = Self::parse_hash(hash)?;
		match self.provider.get_transaction_receipt(tx_hash).await {
			Ok(Some(receipt)) => Ok(Some(TxReceiptData {
				hash: hash.to_string(),
				block_number: receipt.block_number,
				success: receipt.status(),
				contract_address: receipt
					.contract_address
					.map(|address| format!("{:#x}", address)),
			})),
			Ok(None) => Ok(None),
			Err(e) => Err(RpcError::Network(format!("failed to get receipt: {}", e))),
		}
	}

	async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, RpcError> {
		let to = Self::parse_address(to)?;
		let request = TransactionRequest::default()
			.to(to)
			.input(data.to_vec().into());
		let result = self
			.provider
			.call(&request)
			.await
			.map_err(|e| RpcError::Network(format!("call failed: {}", e)))?;
		Ok(result.to_vec())
	}

	async fn get_balance(&self, address: &str) -> Result<U256, RpcError> {
		let address = Self::parse_address(address)?;
		self.provider
			.get_balance(address)
			.await
			.map_err(|e| RpcError::Network(format!("failed to get balance: {}", e)))
	}

	async fn get_nonce(&self, address: &str) -> Result<u64, RpcError> {
		let address = Self::parse_address(address)?;
		self.provider
			.get_transaction_count(address)
			.await
			.map_err(|e| RpcError::Network(format!("failed to get nonce: {}", e)))
	}

	async fn gas_price(&self) -> Result<u128, RpcError> {
		self.provider
			.get_gas_price()
			.await
			.map_err(|e| RpcError::Network(format!("failed to get gas price: {}", e)))
	}

	async fn chain_id(&self) -> Result<u64, RpcError> {
		Ok(self.chain_id)
	}

	async fn get_block_number(&self) -> Result<u64, RpcError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| RpcError::Network(format!("failed to get block number: {}", e)))
	}

	async fn subscribe_heads(&self) -> Result<BoxStream<'static, BlockHeader>, RpcError> {
		let ws_url = self
			.websocket_url
			.clone()
			.ok_or(RpcError::StreamingNotSupported)?;

		let ws_provider = ProviderBuilder::new()
			.on_ws(WsConnect::new(ws_url))
			.await
			.map_err(|e| RpcError::Network(format!("websocket connect failed: {}", e)))?;

		let subscription = ws_provider
			.subscribe_blocks()
			.await
			.map_err(|e| RpcError::Network(format!("head subscription failed: {}", e)))?;

		let stream = subscription
			.into_stream()
			.filter_map(|head| async move { normalize_header(&head) })
			.boxed();

		Ok(stream)
	}

	async fn poll_status(&self) -> Result<NetworkStatus, RpcError> {
		let block_number = self.get_block_number().await?;

		let state = if block_number == 0 { "syncing" } else { "synced" };
		let mut status = NetworkStatus {
			block: Some(block_number),
			height: None,
			state: Some(state.to_string()),
			syncing: block_number == 0,
			chain_id: Some(format!("0x{:x}", self.chain_id)),
			last_block_at: None,
			meta: serde_json::Map::new(),
		};

		let latest = self
			.provider
			.get_block_by_number(BlockNumberOrTag::Latest, false.into())
			.await
			.map_err(|e| RpcError::Network(format!("failed to get latest block: {}", e)))?;

		if let Some(block) = latest {
			if let Some(header) = normalize_header(&block) {
				if let Ok(header_json) = serde_json::to_value(&header_to_wire(&header)) {
					status
						.meta
						.insert(META_LAST_BLOCK_HEADER.to_string(), header_json);
				}
			}
		}

		Ok(status)
	}
}

/// Renders a canonical header back into the wire-shaped JSON carried in
/// status metadata.
fn header_to_wire(header: &BlockHeader) -> serde_json::Value {
	serde_json::json!({
		"number": header.number,
		"hash": header.hash,
		"parentHash": header.parent_hash,
		"timestamp": header.timestamp,
		"mixHash": header.mix_hash,
		"nonce": header.nonce,
	})
}
