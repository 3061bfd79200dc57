//! Shared fixtures for handler tests: a mock chain, a mock payments
//! service and a fully wired context over in-memory storage and queue.

use crate::{Context, RecordStore};
use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use nchain_config::LifecycleConfig;
use nchain_queue::{memory::MemoryQueue, QueueInterface};
use nchain_rpc::{
	PaymentReceipt, PaymentsError, PaymentsInterface, RpcError, RpcInterface, RpcService,
	TxReceiptData,
};
use nchain_signer::SignerResolver;
use nchain_storage::{implementations::memory::MemoryStorage, StorageService, Table};
use nchain_types::{
	Account, BlockHeader, Contract, FaucetConfig, NetworkConfig, NetworkStatus, SecretString,
	SignerReference, Transaction, TransactionStatus,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const DEV_PRIVATE_KEY: &str =
	"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const DEPLOYED_CONTRACT_ADDRESS: &str = "0x00000000000000000000000000000000000000aa";

/// Scripted chain access: broadcasts succeed with synthetic hashes unless
/// a failure is injected; receipts come from a per-hash table.
pub struct MockRpc {
	pub broadcasts: Mutex<Vec<Vec<u8>>>,
	pub calls: Mutex<Vec<(String, Vec<u8>)>>,
	broadcast_error: Mutex<Option<String>>,
	receipts: Mutex<HashMap<String, Result<Option<TxReceiptData>, String>>>,
	hash_counter: AtomicU64,
}

impl MockRpc {
	pub fn new() -> Self {
		Self {
			broadcasts: Mutex::new(Vec::new()),
			calls: Mutex::new(Vec::new()),
			broadcast_error: Mutex::new(None),
			receipts: Mutex::new(HashMap::new()),
			hash_counter: AtomicU64::new(1),
		}
	}

	pub async fn fail_broadcast(&self, message: &str) {
		*self.broadcast_error.lock().await = Some(message.to_string());
	}

	pub async fn set_receipt(&self, hash: &str, result: Result<Option<TxReceiptData>, String>) {
		self.receipts.lock().await.insert(hash.to_string(), result);
	}
}

#[async_trait]
impl RpcInterface for MockRpc {
	async fn broadcast_raw(&self, raw: &[u8]) -> Result<String, RpcError> {
		if let Some(message) = self.broadcast_error.lock().await.clone() {
			return Err(RpcError::TransactionRejected(message));
		}
		self.broadcasts.lock().await.push(raw.to_vec());
		let n = self.hash_counter.fetch_add(1, Ordering::SeqCst);
		Ok(format!("0x{:064x}", n))
	}

	async fn get_receipt(&self, hash: &str) -> Result<Option<TxReceiptData>, RpcError> {
		match self.receipts.lock().await.get(hash) {
			Some(Ok(receipt)) => Ok(receipt.clone()),
			Some(Err(message)) => Err(RpcError::Network(message.clone())),
			None => Ok(None),
		}
	}

	async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, RpcError> {
		self.calls
			.lock()
			.await
			.push((to.to_string(), data.to_vec()));
		Ok(vec![0u8; 32])
	}

	async fn get_balance(&self, _address: &str) -> Result<U256, RpcError> {
		Ok(U256::ZERO)
	}

	async fn get_nonce(&self, _address: &str) -> Result<u64, RpcError> {
		Ok(7)
	}

	async fn gas_price(&self) -> Result<u128, RpcError> {
		Ok(1_000_000_000)
	}

	async fn chain_id(&self) -> Result<u64, RpcError> {
		Ok(3)
	}

	async fn get_block_number(&self) -> Result<u64, RpcError> {
		Ok(100)
	}

	async fn subscribe_heads(&self) -> Result<BoxStream<'static, BlockHeader>, RpcError> {
		Err(RpcError::StreamingNotSupported)
	}

	async fn poll_status(&self) -> Result<NetworkStatus, RpcError> {
		Ok(NetworkStatus::default())
	}
}

/// Records subsidy requests instead of calling out.
pub struct MockPayments {
	pub requests: Mutex<Vec<(String, U256)>>,
}

impl MockPayments {
	pub fn new() -> Self {
		Self {
			requests: Mutex::new(Vec::new()),
		}
	}
}

#[async_trait]
impl PaymentsInterface for MockPayments {
	async fn create_payment(
		&self,
		beneficiary: &str,
		value: U256,
		_data: &str,
	) -> Result<PaymentReceipt, PaymentsError> {
		self.requests
			.lock()
			.await
			.push((beneficiary.to_string(), value));
		Ok(PaymentReceipt {
			reference: Some("0xsubsidy".to_string()),
		})
	}
}

pub struct TestHarness {
	pub ctx: Arc<Context>,
	pub rpc: Arc<MockRpc>,
	pub payments: Arc<MockPayments>,
	pub queue: Arc<MemoryQueue>,
	pub network_id: Uuid,
	pub account_id: Uuid,
	/// Contract with the placeholder address, awaiting deployment.
	pub contract_id: Uuid,
	/// Contract with a real address and a compiled artifact.
	pub deployed_contract_id: Uuid,
}

impl TestHarness {
	pub async fn insert_pending_tx(
		&self,
		hash: &str,
		published_at: DateTime<Utc>,
		broadcast_at: DateTime<Utc>,
	) -> Transaction {
		let tx = Transaction {
			id: Uuid::new_v4(),
			application_id: None,
			organization_id: None,
			user_id: None,
			network_id: self.network_id,
			signer: SignerReference::Account {
				account_id: self.account_id,
			},
			to: None,
			value: U256::ZERO,
			data: None,
			hash: Some(hash.to_string()),
			status: TransactionStatus::Pending,
			block: None,
			block_timestamp: None,
			published_at: Some(published_at),
			broadcast_at: Some(broadcast_at),
			finalized_at: None,
			queue_latency_ms: None,
			network_latency_ms: None,
			e2e_latency_ms: None,
			params: None,
			response: None,
			traces: Vec::new(),
			errors: Vec::new(),
		};
		self.ctx.store.insert_transaction(&tx).await.unwrap();
		tx
	}
}

pub async fn harness() -> TestHarness {
	build_harness(true).await
}

pub async fn harness_without_faucet() -> TestHarness {
	build_harness(false).await
}

async fn build_harness(faucet: bool) -> TestHarness {
	let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));

	let network_id = Uuid::new_v4();
	let network = NetworkConfig {
		id: network_id,
		name: "testnet".into(),
		chain_id: 3,
		rpc_url: Some("http://127.0.0.1:8545".into()),
		websocket_url: None,
		peers: vec!["enode://peer@127.0.0.1:30303".into()],
		faucet: faucet.then(|| FaucetConfig { drip_wei: None }),
	};
	let mut networks = HashMap::new();
	networks.insert(network_id, network);

	let rpc = Arc::new(MockRpc::new());
	let rpc_service = Arc::new(RpcService::new());
	rpc_service
		.insert_provider(network_id, rpc.clone() as Arc<dyn RpcInterface>)
		.await;

	let payments = Arc::new(MockPayments::new());
	let queue = Arc::new(MemoryQueue::new());

	let account_id = Uuid::new_v4();
	let account = Account {
		id: account_id,
		network_id,
		application_id: None,
		user_id: None,
		address: DEV_ADDRESS.to_string(),
		private_key: SecretString::from(DEV_PRIVATE_KEY),
	};
	storage
		.store(Table::Accounts, &account_id.to_string(), &account)
		.await
		.unwrap();

	let ctx = Arc::new(Context {
		networks,
		lifecycle: LifecycleConfig::default(),
		store: RecordStore::new(storage.clone()),
		signers: SignerResolver::new(storage),
		rpc: rpc_service,
		payments: Some(payments.clone() as Arc<dyn PaymentsInterface>),
		queue: queue.clone() as Arc<dyn QueueInterface>,
	});

	let contract_id = Uuid::new_v4();
	ctx.store
		.save_contract(&Contract {
			id: contract_id,
			application_id: Some(Uuid::new_v4()),
			organization_id: None,
			network_id,
			transaction_id: None,
			name: "registry".into(),
			address: nchain_types::CONTRACT_ADDRESS_PLACEHOLDER.into(),
			params: None,
			accessed_at: None,
		})
		.await
		.unwrap();

	let deployed_contract_id = Uuid::new_v4();
	ctx.store
		.save_contract(&Contract {
			id: deployed_contract_id,
			application_id: Some(Uuid::new_v4()),
			organization_id: None,
			network_id,
			transaction_id: None,
			name: "token".into(),
			address: DEPLOYED_CONTRACT_ADDRESS.into(),
			params: Some(json!({
				"abi": [
					{
						"type": "function",
						"name": "transfer",
						"stateMutability": "nonpayable",
						"inputs": [
							{"name": "to", "type": "address"},
							{"name": "amount", "type": "uint256"}
						],
						"outputs": [{"name": "", "type": "bool"}]
					},
					{
						"type": "function",
						"name": "balanceOf",
						"stateMutability": "view",
						"inputs": [{"name": "owner", "type": "address"}],
						"outputs": [{"name": "", "type": "uint256"}]
					}
				]
			})),
			accessed_at: None,
		})
		.await
		.unwrap();

	TestHarness {
		ctx,
		rpc,
		payments,
		queue,
		network_id,
		account_id,
		contract_id,
		deployed_contract_id,
	}
}
