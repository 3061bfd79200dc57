//! Record store facade for the lifecycle coordinator.
//!
//! Wraps the typed storage service with transaction/contract accessors and
//! keeps the secondary index tables (hash → transaction, address →
//! contract, creation transaction → contract) consistent with the primary
//! rows. All mutation is single-row read-modify-write; concurrent receipt
//! and finalize consumers check "is the field already set" before writing.

use chrono::Utc;
use nchain_storage::{StorageError, StorageService, Table};
use nchain_types::{Contract, Transaction, TransactionStatus};
use std::sync::Arc;
use uuid::Uuid;

/// Typed access to transaction and contract records.
pub struct RecordStore {
	storage: Arc<StorageService>,
}

impl RecordStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	/// Persists a new transaction row and its hash index entry.
	pub async fn insert_transaction(&self, tx: &Transaction) -> Result<(), StorageError> {
		self.storage
			.store(Table::Transactions, &tx.id.to_string(), tx)
			.await?;
		if let Some(hash) = &tx.hash {
			self.storage.store(Table::TxByHash, hash, &tx.id).await?;
		}
		Ok(())
	}

	pub async fn transaction(&self, id: &Uuid) -> Result<Transaction, StorageError> {
		self.storage
			.retrieve(Table::Transactions, &id.to_string())
			.await
	}

	/// Looks up a transaction by broadcast hash through the index table.
	pub async fn transaction_by_hash(
		&self,
		hash: &str,
	) -> Result<Option<Transaction>, StorageError> {
		let id: Uuid = match self.storage.retrieve(Table::TxByHash, hash).await {
			Ok(id) => id,
			Err(StorageError::NotFound) => return Ok(None),
			Err(e) => return Err(e),
		};
		match self.transaction(&id).await {
			Ok(tx) => Ok(Some(tx)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Persists an updated transaction row.
	pub async fn put_transaction(&self, tx: &Transaction) -> Result<(), StorageError> {
		self.storage
			.update(Table::Transactions, &tx.id.to_string(), tx)
			.await
	}

	/// Moves a transaction to a new status, appending the optional
	/// description to its error list, and persists the row. Transitions
	/// the state machine does not permit are ignored; re-asserting the
	/// current status is a no-op write.
	pub async fn update_transaction_status(
		&self,
		tx: &mut Transaction,
		status: TransactionStatus,
		description: Option<String>,
	) -> Result<(), StorageError> {
		if tx.status != status {
			if !tx.status.can_transition_to(status) {
				tracing::warn!(
					tx_id = %tx.id,
					from = %tx.status,
					to = %status,
					"ignoring disallowed status transition"
				);
				return Ok(());
			}
			tx.status = status;
		}
		if let Some(description) = description {
			tx.push_error(description);
		}
		self.put_transaction(tx).await
	}

	pub async fn contract(&self, id: &Uuid) -> Result<Option<Contract>, StorageError> {
		match self.storage.retrieve(Table::Contracts, &id.to_string()).await {
			Ok(contract) => Ok(Some(contract)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Resolves a contract by id, falling back to lookup-by-address when
	/// the key does not parse as an id or misses.
	pub async fn contract_by_id_or_address(
		&self,
		key: &str,
	) -> Result<Option<Contract>, StorageError> {
		if let Ok(id) = key.parse::<Uuid>() {
			if let Some(contract) = self.contract(&id).await? {
				return Ok(Some(contract));
			}
		}
		let id: Uuid = match self.storage.retrieve(Table::ContractByAddress, key).await {
			Ok(id) => id,
			Err(StorageError::NotFound) => return Ok(None),
			Err(e) => return Err(e),
		};
		self.contract(&id).await
	}

	/// Resolves the contract created by the given transaction.
	pub async fn contract_by_transaction(
		&self,
		transaction_id: &Uuid,
	) -> Result<Option<Contract>, StorageError> {
		let id: Uuid = match self
			.storage
			.retrieve(Table::ContractByTransaction, &transaction_id.to_string())
			.await
		{
			Ok(id) => id,
			Err(StorageError::NotFound) => return Ok(None),
			Err(e) => return Err(e),
		};
		self.contract(&id).await
	}

	/// Persists a contract row and refreshes its index entries.
	pub async fn save_contract(&self, contract: &Contract) -> Result<(), StorageError> {
		self.storage
			.store(Table::Contracts, &contract.id.to_string(), contract)
			.await?;
		if contract.is_deployed() {
			self.storage
				.store(Table::ContractByAddress, &contract.address, &contract.id)
				.await?;
		}
		if let Some(transaction_id) = &contract.transaction_id {
			self.storage
				.store(
					Table::ContractByTransaction,
					&transaction_id.to_string(),
					&contract.id,
				)
				.await?;
		}
		Ok(())
	}

	/// Stamps a contract's last-accessed time and persists it.
	pub async fn touch_contract(&self, contract: &mut Contract) -> Result<(), StorageError> {
		contract.accessed_at = Some(Utc::now());
		self.save_contract(contract).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::U256;
	use nchain_storage::implementations::memory::MemoryStorage;
	use nchain_types::SignerReference;

	fn store() -> RecordStore {
		RecordStore::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	fn tx(hash: &str) -> Transaction {
		Transaction {
			id: Uuid::new_v4(),
			application_id: None,
			organization_id: None,
			user_id: None,
			network_id: Uuid::new_v4(),
			signer: SignerReference::Account {
				account_id: Uuid::new_v4(),
			},
			to: None,
			value: U256::ZERO,
			data: None,
			hash: Some(hash.to_string()),
			status: TransactionStatus::Pending,
			block: None,
			block_timestamp: None,
			published_at: None,
			broadcast_at: None,
			finalized_at: None,
			queue_latency_ms: None,
			network_latency_ms: None,
			e2e_latency_ms: None,
			params: None,
			response: None,
			traces: Vec::new(),
			errors: Vec::new(),
		}
	}

	#[tokio::test]
	async fn test_transaction_hash_index() {
		let store = store();
		let tx = tx("0xfeed");
		store.insert_transaction(&tx).await.unwrap();

		let found = store.transaction_by_hash("0xfeed").await.unwrap().unwrap();
		assert_eq!(found.id, tx.id);
		assert!(store.transaction_by_hash("0xother").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_status_transition_guard() {
		let store = store();
		let mut tx = tx("0xbeef");
		tx.status = TransactionStatus::Success;
		store.insert_transaction(&tx).await.unwrap();

		// success is terminal; a late failure must not regress it.
		store
			.update_transaction_status(&mut tx, TransactionStatus::Failed, Some("late".into()))
			.await
			.unwrap();
		assert_eq!(tx.status, TransactionStatus::Success);
	}

	#[tokio::test]
	async fn test_contract_lookup_by_address_fallback() {
		let store = store();
		let contract = Contract {
			id: Uuid::new_v4(),
			application_id: None,
			organization_id: None,
			network_id: Uuid::new_v4(),
			transaction_id: None,
			name: "registry".into(),
			address: "0x00000000000000000000000000000000000000aa".into(),
			params: None,
			accessed_at: None,
		};
		store.save_contract(&contract).await.unwrap();

		let by_id = store
			.contract_by_id_or_address(&contract.id.to_string())
			.await
			.unwrap()
			.unwrap();
		assert_eq!(by_id.id, contract.id);

		let by_address = store
			.contract_by_id_or_address("0x00000000000000000000000000000000000000aa")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(by_address.id, contract.id);
	}

	#[tokio::test]
	async fn test_contract_by_transaction_index() {
		let store = store();
		let tx_id = Uuid::new_v4();
		let contract = Contract {
			id: Uuid::new_v4(),
			application_id: None,
			organization_id: None,
			network_id: Uuid::new_v4(),
			transaction_id: Some(tx_id),
			name: "token".into(),
			address: nchain_types::CONTRACT_ADDRESS_PLACEHOLDER.into(),
			params: None,
			accessed_at: None,
		};
		store.save_contract(&contract).await.unwrap();

		let found = store
			.contract_by_transaction(&tx_id)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(found.id, contract.id);
	}
}
