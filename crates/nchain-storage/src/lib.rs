//! Durable record store for the nchain service.
//!
//! This crate provides the storage abstraction behind the transaction and
//! contract records, with pluggable backends (in-memory, file-based). The
//! typed [`StorageService`] layers JSON serialization and namespaced keys
//! over a byte-level backend. Cross-reference lookups (transaction by
//! broadcast hash, contract by on-chain address) go through explicit index
//! tables maintained by the lifecycle coordinator.

use async_trait::async_trait;
use nchain_types::ConfigSchema;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// The requested record does not exist.
	#[error("not found")]
	NotFound,
	#[error("serialization error: {0}")]
	Serialization(String),
	#[error("backend error: {0}")]
	Backend(String),
	#[error("configuration error: {0}")]
	Configuration(String),
}

/// Record namespaces. Index tables map a secondary key to the id of a
/// record in a primary table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
	Transactions,
	Contracts,
	Accounts,
	Wallets,
	/// broadcast hash → transaction id
	TxByHash,
	/// on-chain address → contract id
	ContractByAddress,
	/// creation transaction id → contract id
	ContractByTransaction,
}

impl Table {
	pub fn as_str(&self) -> &'static str {
		match self {
			Table::Transactions => "transactions",
			Table::Contracts => "contracts",
			Table::Accounts => "accounts",
			Table::Wallets => "wallets",
			Table::TxByHash => "tx_by_hash",
			Table::ContractByAddress => "contract_by_address",
			Table::ContractByTransaction => "contract_by_tx",
		}
	}
}

/// Low-level interface implemented by storage backends.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes under the given key, creating or overwriting.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// All registered storage implementations as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		("file", file::create_storage),
		("memory", memory::create_storage),
	]
}

/// Typed storage service over a byte-level backend.
///
/// Keys are `table:id`; values are JSON documents.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(table: Table, id: &str) -> String {
		format!("{}:{}", table.as_str(), id)
	}

	/// Stores a record, creating or overwriting.
	pub async fn store<T: Serialize>(
		&self,
		table: Table,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&Self::key(table, id), bytes).await
	}

	/// Retrieves and deserializes a record.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		table: Table,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(table, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Updates an existing record; fails with `NotFound` when absent,
	/// distinguishing it from `store` which creates.
	pub async fn update<T: Serialize>(
		&self,
		table: Table,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = Self::key(table, id);
		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes).await
	}

	/// Removes a record. Removing an absent record is not an error.
	pub async fn remove(&self, table: Table, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(table, id)).await
	}

	pub async fn exists(&self, table: Table, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(table, id)).await
	}
}
