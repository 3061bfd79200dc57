//! Signer resolution for the nchain transaction pipeline.
//!
//! Given a [`SignerReference`] — an account id or an HD wallet id plus
//! optional derivation path — the resolver loads the referenced record and
//! produces a [`ResolvedSigner`]: a handle exposing the stable on-chain
//! address and the capability to produce a signed, network-ready payload.
//! Resolution itself is pure; key custody mechanics live inside the stored
//! records and the local signer implementation.

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_signer_local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use nchain_storage::{StorageError, StorageService, Table};
use nchain_types::{Account, AmbiguousSigner, SignerReference, Wallet};
use std::sync::Arc;
use thiserror::Error;

/// Derivation path applied when a wallet reference does not carry one and
/// the wallet record has no default.
pub const DEFAULT_HD_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// Errors that can occur during signer resolution and signing.
#[derive(Debug, Error)]
pub enum SignerError {
	/// Both or neither of account and wallet identities were supplied.
	#[error(transparent)]
	Ambiguous(#[from] AmbiguousSigner),
	/// The referenced account or wallet does not exist in the store.
	#[error("signer not found: {0}")]
	NotFound(String),
	/// Key material could not be decoded into a usable signing key.
	#[error("invalid key material: {0}")]
	InvalidKey(String),
	#[error("signing failed: {0}")]
	Signing(String),
	#[error("storage error: {0}")]
	Storage(String),
}

/// The tuple of fields a signer turns into a network-ready payload.
#[derive(Debug, Clone)]
pub struct UnsignedTx {
	pub chain_id: u64,
	pub nonce: u64,
	pub gas_price: u128,
	pub gas_limit: u64,
	/// Destination; `None` denotes contract creation.
	pub to: Option<Address>,
	pub value: U256,
	pub data: Vec<u8>,
}

/// A resolved signing identity: stable address plus raw signing capability.
pub struct ResolvedSigner {
	address: Address,
	key: PrivateKeySigner,
}

impl ResolvedSigner {
	fn new(key: PrivateKeySigner) -> Self {
		Self {
			address: key.address(),
			key,
		}
	}

	/// The signer's stable on-chain address.
	pub fn address(&self) -> Address {
		self.address
	}

	/// Signs the transaction and returns the raw network-ready payload.
	pub fn sign_transaction(&self, unsigned: &UnsignedTx) -> Result<Vec<u8>, SignerError> {
		let mut tx = TxLegacy {
			chain_id: Some(unsigned.chain_id),
			nonce: unsigned.nonce,
			gas_price: unsigned.gas_price,
			gas_limit: unsigned.gas_limit,
			to: match unsigned.to {
				Some(address) => TxKind::Call(address),
				None => TxKind::Create,
			},
			value: unsigned.value,
			input: Bytes::from(unsigned.data.clone()),
		};

		let signature = self
			.key
			.sign_transaction_sync(&mut tx)
			.map_err(|e| SignerError::Signing(e.to_string()))?;

		let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
		Ok(envelope.encoded_2718())
	}
}

/// Resolves signer references against the record store.
pub struct SignerResolver {
	storage: Arc<StorageService>,
}

impl SignerResolver {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Resolves a reference to a concrete signing identity.
	///
	/// Pure resolution: no state is mutated and no network is touched.
	pub async fn resolve(&self, reference: &SignerReference) -> Result<ResolvedSigner, SignerError> {
		match reference {
			SignerReference::Account { account_id } => {
				let account: Account = self
					.storage
					.retrieve(Table::Accounts, &account_id.to_string())
					.await
					.map_err(|e| match e {
						StorageError::NotFound => {
							SignerError::NotFound(format!("account {}", account_id))
						},
						other => SignerError::Storage(other.to_string()),
					})?;
				let key = account.private_key.with_exposed(|key| {
					key.trim_start_matches("0x")
						.parse::<PrivateKeySigner>()
						.map_err(|e| SignerError::InvalidKey(e.to_string()))
				})?;
				Ok(ResolvedSigner::new(key))
			},
			SignerReference::Wallet {
				wallet_id,
				derivation_path,
			} => {
				let wallet: Wallet = self
					.storage
					.retrieve(Table::Wallets, &wallet_id.to_string())
					.await
					.map_err(|e| match e {
						StorageError::NotFound => {
							SignerError::NotFound(format!("wallet {}", wallet_id))
						},
						other => SignerError::Storage(other.to_string()),
					})?;

				let path = derivation_path
					.clone()
					.or_else(|| wallet.default_derivation_path.clone())
					.unwrap_or_else(|| DEFAULT_HD_DERIVATION_PATH.to_string());

				let key = wallet.mnemonic.with_exposed(|phrase| {
					MnemonicBuilder::<English>::default()
						.phrase(phrase)
						.derivation_path(&path)
						.map_err(|e| SignerError::InvalidKey(e.to_string()))?
						.build()
						.map_err(|e| SignerError::InvalidKey(e.to_string()))
				})?;
				Ok(ResolvedSigner::new(key))
			},
		}
	}
}
