//! Signer identity references.
//!
//! A transaction is signed by exactly one of an account key or an
//! HD-wallet-derived child key. The sum type makes the mutual exclusion
//! structural; `from_parts` is the only way to build one from loosely
//! typed message fields.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error returned when a message supplies both or neither signing identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("exactly one of account_id or wallet_id must be provided")]
pub struct AmbiguousSigner;

/// Reference to the identity that signs a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerReference {
	/// A stored account with its own key material.
	Account { account_id: Uuid },
	/// A child key of a stored HD wallet.
	Wallet {
		wallet_id: Uuid,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		derivation_path: Option<String>,
	},
}

impl SignerReference {
	/// Builds a reference from the optional identity fields of a wire
	/// message, rejecting ambiguous combinations.
	pub fn from_parts(
		account_id: Option<Uuid>,
		wallet_id: Option<Uuid>,
		derivation_path: Option<String>,
	) -> Result<Self, AmbiguousSigner> {
		match (account_id, wallet_id) {
			(Some(account_id), None) => Ok(SignerReference::Account { account_id }),
			(None, Some(wallet_id)) => Ok(SignerReference::Wallet {
				wallet_id,
				derivation_path,
			}),
			_ => Err(AmbiguousSigner),
		}
	}

	pub fn account_id(&self) -> Option<Uuid> {
		match self {
			SignerReference::Account { account_id } => Some(*account_id),
			SignerReference::Wallet { .. } => None,
		}
	}

	pub fn wallet_id(&self) -> Option<Uuid> {
		match self {
			SignerReference::Account { .. } => None,
			SignerReference::Wallet { wallet_id, .. } => Some(*wallet_id),
		}
	}
}
