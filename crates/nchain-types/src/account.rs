//! Account and wallet records.
//!
//! Key material is carried as an opaque [`SecretString`]; decryption and
//! custody mechanics belong to the signing service, not to these records.

use crate::secret_string::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A network-scoped signing account with its own key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
	pub id: Uuid,
	pub network_id: Uuid,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub application_id: Option<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<Uuid>,
	/// Stable on-chain address for the account key.
	pub address: String,
	/// Hex-encoded private key, opaque to everything but the signer.
	pub private_key: SecretString,
}

/// An HD wallet whose child keys sign on behalf of derived identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
	pub id: Uuid,
	pub network_id: Uuid,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub application_id: Option<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<Uuid>,
	/// BIP-39 mnemonic for the master seed, opaque outside the signer.
	pub mnemonic: SecretString,
	/// Derivation path used when a message does not supply one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default_derivation_path: Option<String>,
}
