//! Contract records.
//!
//! A contract row references a deployed or to-be-deployed on-chain program.
//! Its address holds a placeholder until a creation transaction is mined
//! and the lifecycle coordinator backfills it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Address value carried by a contract whose creation transaction has not
/// been mined yet.
pub const CONTRACT_ADDRESS_PLACEHOLDER: &str = "0x";

/// Durable record of an on-chain program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
	pub id: Uuid,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub application_id: Option<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub organization_id: Option<Uuid>,
	pub network_id: Uuid,
	/// The transaction which created the contract, once generated.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transaction_id: Option<Uuid>,
	pub name: String,
	/// Network-specific contract address, placeholder until deployed.
	pub address: String,
	/// Arbitrary parameters; may embed a compiled artifact.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub params: Option<serde_json::Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub accessed_at: Option<DateTime<Utc>>,
}

/// Compiled artifact embedded in contract params: bytecode plus ABI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledArtifact {
	pub abi: serde_json::Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub bytecode: Option<String>,
}

impl Contract {
	/// Whether the contract has a real on-chain address.
	pub fn is_deployed(&self) -> bool {
		self.address != CONTRACT_ADDRESS_PLACEHOLDER && !self.address.is_empty()
	}

	/// Extracts the compiled artifact from params, accepting either a
	/// nested `artifact` object or top-level `abi`/`bytecode` keys.
	pub fn artifact(&self) -> Option<CompiledArtifact> {
		let params = self.params.as_ref()?;
		if let Some(artifact) = params.get("artifact") {
			if let Ok(artifact) = serde_json::from_value(artifact.clone()) {
				return Some(artifact);
			}
		}
		let abi = params.get("abi")?.clone();
		Some(CompiledArtifact {
			abi,
			bytecode: params
				.get("bytecode")
				.and_then(|b| b.as_str())
				.map(str::to_string),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn contract(params: serde_json::Value) -> Contract {
		Contract {
			id: Uuid::new_v4(),
			application_id: None,
			organization_id: None,
			network_id: Uuid::new_v4(),
			transaction_id: None,
			name: "token".into(),
			address: CONTRACT_ADDRESS_PLACEHOLDER.into(),
			params: Some(params),
			accessed_at: None,
		}
	}

	#[test]
	fn test_artifact_nested() {
		let c = contract(json!({"artifact": {"abi": [], "bytecode": "0x6080"}}));
		let artifact = c.artifact().unwrap();
		assert_eq!(artifact.bytecode.as_deref(), Some("0x6080"));
	}

	#[test]
	fn test_artifact_top_level() {
		let c = contract(json!({"abi": [{"type": "function", "name": "get"}]}));
		let artifact = c.artifact().unwrap();
		assert!(artifact.abi.is_array());
		assert!(artifact.bytecode.is_none());
	}

	#[test]
	fn test_undeployed_placeholder() {
		let c = contract(json!({}));
		assert!(!c.is_deployed());
	}
}
