//! The `tx` (contract execution) consumer.
//!
//! Resolves the target contract by id with a fallback to its on-chain
//! address, normalizes the embedded signer identity, encodes the method
//! call against the contract's compiled artifact and either serves it as a
//! read-only call or broadcasts a transaction. Contract-resolution and
//! execution failures request redelivery; contradictory identities are
//! dropped permanently.

use crate::abi::{self, EncodedCall};
use crate::handlers::{decode_hex_data, sign_and_broadcast, Disposition};
use crate::Context;
use alloy_primitives::{Address, U256};
use nchain_queue::publish_json;
use nchain_signer::SignerError;
use nchain_types::messages::subjects;
use nchain_types::{ExecuteMessage, Transaction, TransactionStatus, TxParams, TxReceiptMessage};
use uuid::Uuid;

pub async fn handle(ctx: &Context, msg: ExecuteMessage) -> Disposition {
	let signer_ref = match msg.signer() {
		Ok(reference) => reference,
		Err(e) => return Disposition::Reject(format!("invalid tx message; {}", e)),
	};

	let mut contract = match ctx.store.contract_by_id_or_address(&msg.contract_id).await {
		Ok(Some(contract)) => contract,
		Ok(None) => {
			return Disposition::Reject(format!(
				"unable to execute contract; contract not found: {}",
				msg.contract_id
			));
		},
		Err(e) => return Disposition::Retry(format!("failed to resolve contract: {}", e)),
	};

	let Some(network) = ctx.networks.get(&contract.network_id) else {
		return Disposition::Reject(format!(
			"contract {} references unknown network {}",
			contract.id, contract.network_id
		));
	};

	let call = match &msg.data {
		Some(data) => match decode_hex_data(data) {
			Ok(data) => EncodedCall {
				data,
				read_only: false,
			},
			Err(e) => return Disposition::Reject(e),
		},
		None => {
			let Some(artifact) = contract.artifact() else {
				return Disposition::Retry(format!(
					"contract {} has no compiled artifact to encode {} against",
					contract.id, msg.method
				));
			};
			match abi::encode_function_call(&artifact.abi, &msg.method, &msg.params) {
				Ok(call) => call,
				Err(e) => return Disposition::Retry(format!("contract execution failed; {}", e)),
			}
		},
	};

	if !contract.is_deployed() {
		// The creation transaction has not been mined and backfilled yet;
		// redelivery gives it time to land.
		return Disposition::Retry(format!("contract {} address not yet available", contract.id));
	}

	if call.read_only && msg.value == U256::ZERO {
		let rpc = match ctx.rpc.provider(&contract.network_id).await {
			Ok(rpc) => rpc,
			Err(e) => return Disposition::Retry(e.to_string()),
		};
		return match rpc.call(&contract.address, &call.data).await {
			Ok(result) => {
				if let Err(e) = ctx.store.touch_contract(&mut contract).await {
					tracing::warn!(contract_id = %contract.id, error = %e, "failed to stamp contract access");
				}
				tracing::debug!(
					contract = %contract.address,
					response = %format!("0x{}", hex::encode(&result)),
					"executed contract"
				);
				Disposition::Ack
			},
			Err(e) => Disposition::Retry(format!("contract execution failed; {}", e)),
		};
	}

	let signer = match ctx.signers.resolve(&signer_ref).await {
		Ok(signer) => signer,
		Err(
			e @ (SignerError::NotFound(_) | SignerError::Ambiguous(_) | SignerError::InvalidKey(_)),
		) => return Disposition::Reject(e.to_string()),
		Err(e) => return Disposition::Retry(e.to_string()),
	};

	let to: Address = match contract.address.parse() {
		Ok(address) => address,
		Err(e) => {
			return Disposition::Reject(format!(
				"contract {} has an invalid address {}: {}",
				contract.id, contract.address, e
			));
		},
	};

	let params = TxParams {
		method: Some(msg.method.clone()),
		args: msg.params.clone(),
		..TxParams::default()
	};

	match sign_and_broadcast(
		ctx,
		network,
		&signer,
		Some(to),
		msg.value,
		call.data,
		&params,
	)
	.await
	{
		Ok(outcome) => {
			let tx = Transaction {
				id: Uuid::new_v4(),
				application_id: contract.application_id,
				organization_id: contract.organization_id,
				user_id: None,
				network_id: contract.network_id,
				signer: signer_ref,
				to: Some(contract.address.clone()),
				value: msg.value,
				data: None,
				hash: Some(outcome.hash.clone()),
				status: TransactionStatus::Pending,
				block: None,
				block_timestamp: None,
				published_at: Some(msg.published_at.unwrap_or(outcome.broadcast_at)),
				broadcast_at: Some(outcome.broadcast_at),
				finalized_at: None,
				queue_latency_ms: None,
				network_latency_ms: None,
				e2e_latency_ms: None,
				params: Some(params),
				response: None,
				traces: Vec::new(),
				errors: Vec::new(),
			};

			if let Err(e) = ctx.store.insert_transaction(&tx).await {
				return Disposition::Retry(format!("failed to persist transaction: {}", e));
			}
			if let Err(e) = ctx.store.touch_contract(&mut contract).await {
				tracing::warn!(contract_id = %contract.id, error = %e, "failed to stamp contract access");
			}

			let receipt_msg = TxReceiptMessage {
				transaction_id: tx.id,
			};
			if let Err(e) =
				publish_json(ctx.queue.as_ref(), subjects::TX_RECEIPT, &receipt_msg).await
			{
				tracing::warn!(tx_id = %tx.id, error = %e, "failed to enqueue receipt fetch");
			}

			tracing::debug!(contract = %contract.address, tx_hash = %outcome.hash, "executed contract");
			Disposition::Ack
		},
		Err(message) => Disposition::Retry(format!("contract execution failed; {}", message)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testutil::{self, TestHarness};
	use chrono::Utc;
	use serde_json::json;

	fn execute_msg(harness: &TestHarness, method: &str, params: Vec<serde_json::Value>) -> ExecuteMessage {
		ExecuteMessage {
			contract_id: harness.deployed_contract_id.to_string(),
			method: method.into(),
			params,
			value: U256::ZERO,
			account_id: Some(harness.account_id),
			wallet_id: None,
			hd_derivation_path: None,
			account: None,
			wallet: None,
			data: None,
			published_at: Some(Utc::now()),
		}
	}

	#[tokio::test]
	async fn test_execute_broadcasts_state_changing_method() {
		let harness = testutil::harness().await;
		let msg = execute_msg(
			&harness,
			"transfer",
			vec![
				json!("0x00000000000000000000000000000000000000bb"),
				json!(12),
			],
		);

		let disposition = handle(&harness.ctx, msg).await;
		assert_eq!(disposition, Disposition::Ack);
		assert_eq!(harness.rpc.broadcasts.lock().await.len(), 1);
	}

	#[tokio::test]
	async fn test_execute_view_method_uses_call() {
		let harness = testutil::harness().await;
		let msg = execute_msg(
			&harness,
			"balanceOf",
			vec![json!("0x00000000000000000000000000000000000000bb")],
		);

		let disposition = handle(&harness.ctx, msg).await;
		assert_eq!(disposition, Disposition::Ack);
		assert!(harness.rpc.broadcasts.lock().await.is_empty());
		assert_eq!(harness.rpc.calls.lock().await.len(), 1);
	}

	#[tokio::test]
	async fn test_execute_resolves_contract_by_address() {
		let harness = testutil::harness().await;
		let mut msg = execute_msg(
			&harness,
			"balanceOf",
			vec![json!("0x00000000000000000000000000000000000000bb")],
		);
		msg.contract_id = testutil::DEPLOYED_CONTRACT_ADDRESS.to_string();

		assert_eq!(handle(&harness.ctx, msg).await, Disposition::Ack);
	}

	#[tokio::test]
	async fn test_execute_unknown_contract_rejects() {
		let harness = testutil::harness().await;
		let mut msg = execute_msg(&harness, "balanceOf", vec![json!("0x00")]);
		msg.contract_id = Uuid::new_v4().to_string();

		assert!(matches!(
			handle(&harness.ctx, msg).await,
			Disposition::Reject(_)
		));
	}

	#[tokio::test]
	async fn test_execute_contradictory_identity_rejects() {
		let harness = testutil::harness().await;
		let mut msg = execute_msg(&harness, "balanceOf", vec![json!("0x00")]);
		msg.account = Some(nchain_types::EmbeddedIdentity {
			id: Some(Uuid::new_v4()),
			extra: serde_json::Map::new(),
		});

		assert!(matches!(
			handle(&harness.ctx, msg).await,
			Disposition::Reject(_)
		));
	}

	#[tokio::test]
	async fn test_execute_failure_retries() {
		let harness = testutil::harness().await;
		harness.rpc.fail_broadcast("execution reverted").await;
		let msg = execute_msg(
			&harness,
			"transfer",
			vec![
				json!("0x00000000000000000000000000000000000000bb"),
				json!(12),
			],
		);

		assert!(matches!(
			handle(&harness.ctx, msg).await,
			Disposition::Retry(_)
		));
	}

	#[tokio::test]
	async fn test_execute_undeployed_contract_retries() {
		let harness = testutil::harness().await;
		let mut msg = execute_msg(
			&harness,
			"transfer",
			vec![
				json!("0x00000000000000000000000000000000000000bb"),
				json!(12),
			],
		);
		// The undeployed contract still has the placeholder address.
		msg.contract_id = harness.contract_id.to_string();

		assert!(matches!(
			handle(&harness.ctx, msg).await,
			Disposition::Retry(_)
		));
	}
}
