//! The `tx.receipt` consumer.
//!
//! Fetches the on-chain receipt for a broadcast transaction and reconciles
//! it against the local record: block number and finalized timestamp are
//! backfilled when the receipt carries them, and a contract-creation
//! transaction backfills the created contract's address. A fetch failure
//! leaves the delivery pending so the ack-wait timeout drives redelivery
//! without marking the transaction failed prematurely.

use crate::handlers::Disposition;
use crate::Context;
use chrono::Utc;
use nchain_storage::StorageError;
use nchain_types::{TransactionStatus, TxReceiptMessage};

pub async fn handle(ctx: &Context, msg: TxReceiptMessage) -> Disposition {
	let mut tx = match ctx.store.transaction(&msg.transaction_id).await {
		Ok(tx) => tx,
		Err(StorageError::NotFound) => {
			return Disposition::Reject(format!(
				"failed to fetch tx receipt; no tx resolved for id: {}",
				msg.transaction_id
			));
		},
		Err(e) => return Disposition::Retry(format!("failed to load tx: {}", e)),
	};

	if let Err(e) = ctx.signers.resolve(&tx.signer).await {
		let desc = "failed to resolve tx signing account or HD wallet".to_string();
		tracing::warn!(tx_id = %tx.id, error = %e, "{}", desc);
		if let Err(e) = ctx
			.store
			.update_transaction_status(&mut tx, TransactionStatus::Failed, Some(desc.clone()))
			.await
		{
			tracing::error!(tx_id = %tx.id, error = %e, "failed to persist failed status");
		}
		return Disposition::Retry(desc);
	}

	let Some(hash) = tx.hash.clone() else {
		return Disposition::Reject(format!("tx {} has no broadcast hash", tx.id));
	};

	let rpc = match ctx.rpc.provider(&tx.network_id).await {
		Ok(rpc) => rpc,
		Err(e) => return Disposition::Leave(e.to_string()),
	};

	let receipt = match rpc.get_receipt(&hash).await {
		Ok(Some(receipt)) => receipt,
		Ok(None) => return Disposition::Leave("receipt not yet available".to_string()),
		Err(e) => {
			tracing::debug!(tx_hash = %hash, error = %e, "failed to fetch tx receipt");
			return Disposition::Leave(e.to_string());
		},
	};

	tracing::debug!(tx_hash = %hash, "fetched tx receipt");

	// Backfill block data only when the receipt carries it and the local
	// record has none; repeated deliveries are no-ops.
	if let (Some(block), None) = (receipt.block_number, tx.block) {
		tx.block = Some(block);
		tx.finalized_at = Some(Utc::now());
		tracing::debug!(tx_hash = %hash, block, "tx finalized via receipt backfill");
	}

	// A creation transaction carries the deployed contract address.
	if tx.to.is_none() {
		if let Some(address) = &receipt.contract_address {
			match ctx.store.contract_by_transaction(&tx.id).await {
				Ok(Some(mut contract)) if !contract.is_deployed() => {
					contract.address = address.clone();
					if let Err(e) = ctx.store.save_contract(&contract).await {
						tracing::warn!(
							contract_id = %contract.id,
							error = %e,
							"failed to backfill contract address"
						);
					} else {
						tracing::debug!(
							contract_id = %contract.id,
							address = %address,
							"backfilled contract address from receipt"
						);
					}
				},
				Ok(_) => {},
				Err(e) => {
					tracing::warn!(tx_id = %tx.id, error = %e, "failed to resolve created contract");
				},
			}
		}
	}

	match serde_json::to_value(&receipt) {
		Ok(receipt_json) => tx.response = Some(serde_json::json!({ "receipt": receipt_json })),
		Err(e) => tracing::warn!(tx_id = %tx.id, error = %e, "failed to serialize receipt"),
	}

	if let Err(e) = ctx
		.store
		.update_transaction_status(&mut tx, TransactionStatus::Success, None)
		.await
	{
		return Disposition::Retry(format!("failed to persist tx receipt: {}", e));
	}

	Disposition::Ack
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testutil;
	use chrono::{DateTime, Utc};
	use nchain_rpc::TxReceiptData;
	use nchain_types::SignerReference;
	use uuid::Uuid;

	fn ts(s: &str) -> DateTime<Utc> {
		s.parse().unwrap()
	}

	#[tokio::test]
	async fn test_receipt_backfills_block_and_contract_address() {
		let harness = testutil::harness().await;
		let tx = harness
			.insert_pending_tx("0xaaa", ts("2024-01-01T00:00:00Z"), ts("2024-01-01T00:00:01Z"))
			.await;

		// Link the undeployed contract to its creation transaction.
		let mut contract = harness
			.ctx
			.store
			.contract(&harness.contract_id)
			.await
			.unwrap()
			.unwrap();
		contract.transaction_id = Some(tx.id);
		harness.ctx.store.save_contract(&contract).await.unwrap();

		harness
			.rpc
			.set_receipt(
				"0xaaa",
				Ok(Some(TxReceiptData {
					hash: "0xaaa".into(),
					block_number: Some(777),
					success: true,
					contract_address: Some(
						"0x00000000000000000000000000000000000000cc".into(),
					),
				})),
			)
			.await;

		let disposition = handle(
			&harness.ctx,
			TxReceiptMessage {
				transaction_id: tx.id,
			},
		)
		.await;
		assert_eq!(disposition, Disposition::Ack);

		let updated = harness.ctx.store.transaction(&tx.id).await.unwrap();
		assert_eq!(updated.block, Some(777));
		assert_eq!(updated.status, TransactionStatus::Success);
		assert!(updated.finalized_at.is_some());

		let contract = harness
			.ctx
			.store
			.contract(&harness.contract_id)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(
			contract.address,
			"0x00000000000000000000000000000000000000cc"
		);
	}

	#[tokio::test]
	async fn test_receipt_unknown_tx_rejects() {
		let harness = testutil::harness().await;
		let disposition = handle(
			&harness.ctx,
			TxReceiptMessage {
				transaction_id: Uuid::new_v4(),
			},
		)
		.await;
		assert!(matches!(disposition, Disposition::Reject(_)));
	}

	#[tokio::test]
	async fn test_receipt_unresolvable_signer_marks_failed_and_retries() {
		let harness = testutil::harness().await;
		let mut tx = harness
			.insert_pending_tx("0xbbb", ts("2024-01-01T00:00:00Z"), ts("2024-01-01T00:00:01Z"))
			.await;
		// Point the row at a signer that does not resolve.
		tx.signer = SignerReference::Account {
			account_id: Uuid::new_v4(),
		};
		harness.ctx.store.put_transaction(&tx).await.unwrap();

		let disposition = handle(
			&harness.ctx,
			TxReceiptMessage {
				transaction_id: tx.id,
			},
		)
		.await;
		assert!(matches!(disposition, Disposition::Retry(_)));

		let updated = harness.ctx.store.transaction(&tx.id).await.unwrap();
		assert_eq!(updated.status, TransactionStatus::Failed);
		assert!(!updated.errors.is_empty());
	}

	#[tokio::test]
	async fn test_receipt_fetch_failure_leaves_delivery_pending() {
		let harness = testutil::harness().await;
		let tx = harness
			.insert_pending_tx("0xccc", ts("2024-01-01T00:00:00Z"), ts("2024-01-01T00:00:01Z"))
			.await;
		harness
			.rpc
			.set_receipt("0xccc", Err("connection refused".into()))
			.await;

		let disposition = handle(
			&harness.ctx,
			TxReceiptMessage {
				transaction_id: tx.id,
			},
		)
		.await;
		assert!(matches!(disposition, Disposition::Leave(_)));

		// The transaction is not marked failed by a transient fetch error.
		let updated = harness.ctx.store.transaction(&tx.id).await.unwrap();
		assert_eq!(updated.status, TransactionStatus::Pending);
	}

	#[tokio::test]
	async fn test_receipt_not_yet_mined_leaves_delivery_pending() {
		let harness = testutil::harness().await;
		let tx = harness
			.insert_pending_tx("0xddd", ts("2024-01-01T00:00:00Z"), ts("2024-01-01T00:00:01Z"))
			.await;
		harness.rpc.set_receipt("0xddd", Ok(None)).await;

		let disposition = handle(
			&harness.ctx,
			TxReceiptMessage {
				transaction_id: tx.id,
			},
		)
		.await;
		assert!(matches!(disposition, Disposition::Leave(_)));
	}
}
