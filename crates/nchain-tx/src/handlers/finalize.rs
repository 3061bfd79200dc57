//! The `tx.finalize` consumer.
//!
//! Applies a chain observer's finalization notice to the local record:
//! block number and timestamps land on the row, the latency metrics are
//! derived, and the status goes terminal. Only rows still `pending` or
//! `failed` accept a finalize; anything else is treated as out-of-order or
//! duplicate delivery and dropped permanently.

use crate::handlers::Disposition;
use crate::Context;
use nchain_types::{TransactionStatus, TxFinalizeMessage};

pub async fn handle(ctx: &Context, msg: TxFinalizeMessage) -> Disposition {
	tracing::trace!(tx_hash = %msg.hash, "checking local record for tx status");

	let mut tx = match ctx.store.transaction_by_hash(&msg.hash).await {
		Ok(Some(tx)) => tx,
		Ok(None) => {
			return Disposition::Reject(format!(
				"failed to mark block and finalized_at timestamp on tx: {}; tx not found for given hash",
				msg.hash
			));
		},
		Err(e) => return Disposition::Retry(format!("failed to load tx: {}", e)),
	};

	if !matches!(
		tx.status,
		TransactionStatus::Pending | TransactionStatus::Failed
	) {
		return Disposition::Reject(format!(
			"tx {} is no longer pending or failed; status: {}",
			tx.id, tx.status
		));
	}

	tx.block = Some(msg.block);
	tx.block_timestamp = Some(msg.block_timestamp);
	tx.finalized_at = Some(msg.finalized_at);
	if tx.compute_latencies() {
		tracing::warn!(
			tx_id = %tx.id,
			"clock skew detected while computing latency metrics; clamped to zero"
		);
	}

	if let Err(e) = ctx
		.store
		.update_transaction_status(&mut tx, TransactionStatus::Success, None)
		.await
	{
		return Disposition::Retry(format!(
			"failed to set block and finalized_at timestamp on tx: {}; {}",
			msg.hash, e
		));
	}

	Disposition::Ack
}
