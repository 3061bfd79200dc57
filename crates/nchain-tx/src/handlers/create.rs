//! The `tx.create` consumer.
//!
//! Resolves contract and signer, builds and signs the transaction and
//! attempts broadcast. The row is persisted only on success, so a failed
//! signing or broadcast attempt can always be retried safely. An
//! insufficient-funds failure on a subsidy-enabled network turns into a
//! faucet drip for the signer address instead of a recorded failure.

use crate::handlers::{decode_hex_data, sign_and_broadcast, Disposition};
use crate::{subsidy, Context};
use nchain_queue::publish_json;
use nchain_signer::SignerError;
use nchain_types::messages::subjects;
use nchain_types::{Transaction, TransactionStatus, TxCreateMessage, TxReceiptMessage};
use uuid::Uuid;

pub async fn handle(ctx: &Context, msg: TxCreateMessage) -> Disposition {
	let contract = match ctx.store.contract(&msg.contract_id).await {
		Ok(Some(contract)) => contract,
		Ok(None) => {
			return Disposition::Reject(format!("contract not found: {}", msg.contract_id));
		},
		Err(e) => return Disposition::Retry(format!("failed to load contract: {}", e)),
	};

	let Some(network) = ctx.networks.get(&contract.network_id) else {
		return Disposition::Reject(format!(
			"contract {} references unknown network {}",
			contract.id, contract.network_id
		));
	};

	let signer_ref = match msg.signer() {
		Ok(reference) => reference,
		Err(e) => return Disposition::Reject(e.to_string()),
	};
	let signer = match ctx.signers.resolve(&signer_ref).await {
		Ok(signer) => signer,
		Err(
			e @ (SignerError::NotFound(_) | SignerError::Ambiguous(_) | SignerError::InvalidKey(_)),
		) => return Disposition::Reject(e.to_string()),
		Err(e) => return Disposition::Retry(e.to_string()),
	};

	let data = match decode_hex_data(&msg.data) {
		Ok(data) => data,
		Err(e) => return Disposition::Reject(e),
	};

	match sign_and_broadcast(ctx, network, &signer, None, msg.value, data, &msg.params).await {
		Ok(outcome) => {
			let tx = Transaction {
				id: Uuid::new_v4(),
				application_id: contract.application_id,
				organization_id: contract.organization_id,
				user_id: None,
				network_id: contract.network_id,
				signer: signer_ref,
				to: None,
				value: msg.value,
				data: Some(msg.data.clone()),
				hash: Some(outcome.hash.clone()),
				status: TransactionStatus::Pending,
				block: None,
				block_timestamp: None,
				published_at: Some(msg.published_at),
				broadcast_at: Some(outcome.broadcast_at),
				finalized_at: None,
				queue_latency_ms: None,
				network_latency_ms: None,
				e2e_latency_ms: None,
				params: Some(msg.params.clone()),
				response: None,
				traces: Vec::new(),
				errors: Vec::new(),
			};

			if let Err(e) = ctx.store.insert_transaction(&tx).await {
				return Disposition::Retry(format!("failed to persist transaction: {}", e));
			}

			let mut contract = contract;
			contract.transaction_id = Some(tx.id);
			if let Err(e) = ctx.store.save_contract(&contract).await {
				return Disposition::Retry(format!("failed to persist contract: {}", e));
			}

			// Hand the receipt reconciliation to its own consumer.
			let receipt_msg = TxReceiptMessage {
				transaction_id: tx.id,
			};
			if let Err(e) =
				publish_json(ctx.queue.as_ref(), subjects::TX_RECEIPT, &receipt_msg).await
			{
				tracing::warn!(tx_id = %tx.id, error = %e, "failed to enqueue receipt fetch");
			}

			tracing::debug!(tx_hash = %outcome.hash, "transaction execution successful");
			Disposition::Ack
		},
		Err(message) => {
			if subsidy::is_insufficient_funds(&message) && network.subsidy_eligible() {
				if let Some(payments) = &ctx.payments {
					tracing::debug!(
						network_id = %network.id,
						"transaction execution failed due to insufficient funds but faucet \
						 subsidy exists for network; requesting subsidized tx funding"
					);
					// The faucet beneficiary is the transaction's own signer.
					let beneficiary = format!("{:#x}", signer.address());
					let drip = subsidy::drip_value(network, &ctx.lifecycle);
					let gas = msg.params.gas.unwrap_or(ctx.lifecycle.default_gas_limit);

					return match subsidy::subsidize(
						payments.as_ref(),
						network,
						&beneficiary,
						drip,
						gas,
					)
					.await
					{
						// The failed attempt was never persisted, so the
						// same payload can be resubmitted once the drip
						// lands.
						Ok(()) => Disposition::Ack,
						Err(e) => Disposition::Retry(format!("subsidy payment failed: {}", e)),
					};
				}
			}
			Disposition::Retry(format!("failed to execute transaction; {}", message))
		},
	}
}
