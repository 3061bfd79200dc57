//! Transaction lifecycle coordinator.
//!
//! The coordinator drives the asynchronous state machine behind every
//! transaction: creation and signing off `tx.create`, contract execution
//! off `tx`, finalization off `tx.finalize` and receipt reconciliation off
//! `tx.receipt`. Each subject runs a pool of concurrent handler workers;
//! handlers are idempotent, gate on the row's current status rather than
//! message arrival order, and map their result onto the queue's
//! ack/nack/terminate outcomes. Panics inside a handler are recovered at
//! the worker boundary and converted into permanent rejection so a poison
//! message cannot exhaust the pool.

use futures::FutureExt;
use nchain_config::{LifecycleConfig, QueueConfig, SubjectPolicyConfig};
use nchain_queue::{Delivery, QueueError, QueueInterface, SubjectPolicy};
use nchain_rpc::{PaymentsInterface, RpcService};
use nchain_signer::SignerResolver;
use nchain_storage::StorageService;
use nchain_types::messages::subjects;
use nchain_types::{ExecuteMessage, NetworksConfig, TxCreateMessage, TxFinalizeMessage, TxReceiptMessage};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

pub mod abi;
pub mod handlers;
pub mod store;
pub mod subsidy;

#[cfg(test)]
pub(crate) mod testutil;

pub use handlers::Disposition;
pub use store::RecordStore;

/// Errors that can occur while running the coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
	#[error("configuration error: {0}")]
	Config(String),
	#[error("queue error: {0}")]
	Queue(#[from] QueueError),
}

/// Shared state every handler runs against.
pub struct Context {
	pub networks: NetworksConfig,
	pub lifecycle: LifecycleConfig,
	pub store: RecordStore,
	pub signers: SignerResolver,
	pub rpc: Arc<RpcService>,
	pub payments: Option<Arc<dyn PaymentsInterface>>,
	pub queue: Arc<dyn QueueInterface>,
}

/// Configuration slice the coordinator needs.
pub struct CoordinatorConfig {
	pub networks: NetworksConfig,
	pub lifecycle: LifecycleConfig,
	pub queue: QueueConfig,
}

/// The transaction lifecycle coordinator.
pub struct Coordinator {
	context: Arc<Context>,
	queue_config: QueueConfig,
}

impl Coordinator {
	pub fn new(
		config: CoordinatorConfig,
		storage: Arc<StorageService>,
		rpc: Arc<RpcService>,
		payments: Option<Arc<dyn PaymentsInterface>>,
		queue: Arc<dyn QueueInterface>,
	) -> Self {
		let context = Arc::new(Context {
			networks: config.networks,
			lifecycle: config.lifecycle,
			store: RecordStore::new(storage.clone()),
			signers: SignerResolver::new(storage),
			rpc,
			payments,
			queue,
		});
		Self {
			context,
			queue_config: config.queue,
		}
	}

	pub fn context(&self) -> &Arc<Context> {
		&self.context
	}

	/// Subscribes every lifecycle subject and spawns its worker pool.
	/// Returns the dispatcher handles; dropping or aborting them stops
	/// consumption.
	pub async fn start(&self) -> Result<Vec<JoinHandle<()>>, CoordinatorError> {
		let mut handles = Vec::new();
		for subject in [
			subjects::TX_CREATE,
			subjects::TX,
			subjects::TX_FINALIZE,
			subjects::TX_RECEIPT,
		] {
			let policy = to_subject_policy(&self.queue_config.policy_for(subject));
			let receiver = self.context.queue.subscribe(subject, policy).await?;
			tracing::debug!(subject, "subscribed lifecycle consumer");
			handles.push(tokio::spawn(dispatch(
				subject,
				receiver,
				self.context.clone(),
				self.queue_config.concurrency,
			)));
		}
		Ok(handles)
	}

	/// Runs the coordinator until interrupted.
	pub async fn run(&self) -> Result<(), CoordinatorError> {
		let handles = self.start().await?;
		tokio::signal::ctrl_c().await.ok();
		for handle in handles {
			handle.abort();
		}
		Ok(())
	}
}

fn to_subject_policy(config: &SubjectPolicyConfig) -> SubjectPolicy {
	SubjectPolicy {
		ack_wait: Duration::from_secs(config.ack_wait_secs),
		max_deliveries: config.max_deliveries,
		max_in_flight: config.max_in_flight,
	}
}

/// Worker pool for one subject: deliveries fan out onto handler tasks,
/// bounded by the configured pool width.
async fn dispatch(
	subject: &'static str,
	mut receiver: mpsc::Receiver<Delivery>,
	ctx: Arc<Context>,
	concurrency: usize,
) {
	let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
	while let Some(delivery) = receiver.recv().await {
		let Ok(permit) = semaphore.clone().acquire_owned().await else {
			break;
		};
		let ctx = ctx.clone();
		tokio::spawn(async move {
			let _permit = permit;
			handle_delivery(subject, delivery, &ctx).await;
		});
	}
	tracing::debug!(subject, "lifecycle consumer stopped");
}

async fn handle_delivery(subject: &'static str, delivery: Delivery, ctx: &Context) {
	tracing::debug!(
		subject,
		bytes = delivery.payload().len(),
		attempt = delivery.delivered(),
		"consuming message"
	);

	let disposition = match AssertUnwindSafe(route(subject, delivery.payload(), ctx))
		.catch_unwind()
		.await
	{
		Ok(disposition) => disposition,
		Err(_) => Disposition::Reject("recovered from panic during message handling".to_string()),
	};

	resolve_delivery(subject, disposition, delivery).await;
}

/// Parses the payload for its subject and runs the matching handler.
/// Unparseable payloads are malformed input: they cannot self-heal, so
/// they are permanently rejected rather than retried.
async fn route(subject: &str, payload: &[u8], ctx: &Context) -> Disposition {
	match subject {
		subjects::TX_CREATE => match serde_json::from_slice::<TxCreateMessage>(payload) {
			Ok(msg) => handlers::create::handle(ctx, msg).await,
			Err(e) => Disposition::Reject(format!("failed to unmarshal tx creation message; {}", e)),
		},
		subjects::TX => match serde_json::from_slice::<ExecuteMessage>(payload) {
			Ok(msg) => handlers::execute::handle(ctx, msg).await,
			Err(e) => Disposition::Reject(format!("failed to unmarshal contract execution; {}", e)),
		},
		subjects::TX_FINALIZE => match serde_json::from_slice::<TxFinalizeMessage>(payload) {
			Ok(msg) => handlers::finalize::handle(ctx, msg).await,
			Err(e) => Disposition::Reject(format!("failed to unmarshal tx finalize message; {}", e)),
		},
		subjects::TX_RECEIPT => match serde_json::from_slice::<TxReceiptMessage>(payload) {
			Ok(msg) => handlers::receipt::handle(ctx, msg).await,
			Err(e) => Disposition::Reject(format!("failed to unmarshal tx receipt message; {}", e)),
		},
		other => Disposition::Reject(format!("no handler for subject: {}", other)),
	}
}

async fn resolve_delivery(subject: &str, disposition: Disposition, delivery: Delivery) {
	match disposition {
		Disposition::Ack => {
			if let Err(e) = delivery.ack().await {
				tracing::warn!(subject, error = %e, "failed to ack delivery");
			}
		},
		Disposition::Retry(reason) => {
			tracing::warn!(subject, %reason, "requeueing message for redelivery");
			if let Err(e) = delivery.nack().await {
				tracing::warn!(subject, error = %e, "failed to nack delivery");
			}
		},
		Disposition::Reject(reason) => {
			tracing::warn!(subject, %reason, "dropping message on the floor");
			if let Err(e) = delivery.term().await {
				tracing::warn!(subject, error = %e, "failed to terminate delivery");
			}
		},
		Disposition::Leave(reason) => {
			// Neither ack nor nack: the ack-wait timeout redelivers.
			tracing::debug!(subject, %reason, "leaving delivery pending");
			drop(delivery);
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testutil;
	use alloy_primitives::U256;
	use chrono::Utc;
	use nchain_queue::publish_json;
	use nchain_types::{TransactionStatus, TxParams};

	async fn wait_for<F, Fut>(mut condition: F) -> bool
	where
		F: FnMut() -> Fut,
		Fut: std::future::Future<Output = bool>,
	{
		for _ in 0..100 {
			if condition().await {
				return true;
			}
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;
		}
		false
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_end_to_end_create_through_queue() {
		let harness = testutil::harness().await;
		let ctx = harness.ctx.clone();

		// Wire a coordinator over the harness context's queue and storage.
		let queue_config = nchain_config::QueueConfig::default();
		let mut handles = Vec::new();
		for subject in [
			subjects::TX_CREATE,
			subjects::TX,
			subjects::TX_FINALIZE,
			subjects::TX_RECEIPT,
		] {
			let policy = to_subject_policy(&queue_config.policy_for(subject));
			let receiver = ctx.queue.subscribe(subject, policy).await.unwrap();
			handles.push(tokio::spawn(dispatch(subject, receiver, ctx.clone(), 4)));
		}

		let msg = nchain_types::TxCreateMessage {
			contract_id: harness.contract_id,
			data: "0x6080".into(),
			account_id: Some(harness.account_id),
			wallet_id: None,
			hd_derivation_path: None,
			value: U256::ZERO,
			params: TxParams::default(),
			published_at: Utc::now(),
		};
		publish_json(ctx.queue.as_ref(), subjects::TX_CREATE, &msg)
			.await
			.unwrap();

		// The create consumer persists the row and backfills the
		// contract's creation transaction id.
		let store_ctx = ctx.clone();
		let contract_id = harness.contract_id;
		let done = wait_for(|| {
			let ctx = store_ctx.clone();
			async move {
				matches!(
					ctx.store.contract(&contract_id).await,
					Ok(Some(contract)) if contract.transaction_id.is_some()
				)
			}
		})
		.await;
		assert!(done, "create message was not processed");

		let contract = ctx.store.contract(&contract_id).await.unwrap().unwrap();
		let tx_id = contract.transaction_id.unwrap();
		let tx = ctx.store.transaction(&tx_id).await.unwrap();
		assert_eq!(tx.status, TransactionStatus::Pending);
		assert!(tx.hash.is_some());

		for handle in handles {
			handle.abort();
		}
	}
}
