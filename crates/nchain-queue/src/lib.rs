//! Durable message channel abstraction.
//!
//! The lifecycle consumers sit behind a broker-agnostic contract: subjects
//! carry opaque payloads with at-least-once delivery, and every delivery is
//! resolved with exactly one of three outcomes — acknowledge (done, remove),
//! negative-acknowledge (requeue for retry) or terminate (drop permanently).
//! A delivery left unresolved is redelivered once its ack-wait window
//! expires, up to the subject's delivery limit.
//!
//! The in-memory implementation in [`memory`] provides these semantics for
//! local runs and tests; an external broker slots in behind the same trait.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod memory;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
	/// The queue or subject has shut down.
	#[error("queue closed")]
	Closed,
	#[error("backend error: {0}")]
	Backend(String),
	#[error("configuration error: {0}")]
	Configuration(String),
}

/// Delivery policy for one subject.
#[derive(Debug, Clone)]
pub struct SubjectPolicy {
	/// Visibility timeout: how long a delivery may remain unresolved
	/// before it is redelivered.
	pub ack_wait: Duration,
	/// Total number of deliveries permitted before the message is dropped.
	pub max_deliveries: u32,
	/// Maximum simultaneous unresolved deliveries on the subject.
	pub max_in_flight: usize,
}

impl Default for SubjectPolicy {
	fn default() -> Self {
		Self {
			ack_wait: Duration::from_secs(30),
			max_deliveries: 5,
			max_in_flight: 1024,
		}
	}
}

/// Terminal outcome of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
	Ack,
	Nack,
	Term,
}

/// One delivery of a message to a subscriber.
///
/// The handle must be resolved with [`ack`](Delivery::ack),
/// [`nack`](Delivery::nack) or [`term`](Delivery::term); dropping it
/// unresolved leaves the message in flight until its ack-wait expires.
#[derive(Debug)]
pub struct Delivery {
	subject: String,
	payload: Vec<u8>,
	delivered: u32,
	id: u64,
	outcome_tx: mpsc::UnboundedSender<(u64, Outcome)>,
}

impl Delivery {
	pub(crate) fn new(
		subject: String,
		payload: Vec<u8>,
		delivered: u32,
		id: u64,
		outcome_tx: mpsc::UnboundedSender<(u64, Outcome)>,
	) -> Self {
		Self {
			subject,
			payload,
			delivered,
			id,
			outcome_tx,
		}
	}

	pub fn subject(&self) -> &str {
		&self.subject
	}

	pub fn payload(&self) -> &[u8] {
		&self.payload
	}

	/// Delivery attempt number, starting at 1.
	pub fn delivered(&self) -> u32 {
		self.delivered
	}

	/// Acknowledges the message; it will not be delivered again.
	pub async fn ack(self) -> Result<(), QueueError> {
		self.resolve(Outcome::Ack)
	}

	/// Requeues the message for redelivery, subject to the delivery limit.
	pub async fn nack(self) -> Result<(), QueueError> {
		self.resolve(Outcome::Nack)
	}

	/// Drops the message permanently; no redelivery.
	pub async fn term(self) -> Result<(), QueueError> {
		self.resolve(Outcome::Term)
	}

	fn resolve(self, outcome: Outcome) -> Result<(), QueueError> {
		self.outcome_tx
			.send((self.id, outcome))
			.map_err(|_| QueueError::Closed)
	}
}

/// Broker-agnostic durable pub/sub contract.
#[async_trait]
pub trait QueueInterface: Send + Sync {
	/// Appends a message to the subject's durable log.
	async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), QueueError>;

	/// Registers a subscriber on the subject. The first subscription fixes
	/// the subject's delivery policy; later subscribers join the same
	/// consumer group and share the message stream.
	async fn subscribe(
		&self,
		subject: &str,
		policy: SubjectPolicy,
	) -> Result<mpsc::Receiver<Delivery>, QueueError>;
}

/// Serializes a payload as JSON and publishes it.
pub async fn publish_json<T: Serialize>(
	queue: &dyn QueueInterface,
	subject: &str,
	payload: &T,
) -> Result<(), QueueError> {
	let bytes = serde_json::to_vec(payload).map_err(|e| QueueError::Backend(e.to_string()))?;
	queue.publish(subject, bytes).await
}
