//! In-memory queue with durable-consumer semantics.
//!
//! Each subject runs one dispatcher task owning the subject's pending
//! queue and in-flight table. Deliveries flow to subscribers round-robin,
//! bounded by the subject's max-in-flight; unresolved deliveries return to
//! the pending queue when their ack-wait deadline passes. A message whose
//! delivery count reaches the subject limit is dropped and logged.

use crate::{Delivery, Outcome, QueueError, QueueInterface, SubjectPolicy};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

/// In-memory queue implementation.
pub struct MemoryQueue {
	subjects: Mutex<HashMap<String, SubjectHandle>>,
}

struct SubjectHandle {
	publish_tx: mpsc::UnboundedSender<Vec<u8>>,
	control_tx: mpsc::UnboundedSender<Control>,
}

enum Control {
	Subscribe(mpsc::Sender<Delivery>, SubjectPolicy),
}

impl MemoryQueue {
	pub fn new() -> Self {
		Self {
			subjects: Mutex::new(HashMap::new()),
		}
	}

	async fn ensure_subject(&self, subject: &str) -> SubjectHandle {
		let mut subjects = self.subjects.lock().await;
		let handle = subjects.entry(subject.to_string()).or_insert_with(|| {
			let (publish_tx, publish_rx) = mpsc::unbounded_channel();
			let (control_tx, control_rx) = mpsc::unbounded_channel();
			let dispatcher = Dispatcher::new(subject.to_string(), publish_rx, control_rx);
			tokio::spawn(dispatcher.run());
			SubjectHandle {
				publish_tx,
				control_tx,
			}
		});
		SubjectHandle {
			publish_tx: handle.publish_tx.clone(),
			control_tx: handle.control_tx.clone(),
		}
	}
}

impl Default for MemoryQueue {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl QueueInterface for MemoryQueue {
	async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), QueueError> {
		let handle = self.ensure_subject(subject).await;
		handle
			.publish_tx
			.send(payload)
			.map_err(|_| QueueError::Closed)
	}

	async fn subscribe(
		&self,
		subject: &str,
		policy: SubjectPolicy,
	) -> Result<mpsc::Receiver<Delivery>, QueueError> {
		if policy.max_in_flight == 0 || policy.max_deliveries == 0 {
			return Err(QueueError::Configuration(
				"max_in_flight and max_deliveries must be at least 1".into(),
			));
		}
		let handle = self.ensure_subject(subject).await;
		let (delivery_tx, delivery_rx) = mpsc::channel(policy.max_in_flight);
		handle
			.control_tx
			.send(Control::Subscribe(delivery_tx, policy))
			.map_err(|_| QueueError::Closed)?;
		Ok(delivery_rx)
	}
}

struct StoredMessage {
	payload: Vec<u8>,
	delivered: u32,
}

struct InFlight {
	message: StoredMessage,
	deadline: Instant,
}

struct Dispatcher {
	subject: String,
	publish_rx: mpsc::UnboundedReceiver<Vec<u8>>,
	control_rx: mpsc::UnboundedReceiver<Control>,
	outcome_tx: mpsc::UnboundedSender<(u64, Outcome)>,
	outcome_rx: mpsc::UnboundedReceiver<(u64, Outcome)>,
	pending: VecDeque<StoredMessage>,
	in_flight: HashMap<u64, InFlight>,
	subscribers: Vec<mpsc::Sender<Delivery>>,
	next_subscriber: usize,
	policy: SubjectPolicy,
	next_id: u64,
}

impl Dispatcher {
	fn new(
		subject: String,
		publish_rx: mpsc::UnboundedReceiver<Vec<u8>>,
		control_rx: mpsc::UnboundedReceiver<Control>,
	) -> Self {
		let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
		Self {
			subject,
			publish_rx,
			control_rx,
			outcome_tx,
			outcome_rx,
			pending: VecDeque::new(),
			in_flight: HashMap::new(),
			subscribers: Vec::new(),
			next_subscriber: 0,
			policy: SubjectPolicy::default(),
			next_id: 0,
		}
	}

	async fn run(mut self) {
		loop {
			self.dispatch();

			let next_deadline = self.in_flight.values().map(|f| f.deadline).min();
			let sleep_target =
				next_deadline.unwrap_or_else(|| Instant::now() + std::time::Duration::from_secs(3600));

			tokio::select! {
				maybe = self.publish_rx.recv() => match maybe {
					Some(payload) => self.pending.push_back(StoredMessage {
						payload,
						delivered: 0,
					}),
					// Queue handle dropped; drain and exit.
					None => return,
				},
				maybe = self.control_rx.recv() => match maybe {
					Some(Control::Subscribe(sender, policy)) => {
						// The first subscription fixes the subject policy.
						if self.subscribers.is_empty() {
							self.policy = policy;
						}
						self.subscribers.push(sender);
					},
					None => return,
				},
				Some((id, outcome)) = self.outcome_rx.recv() => self.apply_outcome(id, outcome),
				_ = tokio::time::sleep_until(sleep_target), if next_deadline.is_some() => {
					self.expire(Instant::now());
				},
			}
		}
	}

	/// Moves pending messages into flight while capacity and subscribers
	/// allow.
	fn dispatch(&mut self) {
		while self.in_flight.len() < self.policy.max_in_flight
			&& !self.pending.is_empty()
			&& !self.subscribers.is_empty()
		{
			let mut message = match self.pending.pop_front() {
				Some(m) => m,
				None => return,
			};
			message.delivered += 1;

			let id = self.next_id;
			self.next_id += 1;

			let delivery = Delivery::new(
				self.subject.clone(),
				message.payload.clone(),
				message.delivered,
				id,
				self.outcome_tx.clone(),
			);

			match self.send_round_robin(delivery) {
				Ok(()) => {
					self.in_flight.insert(
						id,
						InFlight {
							message,
							deadline: Instant::now() + self.policy.ack_wait,
						},
					);
				},
				Err(()) => {
					// No subscriber could take it; undo and wait.
					message.delivered -= 1;
					self.pending.push_front(message);
					return;
				},
			}
		}
	}

	fn send_round_robin(&mut self, mut delivery: Delivery) -> Result<(), ()> {
		let mut attempts = self.subscribers.len();
		while attempts > 0 && !self.subscribers.is_empty() {
			let index = self.next_subscriber % self.subscribers.len();
			self.next_subscriber = self.next_subscriber.wrapping_add(1);
			match self.subscribers[index].try_send(delivery) {
				Ok(()) => return Ok(()),
				Err(mpsc::error::TrySendError::Full(returned)) => {
					delivery = returned;
					attempts -= 1;
				},
				Err(mpsc::error::TrySendError::Closed(returned)) => {
					delivery = returned;
					self.subscribers.remove(index);
					attempts = attempts.saturating_sub(1);
				},
			}
		}
		Err(())
	}

	fn apply_outcome(&mut self, id: u64, outcome: Outcome) {
		let Some(flight) = self.in_flight.remove(&id) else {
			// Already expired and requeued; the late outcome is moot.
			return;
		};
		match outcome {
			Outcome::Ack => {},
			Outcome::Term => {
				tracing::debug!(subject = %self.subject, "message terminated");
			},
			Outcome::Nack => self.requeue(flight.message),
		}
	}

	fn expire(&mut self, now: Instant) {
		let expired: Vec<u64> = self
			.in_flight
			.iter()
			.filter(|(_, f)| f.deadline <= now)
			.map(|(id, _)| *id)
			.collect();
		for id in expired {
			if let Some(flight) = self.in_flight.remove(&id) {
				tracing::debug!(subject = %self.subject, "ack wait expired; requeueing delivery");
				self.requeue(flight.message);
			}
		}
	}

	fn requeue(&mut self, message: StoredMessage) {
		if message.delivered >= self.policy.max_deliveries {
			tracing::warn!(
				subject = %self.subject,
				deliveries = message.delivered,
				"message exhausted its delivery limit; dropping"
			);
			return;
		}
		self.pending.push_back(message);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	fn policy(ack_wait_ms: u64, max_deliveries: u32, max_in_flight: usize) -> SubjectPolicy {
		SubjectPolicy {
			ack_wait: Duration::from_millis(ack_wait_ms),
			max_deliveries,
			max_in_flight,
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_ack_removes_message() {
		let queue = MemoryQueue::new();
		let mut rx = queue.subscribe("t", policy(1_000, 5, 16)).await.unwrap();
		queue.publish("t", b"one".to_vec()).await.unwrap();

		let delivery = rx.recv().await.unwrap();
		assert_eq!(delivery.payload(), b"one");
		assert_eq!(delivery.delivered(), 1);
		delivery.ack().await.unwrap();

		// Nothing is redelivered after the ack-wait window.
		tokio::time::advance(Duration::from_secs(5)).await;
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test(start_paused = true)]
	async fn test_nack_redelivers_immediately() {
		let queue = MemoryQueue::new();
		let mut rx = queue.subscribe("t", policy(60_000, 5, 16)).await.unwrap();
		queue.publish("t", b"m".to_vec()).await.unwrap();

		rx.recv().await.unwrap().nack().await.unwrap();
		let second = rx.recv().await.unwrap();
		assert_eq!(second.delivered(), 2);
		second.ack().await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn test_term_prevents_redelivery() {
		let queue = MemoryQueue::new();
		let mut rx = queue.subscribe("t", policy(50, 5, 16)).await.unwrap();
		queue.publish("t", b"poison".to_vec()).await.unwrap();

		rx.recv().await.unwrap().term().await.unwrap();
		tokio::time::advance(Duration::from_secs(5)).await;
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test(start_paused = true)]
	async fn test_unresolved_delivery_times_out_and_redelivers() {
		let queue = MemoryQueue::new();
		let mut rx = queue.subscribe("t", policy(100, 5, 16)).await.unwrap();
		queue.publish("t", b"slow".to_vec()).await.unwrap();

		// Drop the delivery without resolving it.
		drop(rx.recv().await.unwrap());

		let redelivered = rx.recv().await.unwrap();
		assert_eq!(redelivered.delivered(), 2);
		redelivered.ack().await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn test_max_deliveries_drops_message() {
		let queue = MemoryQueue::new();
		let mut rx = queue.subscribe("t", policy(60_000, 3, 16)).await.unwrap();
		queue.publish("t", b"flaky".to_vec()).await.unwrap();

		for expected in 1..=3u32 {
			let delivery = rx.recv().await.unwrap();
			assert_eq!(delivery.delivered(), expected);
			delivery.nack().await.unwrap();
		}

		// The third nack exhausted the limit.
		tokio::time::advance(Duration::from_secs(120)).await;
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test(start_paused = true)]
	async fn test_max_in_flight_bounds_deliveries() {
		let queue = MemoryQueue::new();
		let mut rx = queue.subscribe("t", policy(60_000, 5, 1)).await.unwrap();
		queue.publish("t", b"a".to_vec()).await.unwrap();
		queue.publish("t", b"b".to_vec()).await.unwrap();

		let first = rx.recv().await.unwrap();
		// The second message must wait for the first to resolve.
		tokio::task::yield_now().await;
		assert!(rx.try_recv().is_err());

		first.ack().await.unwrap();
		let second = rx.recv().await.unwrap();
		assert_eq!(second.payload(), b"b");
		second.ack().await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn test_publish_before_subscribe_is_buffered() {
		let queue = MemoryQueue::new();
		queue.publish("t", b"early".to_vec()).await.unwrap();

		let mut rx = queue.subscribe("t", policy(1_000, 5, 16)).await.unwrap();
		let delivery = rx.recv().await.unwrap();
		assert_eq!(delivery.payload(), b"early");
		delivery.ack().await.unwrap();
	}
}
