//! Per-network real-time statistics daemons.
//!
//! A stats daemon consumes a network's head stream (or falls back to
//! JSON-RPC polling), folds every ingested header into a bounded
//! recent-block window and derives rolling block-time statistics into a
//! local status snapshot. Transport failures reconnect under exponential
//! backoff. The [`registry`] guarantees at most one live daemon per
//! network and owns eviction.

use thiserror::Error;

pub mod daemon;
pub mod registry;
pub mod window;

pub use daemon::{Backoff, StatsDaemon};
pub use registry::StatsRegistry;
pub use window::BlockWindow;

/// Errors that can occur during stats daemon operations.
#[derive(Debug, Error)]
pub enum StatsError {
	/// No daemon is registered for the network.
	#[error("no stats daemon registered for network: {0}")]
	NotFound(String),
	/// The configured data source cannot currently be consumed.
	#[error("data source unavailable: {0}")]
	Unavailable(String),
}
