//! Common types for the nchain transaction pipeline.
//!
//! This crate defines the core data types shared by every nchain component:
//! durable transaction and contract records, signer references, the typed
//! message payloads consumed off the durable queue, the canonical block
//! header used by the network stats daemon, and configuration validation
//! primitives.

/// Account and wallet records referenced by signer resolution.
pub mod account;
/// Contract records and compiled artifact access.
pub mod contract;
/// Canonical block headers and stats ingest events.
pub mod header;
/// Typed payloads for the transaction lifecycle subjects.
pub mod messages;
/// Network configuration types.
pub mod networks;
/// Secure string wrapper for key material.
pub mod secret_string;
/// Signer identity references.
pub mod signer;
/// Per-network status snapshots.
pub mod status;
/// Transaction records, status state machine and latency accounting.
pub mod transaction;
/// Configuration validation primitives.
pub mod validation;

pub use account::*;
pub use contract::*;
pub use header::*;
pub use messages::*;
pub use networks::{FaucetConfig, NetworkConfig, NetworksConfig};
pub use secret_string::SecretString;
pub use signer::*;
pub use status::*;
pub use transaction::*;
pub use validation::*;
