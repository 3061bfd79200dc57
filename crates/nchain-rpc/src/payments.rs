//! Outbound payments (faucet) contract.
//!
//! The subsidy path funds a beneficiary address through an external
//! payments service when a signer lacks balance to cover gas. The call is
//! synchronous from the coordinator's point of view: an error propagates
//! to the create consumer, which falls back to its normal failure path.

use alloy_primitives::U256;
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by the payments collaborator.
#[derive(Debug, Error)]
pub enum PaymentsError {
	#[error("request error: {0}")]
	Request(String),
	#[error("unexpected response: {0}")]
	Response(String),
}

/// Result of a submitted payment.
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
	/// Service-side reference for the payment, typically a tx hash.
	pub reference: Option<String>,
}

/// Contract for requesting subsidy payments.
#[async_trait]
pub trait PaymentsInterface: Send + Sync {
	/// Requests a payment of `value` wei to the beneficiary address.
	async fn create_payment(
		&self,
		beneficiary: &str,
		value: U256,
		data: &str,
	) -> Result<PaymentReceipt, PaymentsError>;
}
