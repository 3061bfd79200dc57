//! Faucet subsidy policy.
//!
//! A create request failing with an insufficient-funds error on a
//! subsidy-enabled network is not recorded as a failure: the coordinator
//! requests a drip for the signer's address from the payments service and
//! acknowledges, leaving the producer free to resubmit the same payload.

use alloy_primitives::U256;
use nchain_config::LifecycleConfig;
use nchain_rpc::{PaymentsError, PaymentsInterface};
use nchain_types::NetworkConfig;

/// Whether a broadcast failure message matches the insufficient-funds
/// pattern recognized across node implementations.
pub fn is_insufficient_funds(message: &str) -> bool {
	message.to_lowercase().contains("insufficient funds")
}

/// Drip value for a network: per-network override, else the global policy
/// constant.
pub fn drip_value(network: &NetworkConfig, policy: &LifecycleConfig) -> U256 {
	let wei = network
		.faucet
		.as_ref()
		.and_then(|f| f.drip_wei)
		.unwrap_or(policy.faucet_drip_wei);
	U256::from(wei)
}

/// Requests a subsidy payment for the beneficiary.
///
/// The gas estimate is advisory: the payments service sizes the drip, the
/// estimate only travels in logs for operator correlation.
pub async fn subsidize(
	payments: &dyn PaymentsInterface,
	network: &NetworkConfig,
	beneficiary: &str,
	drip: U256,
	gas_estimate: u64,
) -> Result<(), PaymentsError> {
	let receipt = payments.create_payment(beneficiary, drip, "0x").await?;
	tracing::debug!(
		network = %network.name,
		beneficiary = %beneficiary,
		drip = %drip,
		gas_estimate,
		reference = receipt.reference.as_deref().unwrap_or("-"),
		"subsidy payment broadcast"
	);
	Ok(())
}
