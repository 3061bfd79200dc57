//! HTTP payments client.
//!
//! Posts subsidy payment requests to the configured payments service with
//! bearer authentication. The service responds with a result reference
//! (typically the funding transaction hash) which is surfaced for logging
//! only; the coordinator does not track subsidy transactions.

use crate::payments::{PaymentReceipt, PaymentsError, PaymentsInterface};
use alloy_primitives::U256;
use async_trait::async_trait;
use nchain_types::SecretString;

/// Payments client backed by an HTTP API.
pub struct HttpPayments {
	client: reqwest::Client,
	base_url: String,
	access_token: SecretString,
}

impl HttpPayments {
	pub fn new(base_url: String, access_token: SecretString) -> Self {
		Self {
			client: reqwest::Client::new(),
			base_url,
			access_token,
		}
	}

	fn payments_url(&self) -> String {
		format!("{}/api/v1/payments", self.base_url.trim_end_matches('/'))
	}
}

#[async_trait]
impl PaymentsInterface for HttpPayments {
	async fn create_payment(
		&self,
		beneficiary: &str,
		value: U256,
		data: &str,
	) -> Result<PaymentReceipt, PaymentsError> {
		let body = serde_json::json!({
			"to": beneficiary,
			"value": value.to_string(),
			"data": data,
		});

		let response = self
			.client
			.post(self.payments_url())
			.bearer_auth(self.access_token.with_exposed(str::to_string))
			.json(&body)
			.send()
			.await
			.map_err(|e| PaymentsError::Request(e.to_string()))?;

		if !response.status().is_success() {
			return Err(PaymentsError::Response(format!(
				"payments service returned {}",
				response.status()
			)));
		}

		let payload: serde_json::Value = response
			.json()
			.await
			.map_err(|e| PaymentsError::Response(e.to_string()))?;

		// The reference rides either at the top level or under params.
		let reference = payload
			.get("result")
			.or_else(|| payload.pointer("/params/result"))
			.and_then(|v| v.as_str())
			.map(str::to_string);

		Ok(PaymentReceipt { reference })
	}
}
