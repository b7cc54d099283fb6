//! Stripe integration.
//!
//! Talks to the Stripe REST API directly with form-encoded requests: hosted
//! Checkout Sessions for purchases, Connect transfers for seller payouts,
//! and refunds against a session's payment intent. Webhook payloads are
//! verified against the signing secret over the raw request bytes before
//! anything is parsed out of them.

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// HTTP timeout for Stripe calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum accepted age of a signed webhook payload.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("stripe request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stripe api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("STRIPE_SECRET not set")]
    MissingSecret,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SessionList {
    data: Vec<CheckoutSession>,
}

/// Parameters for a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutParams {
    pub currency: String,
    pub product_name: String,
    pub product_description: String,
    pub unit_amount_cents: i64,
    pub success_url: String,
    pub cancel_url: String,
    /// Carried back to us in webhook events.
    pub metadata: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret: String,
}

impl StripeClient {
    pub fn new(secret: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("SubShare/1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self { client, secret }
    }

    pub fn from_env() -> Result<Self, StripeError> {
        let secret = std::env::var("STRIPE_SECRET").map_err(|_| StripeError::MissingSecret)?;
        Ok(Self::new(secret))
    }

    async fn post_form(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<serde_json::Value, StripeError> {
        let response = self
            .client
            .post(format!("{STRIPE_API_BASE}{path}"))
            .bearer_auth(&self.secret)
            .form(params)
            .send()
            .await?;

        Self::read_json(response).await
    }

    async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<serde_json::Value, StripeError> {
        let response = self
            .client
            .get(format!("{STRIPE_API_BASE}{path}"))
            .bearer_auth(&self.secret)
            .query(query)
            .send()
            .await?;

        Self::read_json(response).await
    }

    async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, StripeError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/message")
                        .and_then(|m| m.as_str())
                        .map(String::from)
                })
                .unwrap_or(body);
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    /// Create a card checkout session for a single line item.
    pub async fn create_checkout_session(
        &self,
        params: CheckoutParams,
    ) -> Result<CheckoutSession, StripeError> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("payment_method_types[0]".into(), "card".into()),
            (
                "line_items[0][price_data][currency]".into(),
                params.currency,
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                params.product_name,
            ),
            (
                "line_items[0][price_data][product_data][description]".into(),
                params.product_description,
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                params.unit_amount_cents.to_string(),
            ),
            ("line_items[0][quantity]".into(), "1".into()),
            ("success_url".into(), params.success_url),
            ("cancel_url".into(), params.cancel_url),
        ];
        for (key, value) in params.metadata {
            form.push((format!("metadata[{key}]"), value));
        }

        let value = self.post_form("/checkout/sessions", &form).await?;
        Ok(serde_json::from_value(value).map_err(|e| StripeError::Api {
            status: 200,
            message: format!("unexpected session shape: {e}"),
        })?)
    }

    pub async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, StripeError> {
        let value = self
            .get(&format!("/checkout/sessions/{session_id}"), &[])
            .await?;
        serde_json::from_value(value).map_err(|e| StripeError::Api {
            status: 200,
            message: format!("unexpected session shape: {e}"),
        })
    }

    /// Find the checkout session that produced a payment intent.
    pub async fn find_session_by_payment_intent(
        &self,
        payment_intent: &str,
    ) -> Result<Option<CheckoutSession>, StripeError> {
        let value = self
            .get(
                "/checkout/sessions",
                &[
                    ("payment_intent".into(), payment_intent.to_string()),
                    ("limit".into(), "1".into()),
                ],
            )
            .await?;

        let list: SessionList = serde_json::from_value(value).map_err(|e| StripeError::Api {
            status: 200,
            message: format!("unexpected session list shape: {e}"),
        })?;
        Ok(list.data.into_iter().next())
    }

    /// Transfer funds to a connected account (seller payout).
    pub async fn create_transfer(
        &self,
        amount_cents: i64,
        currency: &str,
        destination: &str,
        transfer_group: &str,
    ) -> Result<(), StripeError> {
        self.post_form(
            "/transfers",
            &[
                ("amount".into(), amount_cents.to_string()),
                ("currency".into(), currency.to_string()),
                ("destination".into(), destination.to_string()),
                ("transfer_group".into(), transfer_group.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    /// Refund a captured payment back to the buyer.
    pub async fn create_refund(&self, payment_intent: &str) -> Result<(), StripeError> {
        self.post_form(
            "/refunds",
            &[
                ("payment_intent".into(), payment_intent.to_string()),
                ("reason".into(), "requested_by_customer".into()),
            ],
        )
        .await?;
        Ok(())
    }
}

// --- Webhook verification -------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing or malformed timestamp in signature header")]
    MissingTimestamp,

    #[error("no v1 signature in header")]
    MissingSignature,

    #[error("timestamp outside tolerance window")]
    Expired,

    #[error("signature mismatch")]
    Mismatch,
}

/// Verify a `Stripe-Signature` header against the raw request body.
///
/// The signed message is `"{timestamp}.{payload}"` and the signature is
/// HMAC-SHA256 under the endpoint's signing secret, hex-encoded in the
/// header's `v1` entries. The payload must be the raw bytes as received;
/// re-serializing parsed JSON breaks verification.
pub fn verify_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
) -> Result<(), SignatureError> {
    verify_signature_at(
        payload,
        sig_header,
        secret,
        chrono::Utc::now().timestamp(),
        SIGNATURE_TOLERANCE_SECS,
    )
}

pub fn verify_signature_at(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now_ts: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in sig_header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(v)) => timestamp = v.parse().ok(),
            (Some("v1"), Some(v)) => signatures.push(v),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }
    if (now_ts - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }

    type HmacSha256 = Hmac<Sha256>;

    for candidate in signatures {
        let Ok(candidate_bytes) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&candidate_bytes).is_ok() {
            return Ok(());
        }
    }

    Err(SignatureError::Mismatch)
}

// --- Webhook events -------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Id of the event's primary object (session id, payment intent id, …).
    pub fn object_id(&self) -> Option<&str> {
        self.data.object.get("id").and_then(|v| v.as_str())
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.data
            .object
            .get("metadata")
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_verifies() {
        let payload = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let secret = "whsec_test";
        let ts = 1_700_000_000;
        let header = format!("t={},v1={}", ts, sign(payload, secret, ts));

        assert_eq!(
            verify_signature_at(payload, &header, secret, ts + 10, 300),
            Ok(())
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let payload = br#"{"id":"evt_1"}"#;
        let secret = "whsec_test";
        let ts = 1_700_000_000;
        let header = format!("t={},v1={}", ts, sign(payload, secret, ts));

        let tampered = br#"{"id":"evt_2"}"#;
        assert_eq!(
            verify_signature_at(tampered, &header, secret, ts, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let payload = b"{}";
        let secret = "whsec_test";
        let ts = 1_700_000_000;
        let header = format!("t={},v1={}", ts, sign(payload, secret, ts));

        assert_eq!(
            verify_signature_at(payload, &header, secret, ts + 301, 300),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert_eq!(
            verify_signature_at(b"{}", "v1=abcd", "s", 0, 300),
            Err(SignatureError::MissingTimestamp)
        );
        assert_eq!(
            verify_signature_at(b"{}", "t=100", "s", 100, 300),
            Err(SignatureError::MissingSignature)
        );
    }

    #[test]
    fn one_valid_signature_among_many_suffices() {
        let payload = b"body";
        let secret = "whsec_test";
        let ts = 42;
        let good = sign(payload, secret, ts);
        let header = format!("t={ts},v1=deadbeef,v1={good}");

        assert_eq!(verify_signature_at(payload, &header, secret, ts, 300), Ok(()));
    }

    #[test]
    fn event_parsing_exposes_metadata() {
        let payload = br#"{
            "id": "evt_9",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_1",
                    "metadata": { "transaction_id": "tx-1" }
                }
            }
        }"#;

        let event = WebhookEvent::parse(payload).unwrap();
        assert_eq!(event.id, "evt_9");
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.object_id(), Some("cs_test_1"));
        assert_eq!(event.metadata("transaction_id"), Some("tx-1"));
        assert_eq!(event.metadata("missing"), None);
    }
}
