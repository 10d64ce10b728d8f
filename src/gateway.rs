//! Chapa payment gateway client and webhook signature verification.
//!
//! Gateway calls run outside any database transaction and carry a
//! bounded timeout, so a slow gateway cannot pin a connection.

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};

pub const CURRENCY: &str = "ETB";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct ChapaClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeRequest {
    pub amount: String,
    pub currency: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub tx_ref: String,
    pub callback_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customization: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub checkout_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Success,
    Failed,
    Pending,
}

#[derive(Debug, Clone)]
pub struct Verification {
    pub outcome: VerifyOutcome,
    /// Full gateway reply, stored on the payment verbatim.
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
struct ChapaEnvelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl ChapaClient {
    pub fn new(config: &Config) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.gateway_timeout)
            .build()
            .map_err(|e| ApiError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.gateway_base_url.trim_end_matches('/').to_string(),
            secret_key: config.gateway_secret_key.clone(),
        })
    }

    pub async fn initialize(&self, req: &InitializeRequest) -> ApiResult<CheckoutSession> {
        let url = format!("{}/transaction/initialize", self.base_url);
        let envelope = self.post(&url, req).await?;
        if envelope.status != "success" {
            return Err(ApiError::Gateway(
                envelope
                    .message
                    .unwrap_or_else(|| "initialization rejected".into()),
            ));
        }
        let checkout_url = envelope
            .data
            .as_ref()
            .and_then(|d| d.get("checkout_url"))
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::Gateway("missing checkout_url in reply".into()))?
            .to_string();
        Ok(CheckoutSession { checkout_url })
    }

    pub async fn verify(&self, tx_ref: &str) -> ApiResult<Verification> {
        let url = format!("{}/transaction/verify/{}", self.base_url, tx_ref);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ApiError::Gateway(format!("verify request: {e}")))?;
        let raw: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Gateway(format!("verify reply: {e}")))?;

        let envelope_ok = raw.get("status").and_then(Value::as_str) == Some("success");
        let charge_status = raw
            .get("data")
            .and_then(|d| d.get("status"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let outcome = if envelope_ok && charge_status == "success" {
            VerifyOutcome::Success
        } else if charge_status == "failed" || charge_status == "cancelled" {
            VerifyOutcome::Failed
        } else {
            VerifyOutcome::Pending
        };
        Ok(Verification { outcome, raw })
    }

    /// Gateway-side refund. Kept separate from the local refund record
    /// so a gateway failure leaves the workflow in `approved`.
    pub async fn refund(&self, tx_ref: &str, amount: Decimal, reason: &str) -> ApiResult<Value> {
        let url = format!("{}/refund/{}", self.base_url, tx_ref);
        let body = serde_json::json!({
            "amount": format!("{:.2}", amount),
            "reason": reason,
        });
        let envelope = self.post(&url, &body).await?;
        if envelope.status != "success" {
            return Err(ApiError::Gateway(
                envelope.message.unwrap_or_else(|| "refund rejected".into()),
            ));
        }
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    async fn post<B: Serialize>(&self, url: &str, body: &B) -> ApiResult<ChapaEnvelope> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.secret_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Gateway(format!("gateway request: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Gateway(format!("gateway reply: {e}")))
    }
}

/// Compute the hex HMAC-SHA256 of a payload under the webhook secret.
pub fn webhook_signature(secret: &str, raw_body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

/// Check the raw body against every provided signature header value.
/// Comparison happens inside `verify_slice`, which is constant-time.
pub fn verify_webhook_signature(secret: &str, raw_body: &[u8], provided: &[&str]) -> bool {
    provided.iter().any(|candidate| {
        let Ok(bytes) = hex::decode(candidate.trim()) else {
            return false;
        };
        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(raw_body);
        mac.verify_slice(&bytes).is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let secret = "whsec_test";
        let body = br#"{"event":"charge.success","tx_ref":"TX-0011223344556677"}"#;
        let sig = webhook_signature(secret, body);
        assert!(verify_webhook_signature(secret, body, &[&sig]));
    }

    #[test]
    fn tampered_body_fails() {
        let secret = "whsec_test";
        let sig = webhook_signature(secret, b"original");
        assert!(!verify_webhook_signature(secret, b"tampered", &[&sig]));
    }

    #[test]
    fn wrong_secret_fails() {
        let sig = webhook_signature("secret-a", b"payload");
        assert!(!verify_webhook_signature("secret-b", b"payload", &[&sig]));
    }

    #[test]
    fn any_matching_header_passes() {
        let secret = "whsec_test";
        let sig = webhook_signature(secret, b"payload");
        assert!(verify_webhook_signature(secret, b"payload", &["garbage", &sig]));
    }

    #[test]
    fn non_hex_signature_fails_cleanly() {
        assert!(!verify_webhook_signature("s", b"payload", &["not-hex!"]));
        assert!(!verify_webhook_signature("s", b"payload", &[]));
    }

    #[test]
    fn initialize_request_omits_empty_optionals() {
        let req = InitializeRequest {
            amount: "240.00".into(),
            currency: CURRENCY.into(),
            email: "buyer@example.com".into(),
            first_name: "Abebe".into(),
            last_name: "Bikila".into(),
            tx_ref: "TX-0011223344556677".into(),
            callback_url: "http://localhost:8084/payments/chapa_webhook".into(),
            return_url: None,
            phone_number: None,
            customization: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("return_url").is_none());
        assert_eq!(json["currency"], "ETB");
    }
}
