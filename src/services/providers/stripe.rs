//! Stripe client: Checkout Sessions created as Connect destination charges
//! (the platform fee is taken as `application_fee_amount`, the rest routes
//! to the distributor's connected account) and webhook signature
//! verification over the raw payload.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;

use crate::constants::stripe as constants;

use super::{
    errors::ProviderError, CheckoutSpec, PaymentMethod, PaymentProvider, ProviderCapture,
    ProviderCheckout,
};

const STRIPE_API_BASE: &str = "https://api.stripe.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

type HmacSha256 = Hmac<Sha256>;

pub struct StripeProvider {
    http: Client,
    secret_key: String,
    webhook_secret: String,
    tolerance_seconds: i64,
    api_base: String,
}

impl StripeProvider {
    /// Build the client from the `STRIPE_*` environment configuration.
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::new(
            constants::STRIPE_SECRET_KEY.clone(),
            constants::STRIPE_WEBHOOK_SECRET.clone(),
            *constants::STRIPE_WEBHOOK_TOLERANCE_SECONDS,
            STRIPE_API_BASE.to_owned(),
        )
    }

    pub fn new(
        secret_key: String,
        webhook_secret: String,
        tolerance_seconds: i64,
        api_base: String,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            secret_key,
            webhook_secret,
            tolerance_seconds,
            api_base,
        })
    }

    /// Verify a `Stripe-Signature` header (`t=...,v1=...`) against the raw
    /// payload: HMAC-SHA256 over `"{t}.{payload}"` with the endpoint
    /// secret, constant-time comparison, bounded timestamp skew.
    pub fn verify_signature(&self, payload: &[u8], headers: &HeaderMap) -> Result<(), ProviderError> {
        let header = headers
            .get("stripe-signature")
            .ok_or(ProviderError::MissingSignature)?
            .to_str()
            .map_err(|_non_ascii| {
                ProviderError::InvalidSignature(String::from("non-ASCII signature header"))
            })?;

        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<&str> = Vec::new();
        for part in header.split(',') {
            match part.split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or_else(|| {
            ProviderError::InvalidSignature(String::from("missing timestamp"))
        })?;
        if signatures.is_empty() {
            return Err(ProviderError::InvalidSignature(String::from(
                "no v1 signature present",
            )));
        }

        let now = i64::try_from(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("System clock predates the Unix epoch")
                .as_secs(),
        )
        .expect("System clock far beyond representable range");
        if (now - timestamp).abs() > self.tolerance_seconds {
            return Err(ProviderError::InvalidSignature(format!(
                "timestamp {timestamp} outside tolerance of {}s",
                self.tolerance_seconds
            )));
        }

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .is_ok_and(|sig| mac.clone().verify_slice(&sig).is_ok())
        });
        if matched {
            Ok(())
        } else {
            Err(ProviderError::InvalidSignature(String::from(
                "no signature matched",
            )))
        }
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<serde_json::Value, ProviderError> {
        let response = self
            .http
            .post(format!("{}{path}", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;
        read_json_response(response).await
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, ProviderError> {
        let response = self
            .http
            .get(format!("{}{path}", self.api_base))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        read_json_response(response).await
    }
}

async fn read_json_response(
    response: reqwest::Response,
) -> Result<serde_json::Value, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body)
        .map_err(|_bad_json| ProviderError::MalformedResponse("response body is not JSON"))
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    async fn create_checkout(
        &self,
        spec: &CheckoutSpec,
    ) -> Result<ProviderCheckout, ProviderError> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), spec.return_url.clone()),
            ("cancel_url".into(), spec.cancel_url.clone()),
            ("client_reference_id".into(), spec.pending_order_id.clone()),
            (
                "payment_intent_data[application_fee_amount]".into(),
                spec.platform_fee_minor_units.to_string(),
            ),
            (
                "payment_intent_data[transfer_data][destination]".into(),
                spec.destination_account.clone(),
            ),
            (
                "metadata[distributor_id]".into(),
                spec.distributor_id.clone(),
            ),
            (
                "metadata[platform_fee_minor_units]".into(),
                spec.platform_fee_minor_units.to_string(),
            ),
        ];
        for (idx, line) in spec.lines.iter().enumerate() {
            form.push((
                format!("line_items[{idx}][price_data][currency]"),
                spec.currency.clone(),
            ));
            form.push((
                format!("line_items[{idx}][price_data][product_data][name]"),
                format!("{} - {}", line.artist, line.title),
            ));
            form.push((
                format!("line_items[{idx}][price_data][unit_amount]"),
                line.unit_minor_units.to_string(),
            ));
            form.push((format!("line_items[{idx}][quantity]"), line.quantity.to_string()));
        }

        let session = self.post_form("/v1/checkout/sessions", &form).await?;
        let provider_order_id = session["id"]
            .as_str()
            .ok_or(ProviderError::MalformedResponse("checkout session id"))?
            .to_owned();
        let redirect_url = session["url"]
            .as_str()
            .ok_or(ProviderError::MalformedResponse("checkout session url"))?
            .to_owned();
        Ok(ProviderCheckout {
            provider_order_id,
            redirect_url,
        })
    }

    /// Stripe captures automatically; resolving a session yields the payment
    /// intent id which serves as the capture anchor.
    async fn capture(&self, provider_order_id: &str) -> Result<ProviderCapture, ProviderError> {
        let session = self
            .get_json(&format!("/v1/checkout/sessions/{provider_order_id}"))
            .await?;
        let payment_intent = session["payment_intent"]
            .as_str()
            .ok_or(ProviderError::MalformedResponse("payment_intent"))?
            .to_owned();
        Ok(ProviderCapture {
            capture_id: payment_intent,
            payer_email: session["customer_details"]["email"]
                .as_str()
                .map(str::to_owned),
            payer_name: session["customer_details"]["name"]
                .as_str()
                .map(str::to_owned),
        })
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        headers: &HeaderMap,
    ) -> Result<(), ProviderError> {
        self.verify_signature(payload, headers)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    use super::StripeProvider;

    const SECRET: &str = "whsec_test_secret";

    fn provider() -> StripeProvider {
        StripeProvider::new(
            String::from("sk_test_unused"),
            String::from(SECRET),
            300,
            String::from("http://unused.invalid"),
        )
        .expect("client builds")
    }

    fn sign(payload: &[u8], timestamp: i64, secret: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("any key length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    fn now() -> i64 {
        i64::try_from(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("epoch")
                .as_secs(),
        )
        .expect("in range")
    }

    fn headers_for(payload: &[u8], timestamp: i64, secret: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("t={timestamp},v1={}", sign(payload, timestamp, secret));
        headers.insert("stripe-signature", HeaderValue::from_str(&value).expect("ascii"));
        headers
    }

    #[test]
    fn accepts_a_correctly_signed_payload() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let headers = headers_for(payload, now(), SECRET);
        assert!(provider().verify_signature(payload, &headers).is_ok());
    }

    #[test]
    fn rejects_a_wrong_secret() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let headers = headers_for(payload, now(), "whsec_other");
        assert!(provider().verify_signature(payload, &headers).is_err());
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let headers = headers_for(payload, now(), SECRET);
        assert!(provider()
            .verify_signature(br#"{"type":"charge.refunded"}"#, &headers)
            .is_err());
    }

    #[test]
    fn rejects_a_stale_timestamp() {
        let payload = br#"{}"#;
        let headers = headers_for(payload, now() - 10_000, SECRET);
        assert!(provider().verify_signature(payload, &headers).is_err());
    }

    #[test]
    fn rejects_a_missing_header() {
        assert!(provider().verify_signature(b"{}", &HeaderMap::new()).is_err());
    }
}
