//! Payment provider clients behind one polymorphic surface. The reconciler
//! and checkout service are provider-agnostic; Stripe and PayPal differ only
//! in how these three capabilities are wired to their REST APIs.
pub mod paypal;
pub mod stripe;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Which external provider carries a payment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Stripe,
    Paypal,
}

/// One line of a provider checkout, already server-priced.
pub struct CheckoutLine {
    pub title: String,
    pub artist: String,
    pub unit_minor_units: i64,
    pub quantity: u32,
}

/// Everything a provider needs to create a hosted checkout with a
/// marketplace fee split.
pub struct CheckoutSpec {
    /// Our pending order id; embedded so callbacks and webhooks can be
    /// correlated back without trusting anything else in the payload.
    pub pending_order_id: String,
    pub distributor_id: String,
    /// Connected account / merchant id receiving the payout.
    pub destination_account: String,
    pub lines: Vec<CheckoutLine>,
    pub total_minor_units: i64,
    pub platform_fee_minor_units: i64,
    pub currency: String,
    pub return_url: String,
    pub cancel_url: String,
}

/// Result of provider-side checkout creation.
pub struct ProviderCheckout {
    /// The provider's order/session id.
    pub provider_order_id: String,
    /// Where to send the buyer to approve payment.
    pub redirect_url: String,
}

/// Result of capturing (or resolving) a completed payment.
pub struct ProviderCapture {
    /// PayPal capture id or Stripe payment intent id.
    pub capture_id: String,
    pub payer_email: Option<String>,
    pub payer_name: Option<String>,
}

/// The capability set shared by both providers.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Create a provider-side checkout for an already staged pending order.
    async fn create_checkout(
        &self,
        spec: &CheckoutSpec,
    ) -> Result<ProviderCheckout, errors::ProviderError>;

    /// Capture (PayPal) or resolve (Stripe) a completed payment.
    async fn capture(
        &self,
        provider_order_id: &str,
    ) -> Result<ProviderCapture, errors::ProviderError>;

    /// Authenticate a webhook delivery before its payload may be trusted.
    async fn verify_webhook(
        &self,
        payload: &[u8],
        headers: &HeaderMap,
    ) -> Result<(), errors::ProviderError>;
}

/// The configured provider clients, shared across handlers.
pub struct Providers {
    pub stripe: Arc<dyn PaymentProvider>,
    pub paypal: Arc<dyn PaymentProvider>,
}

impl Providers {
    pub fn for_method(&self, method: PaymentMethod) -> Arc<dyn PaymentProvider> {
        match method {
            PaymentMethod::Stripe => Arc::clone(&self.stripe),
            PaymentMethod::Paypal => Arc::clone(&self.paypal),
        }
    }
}

pub mod errors {
    use thiserror::Error;

    /// Errors surfaced by payment provider clients. Callers map these to a
    /// generic "payment provider error" for buyers; details stay in logs.
    #[derive(Error, Debug)]
    pub enum ProviderError {
        #[error("Provider API returned {status}: {body}")]
        Api { status: u16, body: String },
        #[error("Failed to obtain provider access token")]
        Token,
        #[error(transparent)]
        Transport(#[from] reqwest::Error),
        #[error("Webhook signature missing")]
        MissingSignature,
        #[error("Webhook signature invalid: {0}")]
        InvalidSignature(String),
        #[error("Provider response missing expected field: {0}")]
        MalformedResponse(&'static str),
    }
}
