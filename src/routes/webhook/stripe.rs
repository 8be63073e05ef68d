//! Stripe webhook handling. Events arrive as raw JSON plus a signature
//! header; the extractor verifies the signature before the payload is
//! parsed at all.
use axum::{
    body::Body,
    extract::{FromRequest, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Deserialize;

use crate::{
    services::{distributors, reconcile},
    state::AppState,
};

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", post(stripe_webhook_event))
}

#[derive(Deserialize)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

/// Extractor that only yields an event when the delivery is authentic.
pub struct VerifiedStripeEvent(StripeEvent);

impl FromRequest<AppState> for VerifiedStripeEvent {
    type Rejection = Response;

    async fn from_request(req: Request<Body>, state: &AppState) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();
        let payload = axum::body::to_bytes(body, 1024 * 1024)
            .await
            .map_err(|_too_large| StatusCode::PAYLOAD_TOO_LARGE.into_response())?;
        state
            .providers
            .stripe
            .verify_webhook(&payload, &parts.headers)
            .await
            .map_err(|err| {
                tracing::warn!(%err, "Rejected Stripe webhook delivery");
                StatusCode::BAD_REQUEST.into_response()
            })?;
        let event: StripeEvent = serde_json::from_slice(&payload)
            .map_err(|_bad_json| StatusCode::UNPROCESSABLE_ENTITY.into_response())?;
        Ok(Self(event))
    }
}

async fn stripe_webhook_event(
    State(state): State<AppState>,
    VerifiedStripeEvent(event): VerifiedStripeEvent,
) -> Result<(), StatusCode> {
    let object = &event.data.object;
    match event.event_type.as_str() {
        // The session carries the payment intent once complete; promotion
        // needs no further provider round trip.
        "checkout.session.completed" => {
            let pending_order_id = object["client_reference_id"].as_str().ok_or_else(|| {
                tracing::warn!("checkout.session.completed without client_reference_id");
                StatusCode::BAD_REQUEST
            })?;
            let payment_intent = object["payment_intent"].as_str().ok_or_else(|| {
                tracing::warn!(pending_order_id, "completed session without payment_intent");
                StatusCode::BAD_REQUEST
            })?;
            let capture = crate::services::providers::ProviderCapture {
                capture_id: payment_intent.to_owned(),
                payer_email: object["customer_details"]["email"].as_str().map(str::to_owned),
                payer_name: object["customer_details"]["name"].as_str().map(str::to_owned),
            };
            reconcile::promote(pending_order_id, &capture, &state.store, &state.notifier).map_err(
                |err| {
                    tracing::error!(pending_order_id, %err, "Stripe reconciliation failed");
                    // Pending order is intact; a redelivery will retry.
                    StatusCode::INTERNAL_SERVER_ERROR
                },
            )?;
            Ok(())
        }
        "charge.refunded" => {
            let payment_intent = object["payment_intent"].as_str().ok_or_else(|| {
                tracing::warn!("charge.refunded without payment_intent");
                StatusCode::BAD_REQUEST
            })?;
            reconcile::apply_refund(payment_intent, &state.store).map_err(|err| {
                tracing::error!(payment_intent, %err, "Failed to record refund");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
            Ok(())
        }
        "account.updated" => {
            let account_id = object["id"].as_str().ok_or(StatusCode::BAD_REQUEST)?;
            let charges_enabled = object["charges_enabled"].as_bool().unwrap_or(false);
            if let Err(err) =
                distributors::update_stripe_account_status(account_id, charges_enabled, &state.store)
            {
                // Accounts created outside onboarding are none of ours.
                tracing::warn!(account_id, %err, "Ignored account.updated event");
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
