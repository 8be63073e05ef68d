//! PayPal webhook handling. Verification happens against PayPal's
//! verification endpoint (tolerated on failure outside live mode); events
//! are then dispatched by type. Deliveries for already-promoted pending
//! orders are acknowledged with 200 so PayPal stops redelivering.
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
    db::models::distributor::PayoutAccountStatus,
    services::{distributors, reconcile},
    state::AppState,
};

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", post(paypal_webhook_event))
}

#[derive(Deserialize)]
pub struct PaypalEvent {
    event_type: String,
    resource: serde_json::Value,
}

/// Extractor that only yields an event once the delivery has been checked
/// against PayPal's verification endpoint.
pub struct VerifiedPaypalEvent(PaypalEvent);

impl FromRequest<AppState> for VerifiedPaypalEvent {
    type Rejection = Response;

    async fn from_request(req: Request<Body>, state: &AppState) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();
        let payload = axum::body::to_bytes(body, 1024 * 1024)
            .await
            .map_err(|_too_large| StatusCode::PAYLOAD_TOO_LARGE.into_response())?;
        state
            .providers
            .paypal
            .verify_webhook(&payload, &parts.headers)
            .await
            .map_err(|err| {
                tracing::warn!(%err, "Rejected PayPal webhook delivery");
                StatusCode::BAD_REQUEST.into_response()
            })?;
        let event: PaypalEvent = serde_json::from_slice(&payload)
            .map_err(|_bad_json| StatusCode::UNPROCESSABLE_ENTITY.into_response())?;
        Ok(Self(event))
    }
}

async fn paypal_webhook_event(
    State(state): State<AppState>,
    VerifiedPaypalEvent(event): VerifiedPaypalEvent,
) -> Result<(), StatusCode> {
    let resource = &event.resource;
    match event.event_type.as_str() {
        // Usually the buyer's return leg has already captured and promoted,
        // making this a no-op; it completes the order when the return leg
        // never ran.
        "PAYMENT.CAPTURE.COMPLETED" => {
            let Some(pending_order_id) = resource["custom_id"].as_str() else {
                tracing::warn!("PAYMENT.CAPTURE.COMPLETED without custom_id; ignoring");
                return Ok(());
            };
            let capture_id = resource["id"].as_str().ok_or(StatusCode::BAD_REQUEST)?;
            let capture = crate::services::providers::ProviderCapture {
                capture_id: capture_id.to_owned(),
                payer_email: None,
                payer_name: None,
            };
            reconcile::promote(pending_order_id, &capture, &state.store, &state.notifier).map_err(
                |err| {
                    tracing::error!(pending_order_id, %err, "PayPal reconciliation failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                },
            )?;
            Ok(())
        }
        "PAYMENT.CAPTURE.REFUNDED" => {
            let capture_id = resource["id"].as_str().ok_or(StatusCode::BAD_REQUEST)?;
            reconcile::apply_refund(capture_id, &state.store).map_err(|err| {
                tracing::error!(capture_id, %err, "Failed to record refund");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
            Ok(())
        }
        "PAYMENT.CAPTURE.DENIED" => {
            if let Some(pending_order_id) = resource["custom_id"].as_str() {
                reconcile::record_capture_denied(pending_order_id, &state.store);
            }
            Ok(())
        }
        "MERCHANT.ONBOARDING.COMPLETED" => {
            if let Some(merchant_id) = resource["merchant_id"].as_str() {
                if let Err(err) = distributors::update_paypal_merchant_status(
                    merchant_id,
                    PayoutAccountStatus::Active,
                    &state.store,
                ) {
                    tracing::warn!(merchant_id, %err, "Ignored onboarding event");
                }
            }
            Ok(())
        }
        "MERCHANT.PARTNER-CONSENT.REVOKED" => {
            if let Some(merchant_id) = resource["merchant_id"].as_str() {
                if let Err(err) = distributors::update_paypal_merchant_status(
                    merchant_id,
                    PayoutAccountStatus::Revoked,
                    &state.store,
                ) {
                    tracing::warn!(merchant_id, %err, "Ignored consent revocation event");
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
