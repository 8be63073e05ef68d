//! Routes for starting a checkout and for the PayPal capture-return leg.
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    constants::{api as api_constants, fees},
    services::{
        cart::CartLine,
        checkout::{self, errors::CheckoutError, CheckoutRequest, ReturnUrls},
        reconcile::{self, errors::ReconcileError, ReconcileOutcome},
    },
    state::AppState,
    utils::{email::EmailAddress, httperror::HttpError, money::minor_units_to_amount},
};

const CHECKOUT_CURRENCY: &str = "eur";

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_checkout))
        .route("/capture", post(capture_checkout))
}

#[derive(Deserialize)]
struct CheckoutRequestBody {
    distributor_id: Uuid,
    payment_method: crate::services::providers::PaymentMethod,
    items: Vec<CartLine>,
    viewer_id: Uuid,
    customer_email: EmailAddress,
    customer_name: String,
    shipping_address: String,
    billing_address: String,
    phone_number: Option<String>,
}

#[derive(Serialize)]
struct CheckoutResponse {
    pending_order_id: String,
    provider_order_id: String,
    redirect_url: String,
}

async fn start_checkout(
    State(state): State<AppState>,
    Json(body): Json<CheckoutRequestBody>,
) -> Result<Json<CheckoutResponse>, HttpError> {
    let provider = state.providers.for_method(body.payment_method);
    let base = api_constants::PUBLIC_BASE_URL.clone();
    let urls = ReturnUrls {
        return_url: format!("{base}/checkout/return"),
        cancel_url: format!("{base}/checkout/cancelled"),
    };
    let request = CheckoutRequest {
        distributor_id: body.distributor_id,
        payment_method: body.payment_method,
        items: body.items,
        viewer_id: body.viewer_id,
        customer_email: body.customer_email,
        customer_name: body.customer_name,
        shipping_address: body.shipping_address,
        billing_address: body.billing_address,
        phone_number: body.phone_number,
    };
    let started = checkout::start_checkout(
        request,
        provider.as_ref(),
        &urls,
        *fees::PLATFORM_FEE_BASIS_POINTS,
        CHECKOUT_CURRENCY,
        &state.store,
    )
    .await?;
    Ok(Json(CheckoutResponse {
        pending_order_id: started.pending_order_id,
        provider_order_id: started.provider_order_id,
        redirect_url: started.redirect_url,
    }))
}

#[derive(Deserialize)]
struct CaptureRequestBody {
    pending_order_id: String,
    /// Provider order id echoed back by the return leg. The staged record
    /// is authoritative; a mismatch is logged and the staged id is used.
    #[serde(default)]
    provider_order_id: Option<String>,
}

#[derive(Serialize)]
struct CaptureResponse {
    already_processed: bool,
    order_id: Option<Uuid>,
    order_number: Option<String>,
    total_amount: Option<f64>,
}

/// The buyer returns from PayPal approval; capture explicitly and promote.
/// A duplicate call (or a webhook that won the race) reports
/// `already_processed` instead of failing.
async fn capture_checkout(
    State(state): State<AppState>,
    Json(body): Json<CaptureRequestBody>,
) -> Result<Json<CaptureResponse>, HttpError> {
    let Some(pending) = checkout::get_pending(&body.pending_order_id, &state.store)? else {
        return Ok(Json(CaptureResponse {
            already_processed: true,
            order_id: None,
            order_number: None,
            total_amount: None,
        }));
    };
    if let Some(echoed) = &body.provider_order_id {
        if pending.provider_order_id.as_deref() != Some(echoed.as_str()) {
            tracing::warn!(
                pending_order_id = body.pending_order_id,
                echoed,
                staged = ?pending.provider_order_id,
                "Capture callback echoed a different provider order id"
            );
        }
    }
    let provider = state.providers.for_method(pending.payment_method);
    let outcome = reconcile::reconcile_capture(
        &body.pending_order_id,
        provider.as_ref(),
        &state.store,
        &state.notifier,
    )
    .await?;
    match outcome {
        ReconcileOutcome::Created(order) => Ok(Json(CaptureResponse {
            already_processed: false,
            order_id: Some(order.id()),
            order_number: Some(order.order_number.clone()),
            total_amount: Some(minor_units_to_amount(order.total_minor_units())),
        })),
        ReconcileOutcome::AlreadyProcessed => Ok(Json(CaptureResponse {
            already_processed: true,
            order_id: None,
            order_number: None,
            total_amount: None,
        })),
    }
}

impl From<CheckoutError> for HttpError {
    fn from(error: CheckoutError) -> Self {
        match error {
            CheckoutError::DatabaseError(err) => err.into(),
            CheckoutError::Validation(err) => {
                tracing::warn!(%err, "Checkout rejected by cart validation");
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, Some(err.to_string()))
            }
            CheckoutError::DistributorNonExistent(distributor_id) => {
                tracing::warn!(%distributor_id, "Checkout for non-existent distributor");
                Self::new(
                    StatusCode::NOT_FOUND,
                    Some(String::from("Distributor not found.")),
                )
            }
            CheckoutError::DistributorNotPayable {
                distributor_id,
                payment_method,
            } => {
                tracing::warn!(
                    %distributor_id,
                    ?payment_method,
                    "Checkout against distributor without a payout account"
                );
                Self::new(
                    StatusCode::CONFLICT,
                    Some(String::from(
                        "This distributor cannot accept the selected payment method.",
                    )),
                )
            }
            CheckoutError::Provider(err) => {
                tracing::error!(%err, "Provider error while creating checkout");
                // Deliberately generic: provider details never reach buyers.
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    Some(String::from("Payment provider error. Please try again.")),
                )
            }
        }
    }
}

impl From<ReconcileError> for HttpError {
    fn from(error: ReconcileError) -> Self {
        match error {
            ReconcileError::DatabaseError(err) => err.into(),
            ReconcileError::CaptureFailed(err) => {
                tracing::error!(%err, "Capture failed during checkout return");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    Some(String::from(
                        "Payment could not be captured. You have not been charged twice; please retry.",
                    )),
                )
            }
            ReconcileError::NoProviderOrder(pending_order_id) => {
                tracing::error!(pending_order_id, "Capture for pending order with no provider order id");
                Self::new(
                    StatusCode::CONFLICT,
                    Some(String::from("Checkout was never handed to the payment provider.")),
                )
            }
            ReconcileError::DistributorNonExistent(distributor_id) => {
                tracing::error!(%distributor_id, "Reconciliation hit a missing distributor");
                Self::from(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CaptureRequestBody;

    #[test]
    fn capture_body_accepts_the_echoed_provider_order_id() {
        let with: CaptureRequestBody = serde_json::from_str(
            r#"{"pending_order_id":"po_1","provider_order_id":"5O190127TN364715T"}"#,
        )
        .expect("body deserializes");
        assert_eq!(with.provider_order_id.as_deref(), Some("5O190127TN364715T"));

        let without: CaptureRequestBody =
            serde_json::from_str(r#"{"pending_order_id":"po_1"}"#).expect("body deserializes");
        assert!(without.provider_order_id.is_none());
    }
}
