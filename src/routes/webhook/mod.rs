//! Webhook API endpoints for payment provider event delivery. Signatures
//! are verified before any payload is trusted; processing outcomes that are
//! idempotent no-ops still return 200 so providers stop redelivering.
use axum::Router;

use crate::state::AppState;

mod paypal;
mod stripe;

/// Creates a router for all webhook interfaces.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .nest("/stripe", stripe::create_router())
        .nest("/paypal", paypal::create_router())
}
