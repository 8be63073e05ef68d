//! Routes for order retrieval and fulfillment-side status transitions,
//! interacts with the orders service.
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::models::order::{Order, OrderStatus, PaymentStatus, TrackingDetails},
    services::orders::{self, errors::OrderTransitionError, BulkTransitionReport},
    state::AppState,
    utils::{httperror::HttpError, money::minor_units_to_amount},
};

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/{order_id}", get(retrieve_order))
        .route("/{order_id}/status", post(transition_order))
        .route("/bulk-status", post(bulk_transition))
}

/// Wire representation of an order; money exposed as decimal at the edge,
/// stored as integer minor units internally.
#[derive(Serialize)]
struct OrderResponse {
    id: Uuid,
    order_number: String,
    distributor_id: Uuid,
    customer_name: String,
    status: OrderStatus,
    payment_status: PaymentStatus,
    total_amount: f64,
    platform_fee_minor_units: i64,
    items: usize,
    tracking: TrackingDetails,
    #[serde(with = "time::serde::rfc3339")]
    created_at: time::OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    paid_at: Option<time::OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    shipped_at: Option<time::OffsetDateTime>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id(),
            order_number: order.order_number.clone(),
            distributor_id: order.distributor_id,
            customer_name: order.customer_name.clone(),
            status: order.status(),
            payment_status: order.payment_status(),
            total_amount: minor_units_to_amount(order.total_minor_units()),
            platform_fee_minor_units: order.platform_fee_minor_units(),
            items: order.items().len(),
            tracking: order.tracking.clone(),
            created_at: order.created_at,
            paid_at: order.paid_at,
            shipped_at: order.shipped_at,
        }
    }
}

#[derive(Deserialize)]
struct ListOrdersQuery {
    distributor_id: Uuid,
}

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, HttpError> {
    let orders = orders::list_orders_for_distributor(query.distributor_id, &state.store)?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

async fn retrieve_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, HttpError> {
    orders::get_order(order_id, &state.store)?
        .map(|order| Json(OrderResponse::from(order)))
        .ok_or_else(|| {
            HttpError::new(
                StatusCode::NOT_FOUND,
                Some(format!("Order {order_id} not found.")),
            )
        })
}

#[derive(Deserialize)]
struct TransitionRequestBody {
    status: OrderStatus,
    #[serde(default)]
    tracking_number: Option<String>,
    #[serde(default)]
    carrier: Option<String>,
    #[serde(default)]
    tracking_url: Option<String>,
    #[serde(default)]
    estimated_delivery_date: Option<String>,
}

impl TransitionRequestBody {
    fn tracking(&self) -> Option<TrackingDetails> {
        if self.tracking_number.is_none()
            && self.carrier.is_none()
            && self.tracking_url.is_none()
            && self.estimated_delivery_date.is_none()
        {
            return None;
        }
        Some(TrackingDetails {
            tracking_number: self.tracking_number.clone(),
            carrier: self.carrier.clone(),
            tracking_url: self.tracking_url.clone(),
            estimated_delivery_date: self.estimated_delivery_date.clone(),
        })
    }
}

async fn transition_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(body): Json<TransitionRequestBody>,
) -> Result<Json<OrderResponse>, HttpError> {
    let tracking = body.tracking();
    let order = orders::transition_order(order_id, body.status, tracking, &state.store)?;
    Ok(Json(OrderResponse::from(order)))
}

#[derive(Deserialize)]
struct BulkTransitionRequestBody {
    order_ids: Vec<Uuid>,
    status: OrderStatus,
}

async fn bulk_transition(
    State(state): State<AppState>,
    Json(body): Json<BulkTransitionRequestBody>,
) -> Json<BulkTransitionReport> {
    Json(orders::bulk_transition(&body.order_ids, body.status, &state.store))
}

impl From<OrderTransitionError> for HttpError {
    fn from(error: OrderTransitionError) -> Self {
        match error {
            OrderTransitionError::DatabaseError(err) => err.into(),
            OrderTransitionError::OrderNonExistent(order_id) => Self::new(
                StatusCode::NOT_FOUND,
                Some(format!("Order {order_id} not found.")),
            ),
            OrderTransitionError::InvalidTransition { order_id, from, to } => {
                tracing::warn!(%order_id, ?from, ?to, "Rejected fulfillment transition");
                Self::new(
                    StatusCode::CONFLICT,
                    Some(format!("Order cannot move from {from:?} to {to:?}.")),
                )
            }
        }
    }
}
