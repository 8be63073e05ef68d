//! Order fulfillment: status transitions after payment, driven by
//! distributor staff. Payment truth lives with the reconciler; this service
//! only records fulfillment-side movement through the state machine.
use serde::Serialize;
use uuid::Uuid;

use crate::db::{
    models::order::{Order, OrderStatus, TrackingDetails},
    Store,
};

/// Apply one fulfillment transition, optionally attaching tracking details
/// (tracking may be set at any point during fulfillment, independent of
/// payment status). Load, check and write happen in one write transaction
/// so a refund webhook landing mid-transition is never overwritten.
pub fn transition_order(
    order_id: Uuid,
    target: OrderStatus,
    tracking: Option<TrackingDetails>,
    store: &Store,
) -> Result<Order, errors::OrderTransitionError> {
    let txn = store.begin_write()?;
    let mut order = Order::select_one_in(order_id, &txn)?
        .ok_or(errors::OrderTransitionError::OrderNonExistent(order_id))?;
    if !order.can_transition_to(target) {
        return Err(errors::OrderTransitionError::InvalidTransition {
            order_id,
            from: order.status(),
            to: target,
        });
    }
    order.set_status(target);
    if let Some(tracking) = tracking {
        order.set_tracking(tracking);
    }
    order.update_in(&txn)?;
    txn.commit()
        .map_err(crate::db::errors::DatabaseError::from)?;
    Ok(order)
}

/// Per-order result of a bulk transition.
#[derive(Serialize)]
pub struct BulkTransitionReport {
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<BulkTransitionFailure>,
}

#[derive(Serialize)]
pub struct BulkTransitionFailure {
    pub order_id: Uuid,
    pub reason: String,
}

/// Apply the same transition to many orders independently. Failures are
/// reported per order; successes are never rolled back.
pub fn bulk_transition(
    order_ids: &[Uuid],
    target: OrderStatus,
    store: &Store,
) -> BulkTransitionReport {
    let mut report = BulkTransitionReport {
        succeeded: Vec::new(),
        failed: Vec::new(),
    };
    for &order_id in order_ids {
        match transition_order(order_id, target, None, store) {
            Ok(_) => report.succeeded.push(order_id),
            Err(err) => report.failed.push(BulkTransitionFailure {
                order_id,
                reason: err.to_string(),
            }),
        }
    }
    report
}

pub fn get_order(
    order_id: Uuid,
    store: &Store,
) -> Result<Option<Order>, crate::db::errors::DatabaseError> {
    Order::select_one(order_id, store)
}

pub fn list_orders_for_distributor(
    distributor_id: Uuid,
    store: &Store,
) -> Result<Vec<Order>, crate::db::errors::DatabaseError> {
    Order::select_by_distributor(distributor_id, store)
}

pub mod errors {
    use thiserror::Error;
    use uuid::Uuid;

    use crate::db::{errors::DatabaseError, models::order::OrderStatus};

    #[derive(Error, Debug)]
    pub enum OrderTransitionError {
        #[error(transparent)]
        DatabaseError(#[from] DatabaseError),
        #[error("Order does not exist")]
        OrderNonExistent(Uuid),
        #[error("Order cannot move from {from:?} to {to:?}")]
        InvalidTransition {
            order_id: Uuid,
            from: OrderStatus,
            to: OrderStatus,
        },
    }
}

#[cfg(test)]
mod tests {
    use crate::db::models::order::OrderStatus;

    // Transition legality is a pure property of the state machine, tested
    // here via a synthetic order; persistence-level tests live in
    // tests/checkout_flow.rs.
    fn can(from: OrderStatus, to: OrderStatus) -> bool {
        // Orders can only be built through promotion, so probe the matrix
        // through a struct stood up by serde.
        let order: crate::db::models::order::Order = serde_json::from_value(serde_json::json!({
            "id": "8a3a41d8-0000-4000-8000-000000000001",
            "order_number": "VLX-00001",
            "distributor_id": "8a3a41d8-0000-4000-8000-000000000002",
            "viewer_id": "8a3a41d8-0000-4000-8000-000000000003",
            "viewer_email": "buyer@records.example",
            "customer_name": "A Buyer",
            "shipping_address": "1 Lane",
            "billing_address": "1 Lane",
            "phone_number": null,
            "items": [],
            "total_minor_units": 1000,
            "platform_fee_minor_units": 40,
            "total_weight_grams": null,
            "status": serde_json::to_value(from).expect("status serializes"),
            "payment_status": "paid",
            "provider_references": {"provider": "paypal", "order_id": "X", "capture_id": "Y"},
            "tracking": {},
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z",
            "paid_at": null,
            "shipped_at": null
        }))
        .expect("synthetic order deserializes");
        order.can_transition_to(to)
    }

    #[test]
    fn forward_chain_is_allowed_in_order() {
        use OrderStatus::{AwaitingPayment, Paid, Pending, Processing, Shipped};
        assert!(can(Pending, AwaitingPayment));
        assert!(can(AwaitingPayment, Paid));
        assert!(can(Paid, Processing));
        assert!(can(Processing, Shipped));
        assert!(!can(Pending, Paid));
        assert!(!can(Paid, Shipped));
        assert!(!can(Shipped, Processing));
    }

    #[test]
    fn on_hold_reachable_from_any_pre_shipped_state() {
        use OrderStatus::{AwaitingPayment, OnHold, Paid, Pending, Processing, Shipped};
        for from in [Pending, AwaitingPayment, Paid, Processing] {
            assert!(can(from, OnHold), "{from:?} -> on_hold should be allowed");
        }
        assert!(!can(Shipped, OnHold));
        assert!(can(OnHold, Paid));
        assert!(can(OnHold, Processing));
    }

    #[test]
    fn cancellation_blocked_only_after_shipping() {
        use OrderStatus::{AwaitingPayment, Cancelled, OnHold, Paid, Pending, Processing, Shipped};
        for from in [Pending, AwaitingPayment, Paid, Processing, OnHold] {
            assert!(can(from, Cancelled), "{from:?} -> cancelled should be allowed");
        }
        assert!(!can(Shipped, Cancelled));
        assert!(!can(Cancelled, Paid));
    }
}
