//! The order reconciler: converts a completed external payment into a
//! durable order exactly once. The pending order id is the idempotency
//! anchor; promotion (order insert + distributor counter advance + pending
//! delete + capture index write) is one write transaction, so concurrent
//! webhook redelivery can never double-create orders or duplicate order
//! numbers.
use crate::db::{
    models::{
        distributor::Distributor,
        order::{Order, OrderInsert, PaymentStatus, ProviderReferences},
        pending_order::PendingOrder,
    },
    Store,
};
use crate::services::notifications::Notifier;
use crate::services::providers::{PaymentMethod, PaymentProvider, ProviderCapture};

/// Outcome of a reconciliation attempt.
pub enum ReconcileOutcome {
    /// A new durable order was created.
    Created(Order),
    /// The pending order was already promoted (or never existed); duplicate
    /// deliveries land here and are a success no-op.
    AlreadyProcessed,
}

/// Full capture path: load the staged order, capture at the provider, then
/// promote. Used by the PayPal return callback and by any flow where the
/// event does not itself carry a capture.
pub async fn reconcile_capture(
    pending_order_id: &str,
    provider: &dyn PaymentProvider,
    store: &Store,
    notifier: &Notifier,
) -> Result<ReconcileOutcome, errors::ReconcileError> {
    let Some(pending) = PendingOrder::select_one(pending_order_id, store)? else {
        tracing::info!(pending_order_id, "Reconciliation no-op: pending order absent");
        return Ok(ReconcileOutcome::AlreadyProcessed);
    };
    let provider_order_id = pending
        .provider_order_id
        .clone()
        .ok_or_else(|| errors::ReconcileError::NoProviderOrder(pending_order_id.to_owned()))?;
    let capture = provider.capture(&provider_order_id).await.map_err(|err| {
        // Pending order deliberately left in place for manual investigation.
        tracing::error!(pending_order_id, provider_order_id, %err, "Payment capture failed");
        errors::ReconcileError::CaptureFailed(err)
    })?;
    promote(pending_order_id, &capture, store, notifier)
}

/// Promote a staged pending order into a durable order using an
/// already-known capture (webhook events carry one). Safe to call
/// concurrently and repeatedly for the same pending order id.
pub fn promote(
    pending_order_id: &str,
    capture: &ProviderCapture,
    store: &Store,
    notifier: &Notifier,
) -> Result<ReconcileOutcome, errors::ReconcileError> {
    let txn = store.begin_write()?;
    // Existence re-check inside the write transaction: the second of two
    // racing deliveries finds the pending order already consumed.
    let Some(pending) = PendingOrder::select_one_in(pending_order_id, &txn)? else {
        tracing::info!(pending_order_id, "Promotion no-op: pending order already consumed");
        return Ok(ReconcileOutcome::AlreadyProcessed);
    };
    let mut distributor = Distributor::select_one_in(pending.distributor_id, &txn)?
        .ok_or(errors::ReconcileError::DistributorNonExistent(pending.distributor_id))?;
    let order_number = distributor.next_order_number();

    let provider_order_id = pending
        .provider_order_id
        .clone()
        .ok_or_else(|| errors::ReconcileError::NoProviderOrder(pending_order_id.to_owned()))?;
    let provider_references = match pending.payment_method {
        PaymentMethod::Stripe => ProviderReferences::Stripe {
            payment_intent_id: capture.capture_id.clone(),
            checkout_session_id: provider_order_id,
        },
        PaymentMethod::Paypal => ProviderReferences::Paypal {
            order_id: provider_order_id,
            capture_id: capture.capture_id.clone(),
        },
    };

    if let Some(payer_email) = &capture.payer_email {
        if payer_email != pending.viewer_email.as_str() {
            tracing::warn!(
                pending_order_id,
                payer_email,
                checkout_email = pending.viewer_email.as_str(),
                "Payer email reported at capture differs from checkout email"
            );
        }
    }

    let order = OrderInsert {
        order_number,
        distributor_id: pending.distributor_id,
        viewer_id: pending.viewer_id,
        viewer_email: pending.viewer_email.clone(),
        customer_name: pending.customer_name.clone(),
        shipping_address: pending.shipping_address.clone(),
        billing_address: pending.billing_address.clone(),
        phone_number: pending.phone_number.clone(),
        items: pending.items.clone(),
        total_minor_units: pending.total_minor_units,
        platform_fee_minor_units: pending.platform_fee_minor_units,
        total_weight_grams: pending.total_weight_grams,
        provider_references,
        payer_email: capture.payer_email.clone(),
        payer_name: capture.payer_name.clone(),
    }
    .store_in(&txn)?;
    distributor.update_in(&txn)?;
    PendingOrder::delete_in(pending_order_id, &txn)?;
    txn.commit().map_err(crate::db::errors::DatabaseError::from)?;

    tracing::info!(
        pending_order_id,
        order_id = %order.id(),
        order_number = order.order_number,
        total_minor_units = order.total_minor_units(),
        "Pending order promoted"
    );
    notifier.order_confirmation(&order);
    notifier.new_order_alert(&order, &distributor.contact_email);
    Ok(ReconcileOutcome::Created(order))
}

/// Mark the order behind a provider capture id as refunded. Totals and the
/// item snapshot are untouched. An unknown capture id is a logged no-op so
/// out-of-order webhook delivery never errors back to the provider. The
/// whole lookup-and-mark runs in one write transaction.
pub fn apply_refund(capture_key: &str, store: &Store) -> Result<Option<Order>, crate::db::errors::DatabaseError> {
    let txn = store.begin_write()?;
    let Some(mut order) = Order::select_by_capture_in(capture_key, &txn)? else {
        tracing::warn!(capture_key, "Refund webhook for unknown capture id; ignoring");
        return Ok(None);
    };
    order.set_payment_status(PaymentStatus::Refunded);
    order.update_in(&txn)?;
    txn.commit().map_err(crate::db::errors::DatabaseError::from)?;
    tracing::info!(
        capture_key,
        order_id = %order.id(),
        order_number = order.order_number,
        "Order marked refunded"
    );
    Ok(Some(order))
}

/// Record a denied capture. The pending order stays in place for manual
/// investigation; denial is terminal and never auto-retried.
pub fn record_capture_denied(pending_order_id: &str, store: &Store) {
    match PendingOrder::select_one(pending_order_id, store) {
        Ok(Some(pending)) => tracing::error!(
            pending_order_id,
            provider_order_id = ?pending.provider_order_id,
            total_minor_units = pending.total_minor_units,
            "Payment capture denied; pending order retained for investigation"
        ),
        Ok(None) => tracing::warn!(
            pending_order_id,
            "Capture denied for an unknown or already-promoted pending order"
        ),
        Err(err) => tracing::error!(pending_order_id, %err, "Failed to load pending order for denial"),
    }
}

pub mod errors {
    use thiserror::Error;
    use uuid::Uuid;

    use crate::db::errors::DatabaseError;
    use crate::services::providers::errors::ProviderError;

    #[derive(Error, Debug)]
    pub enum ReconcileError {
        #[error(transparent)]
        DatabaseError(#[from] DatabaseError),
        #[error("Payment capture failed")]
        CaptureFailed(#[source] ProviderError),
        #[error("Pending order has no provider order id attached")]
        NoProviderOrder(String),
        #[error("Distributor does not exist")]
        DistributorNonExistent(Uuid),
    }
}
