//! Models for durable orders. An order is created exactly once per captured
//! payment (inside the promotion transaction) and never deleted; everything
//! after creation is a status transition or fulfillment detail.
use redb::ReadableTable as _;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{errors::DatabaseError, Store, ORDERS, ORDERS_BY_CAPTURE};
use crate::services::providers::PaymentMethod;
use crate::utils::email::EmailAddress;

use super::pending_order::PendingOrderItem;

/// Fulfillment status state machine. Transition rules live in
/// [`Order::can_transition_to`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    AwaitingPayment,
    Paid,
    Processing,
    Shipped,
    OnHold,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Failed,
    Refunded,
}

/// Provider correlation ids. Exactly one variant is populated, matching the
/// order's payment method.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "provider")]
pub enum ProviderReferences {
    Stripe {
        payment_intent_id: String,
        checkout_session_id: String,
    },
    Paypal {
        order_id: String,
        capture_id: String,
    },
}

impl ProviderReferences {
    /// The id refund webhooks correlate on: the PayPal capture id, or the
    /// Stripe payment intent id (Stripe refund events carry it).
    pub fn capture_key(&self) -> &str {
        match self {
            Self::Stripe {
                payment_intent_id, ..
            } => payment_intent_id,
            Self::Paypal { capture_id, .. } => capture_id,
        }
    }

    pub const fn method(&self) -> PaymentMethod {
        match self {
            Self::Stripe { .. } => PaymentMethod::Stripe,
            Self::Paypal { .. } => PaymentMethod::Paypal,
        }
    }
}

/// Shipment tracking details, set during fulfillment only.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrackingDetails {
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub tracking_url: Option<String>,
    pub estimated_delivery_date: Option<String>,
}

/// INSERT model for an `Order`. Built by the reconciler from a consumed
/// pending order; only ever stored inside the promotion transaction.
pub struct OrderInsert {
    pub order_number: String,
    pub distributor_id: Uuid,
    pub viewer_id: Uuid,
    pub viewer_email: EmailAddress,
    pub customer_name: String,
    pub shipping_address: String,
    pub billing_address: String,
    pub phone_number: Option<String>,
    pub items: Vec<PendingOrderItem>,
    pub total_minor_units: i64,
    pub platform_fee_minor_units: i64,
    pub total_weight_grams: Option<i64>,
    pub provider_references: ProviderReferences,
    /// Payer identity as confirmed by the provider at capture time.
    pub payer_email: Option<String>,
    pub payer_name: Option<String>,
}

/// A durable `Order`. Can only be constructed by reading it back from the
/// store (or inserting inside the promotion transaction).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    id: Uuid,
    pub order_number: String,
    pub distributor_id: Uuid,
    pub viewer_id: Uuid,
    pub viewer_email: EmailAddress,
    pub customer_name: String,
    pub shipping_address: String,
    pub billing_address: String,
    pub phone_number: Option<String>,
    /// Immutable snapshot of what was purchased; never re-derived from live
    /// inventory.
    items: Vec<PendingOrderItem>,
    total_minor_units: i64,
    platform_fee_minor_units: i64,
    pub total_weight_grams: Option<i64>,
    status: OrderStatus,
    payment_status: PaymentStatus,
    pub provider_references: ProviderReferences,
    /// Payer identity confirmed by the provider at capture time; may differ
    /// from `viewer_email` when someone pays on the buyer's behalf.
    #[serde(default)]
    pub payer_email: Option<String>,
    #[serde(default)]
    pub payer_name: Option<String>,
    pub tracking: TrackingDetails,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub paid_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub shipped_at: Option<OffsetDateTime>,
}

impl OrderInsert {
    /// Store this INSERT model inside the promotion transaction, along with
    /// its capture index entry. The order is born `paid`/`paid`.
    pub fn store_in(self, txn: &redb::WriteTransaction) -> Result<Order, DatabaseError> {
        let now = OffsetDateTime::now_utc();
        let order = Order {
            id: Uuid::new_v4(),
            order_number: self.order_number,
            distributor_id: self.distributor_id,
            viewer_id: self.viewer_id,
            viewer_email: self.viewer_email,
            customer_name: self.customer_name,
            shipping_address: self.shipping_address,
            billing_address: self.billing_address,
            phone_number: self.phone_number,
            items: self.items,
            total_minor_units: self.total_minor_units,
            platform_fee_minor_units: self.platform_fee_minor_units,
            total_weight_grams: self.total_weight_grams,
            status: OrderStatus::Paid,
            payment_status: PaymentStatus::Paid,
            provider_references: self.provider_references,
            payer_email: self.payer_email,
            payer_name: self.payer_name,
            tracking: TrackingDetails::default(),
            created_at: now,
            updated_at: now,
            paid_at: Some(now),
            shipped_at: None,
        };
        {
            let mut table = txn.open_table(ORDERS)?;
            let encoded = serde_json::to_vec(&order)?;
            table.insert(order.id.to_string().as_str(), encoded.as_slice())?;
        }
        {
            let mut index = txn.open_table(ORDERS_BY_CAPTURE)?;
            index.insert(
                order.provider_references.capture_key(),
                order.id.to_string().as_str(),
            )?;
        }
        Ok(order)
    }
}

impl Order {
    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub fn items(&self) -> &[PendingOrderItem] {
        &self.items
    }

    pub const fn total_minor_units(&self) -> i64 {
        self.total_minor_units
    }

    pub const fn platform_fee_minor_units(&self) -> i64 {
        self.platform_fee_minor_units
    }

    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    pub const fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    /// Whether the fulfillment state machine permits moving to `target`.
    /// Forward movement follows the chain pending -> awaiting_payment ->
    /// paid -> processing -> shipped; `on_hold` is reachable from any
    /// pre-shipped state, `cancelled` from any non-shipped state. Shipped
    /// and cancelled are terminal.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::{
            AwaitingPayment, Cancelled, OnHold, Paid, Pending, Processing, Shipped,
        };
        match (self.status, target) {
            (Pending, AwaitingPayment)
            | (AwaitingPayment, Paid)
            | (Paid, Processing)
            | (Processing, Shipped)
            | (OnHold, Paid | Processing) => true,
            (Pending | AwaitingPayment | Paid | Processing, OnHold)
            | (Pending | AwaitingPayment | Paid | Processing | OnHold, Cancelled) => true,
            _ => false,
        }
    }

    /// Apply a fulfillment transition. Timestamps are maintained here:
    /// `shipped_at` exactly on entering shipped, `paid_at` when staff mark
    /// an order paid manually and it was never set.
    pub fn set_status(&mut self, status: OrderStatus) {
        let now = OffsetDateTime::now_utc();
        self.status = status;
        self.updated_at = now;
        match status {
            OrderStatus::Shipped => self.shipped_at = Some(now),
            OrderStatus::Paid if self.paid_at.is_none() => self.paid_at = Some(now),
            _ => {}
        }
    }

    pub fn set_payment_status(&mut self, payment_status: PaymentStatus) {
        self.payment_status = payment_status;
        self.updated_at = OffsetDateTime::now_utc();
    }

    pub fn set_tracking(&mut self, tracking: TrackingDetails) {
        self.tracking = tracking;
        self.updated_at = OffsetDateTime::now_utc();
    }

    pub fn select_one(id: Uuid, store: &Store) -> Result<Option<Self>, DatabaseError> {
        let txn = store.begin_read()?;
        let table = txn.open_table(ORDERS)?;
        let Some(raw) = table.get(id.to_string().as_str())? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(raw.value())?))
    }

    /// Locate an order by provider capture id inside an open write
    /// transaction (refund webhooks mutate what they find).
    pub fn select_by_capture_in(
        capture_key: &str,
        txn: &redb::WriteTransaction,
    ) -> Result<Option<Self>, DatabaseError> {
        let order_id = {
            let index = txn.open_table(ORDERS_BY_CAPTURE)?;
            let Some(order_id) = index.get(capture_key)? else {
                return Ok(None);
            };
            order_id.value().to_owned()
        };
        let table = txn.open_table(ORDERS)?;
        let Some(raw) = table.get(order_id.as_str())? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(raw.value())?))
    }

    /// Load an order inside an open write transaction, for mutations that
    /// must not clobber writes landing between a separate read and write.
    pub fn select_one_in(
        id: Uuid,
        txn: &redb::WriteTransaction,
    ) -> Result<Option<Self>, DatabaseError> {
        let table = txn.open_table(ORDERS)?;
        let Some(raw) = table.get(id.to_string().as_str())? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(raw.value())?))
    }

    pub fn select_by_distributor(
        distributor_id: Uuid,
        store: &Store,
    ) -> Result<Vec<Self>, DatabaseError> {
        let txn = store.begin_read()?;
        let table = txn.open_table(ORDERS)?;
        let mut orders = Vec::new();
        for entry in table.iter()? {
            let (_, raw) = entry?;
            let order: Self = serde_json::from_slice(raw.value())?;
            if order.distributor_id == distributor_id {
                orders.push(order);
            }
        }
        orders.sort_by(|a, b| a.order_number.cmp(&b.order_number));
        Ok(orders)
    }

    /// Persist this order inside the write transaction it was loaded in.
    /// There is deliberately no store-level update: an order mutated from a
    /// copy read in an earlier transaction would silently erase whatever
    /// landed in between.
    pub fn update_in(&self, txn: &redb::WriteTransaction) -> Result<(), DatabaseError> {
        let mut table = txn.open_table(ORDERS)?;
        let encoded = serde_json::to_vec(self)?;
        table.insert(self.id.to_string().as_str(), encoded.as_slice())?;
        Ok(())
    }
}
