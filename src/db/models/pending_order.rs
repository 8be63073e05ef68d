//! Models for staged carts awaiting payment. A pending order remembers the
//! server-validated items and totals across the provider redirect, so the
//! capture step never trusts anything the provider or client sends back
//! except correlation ids.
use redb::ReadableTable as _;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{errors::DatabaseError, Store, PENDING_ORDERS};
use crate::services::providers::PaymentMethod;
use crate::utils::email::EmailAddress;

/// A validated cart line frozen at checkout time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingOrderItem {
    pub record_id: Uuid,
    pub title: String,
    pub artist: String,
    pub cover_url: Option<String>,
    /// Authoritative unit price re-fetched at validation time.
    pub price_minor_units: i64,
    pub quantity: u32,
}

/// INSERT model for a `PendingOrder`.
pub struct PendingOrderInsert {
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
    pub payment_method: PaymentMethod,
}

/// A staged order awaiting payment. Mutated exactly once (to attach the
/// provider order id) and then only ever consumed or swept.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingOrder {
    id: String,
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
    pub payment_method: PaymentMethod,
    pub provider_order_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PendingOrderInsert {
    pub fn store(self, store: &Store) -> Result<PendingOrder, DatabaseError> {
        let pending = PendingOrder {
            id: format!("po_{}", Uuid::new_v4().simple()),
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
            payment_method: self.payment_method,
            provider_order_id: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let txn = store.begin_write()?;
        {
            let mut table = txn.open_table(PENDING_ORDERS)?;
            let encoded = serde_json::to_vec(&pending)?;
            table.insert(pending.id.as_str(), encoded.as_slice())?;
        }
        txn.commit()?;
        Ok(pending)
    }
}

impl PendingOrder {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn select_one(id: &str, store: &Store) -> Result<Option<Self>, DatabaseError> {
        let txn = store.begin_read()?;
        let table = txn.open_table(PENDING_ORDERS)?;
        let Some(raw) = table.get(id)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(raw.value())?))
    }

    /// The single permitted mutation: attach the provider's order/session id
    /// once provider-side checkout creation succeeds.
    pub fn attach_provider_order_id(
        &mut self,
        provider_order_id: String,
        store: &Store,
    ) -> Result<(), DatabaseError> {
        self.provider_order_id = Some(provider_order_id);
        let txn = store.begin_write()?;
        {
            let mut table = txn.open_table(PENDING_ORDERS)?;
            let encoded = serde_json::to_vec(self)?;
            table.insert(self.id.as_str(), encoded.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Delete an abandoned or failed staging record outside promotion.
    pub fn delete(self, store: &Store) -> Result<(), DatabaseError> {
        let txn = store.begin_write()?;
        {
            let mut table = txn.open_table(PENDING_ORDERS)?;
            table.remove(self.id.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Load a pending order inside an open write transaction. The promotion
    /// transaction uses this as its idempotency re-check: a redelivered
    /// webhook racing a capture finds the record already gone.
    pub fn select_one_in(
        id: &str,
        txn: &redb::WriteTransaction,
    ) -> Result<Option<Self>, DatabaseError> {
        let table = txn.open_table(PENDING_ORDERS)?;
        let Some(raw) = table.get(id)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(raw.value())?))
    }

    /// Consume a pending order inside an open write transaction.
    pub fn delete_in(id: &str, txn: &redb::WriteTransaction) -> Result<(), DatabaseError> {
        let mut table = txn.open_table(PENDING_ORDERS)?;
        table.remove(id)?;
        Ok(())
    }

    /// Delete every pending order older than `ttl` and return how many were
    /// swept. Runs in a single write transaction.
    pub fn sweep_expired(ttl: time::Duration, store: &Store) -> Result<usize, DatabaseError> {
        let cutoff = OffsetDateTime::now_utc() - ttl;
        let txn = store.begin_write()?;
        let mut expired = Vec::new();
        {
            let table = txn.open_table(PENDING_ORDERS)?;
            for entry in table.iter()? {
                let (key, raw) = entry?;
                let pending: Self = serde_json::from_slice(raw.value())?;
                if pending.created_at < cutoff {
                    expired.push(key.value().to_owned());
                }
            }
        }
        {
            let mut table = txn.open_table(PENDING_ORDERS)?;
            for id in &expired {
                table.remove(id.as_str())?;
            }
        }
        txn.commit()?;
        Ok(expired.len())
    }
}
