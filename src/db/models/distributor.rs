//! Models for distributor documents: payout account references, the
//! per-distributor order counter and the human-readable order number prefix.
use redb::ReadableTable as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{errors::DatabaseError, Store, DISTRIBUTORS};
use crate::utils::email::EmailAddress;

/// Connected payout account status as reported by provider onboarding events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutAccountStatus {
    Pending,
    Active,
    Revoked,
}

/// INSERT model for a `Distributor`.
pub struct DistributorInsert {
    pub name: String,
    pub contact_email: EmailAddress,
    /// Prefix for human-readable order numbers, e.g. `VLX`.
    pub order_id_prefix: String,
}

/// A `Distributor` held in the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Distributor {
    id: Uuid,
    pub name: String,
    pub contact_email: EmailAddress,
    pub order_id_prefix: String,
    /// Monotonic counter backing order number assignment. Owned exclusively
    /// by the promotion transaction; nothing else may advance it.
    order_counter: u64,
    pub stripe_account_id: Option<String>,
    pub stripe_account_status: Option<PayoutAccountStatus>,
    pub paypal_merchant_id: Option<String>,
    pub paypal_account_status: Option<PayoutAccountStatus>,
}

impl DistributorInsert {
    pub fn store(self, store: &Store) -> Result<Distributor, DatabaseError> {
        let distributor = Distributor {
            id: Uuid::new_v4(),
            name: self.name,
            contact_email: self.contact_email,
            order_id_prefix: self.order_id_prefix,
            order_counter: 0,
            stripe_account_id: None,
            stripe_account_status: None,
            paypal_merchant_id: None,
            paypal_account_status: None,
        };
        let txn = store.begin_write()?;
        {
            let mut table = txn.open_table(DISTRIBUTORS)?;
            let encoded = serde_json::to_vec(&distributor)?;
            table.insert(distributor.id.to_string().as_str(), encoded.as_slice())?;
        }
        txn.commit()?;
        Ok(distributor)
    }
}

impl Distributor {
    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub const fn order_counter(&self) -> u64 {
        self.order_counter
    }

    /// Reserve the next order number. Only valid inside the promotion
    /// transaction that also persists the advanced counter.
    pub fn next_order_number(&mut self) -> String {
        self.order_counter += 1;
        format!("{}-{:05}", self.order_id_prefix, self.order_counter)
    }

    pub fn select_one(id: Uuid, store: &Store) -> Result<Option<Self>, DatabaseError> {
        let txn = store.begin_read()?;
        let table = txn.open_table(DISTRIBUTORS)?;
        let Some(raw) = table.get(id.to_string().as_str())? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(raw.value())?))
    }

    /// Look a distributor up by connected Stripe account id (onboarding
    /// webhooks carry only the account id). Distributor counts are small;
    /// a scan is fine.
    pub fn select_by_stripe_account(
        account_id: &str,
        store: &Store,
    ) -> Result<Option<Self>, DatabaseError> {
        Self::scan_for(store, |distributor| {
            distributor.stripe_account_id.as_deref() == Some(account_id)
        })
    }

    pub fn select_by_paypal_merchant(
        merchant_id: &str,
        store: &Store,
    ) -> Result<Option<Self>, DatabaseError> {
        Self::scan_for(store, |distributor| {
            distributor.paypal_merchant_id.as_deref() == Some(merchant_id)
        })
    }

    fn scan_for(
        store: &Store,
        matcher: impl Fn(&Self) -> bool,
    ) -> Result<Option<Self>, DatabaseError> {
        let txn = store.begin_read()?;
        let table = txn.open_table(DISTRIBUTORS)?;
        for entry in table.iter()? {
            let (_, raw) = entry?;
            let distributor: Self = serde_json::from_slice(raw.value())?;
            if matcher(&distributor) {
                return Ok(Some(distributor));
            }
        }
        Ok(None)
    }

    /// Persist the payout account fields of this copy. The stored document
    /// is re-read inside the write transaction and only the payout fields
    /// are replaced, so `order_counter` always keeps the stored value even
    /// when this copy was read before a promotion advanced it.
    pub fn store_payout_accounts(&self, store: &Store) -> Result<(), DatabaseError> {
        let txn = store.begin_write()?;
        {
            let mut table = txn.open_table(DISTRIBUTORS)?;
            let key = self.id.to_string();
            let mut current: Self = match table.get(key.as_str())? {
                Some(raw) => serde_json::from_slice(raw.value())?,
                None => self.clone(),
            };
            current.stripe_account_id = self.stripe_account_id.clone();
            current.stripe_account_status = self.stripe_account_status;
            current.paypal_merchant_id = self.paypal_merchant_id.clone();
            current.paypal_account_status = self.paypal_account_status;
            let encoded = serde_json::to_vec(&current)?;
            table.insert(key.as_str(), encoded.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Persist this distributor inside an open write transaction. Used by
    /// the promotion transaction to advance the order counter atomically
    /// with order creation.
    pub fn update_in(&self, txn: &redb::WriteTransaction) -> Result<(), DatabaseError> {
        let mut table = txn.open_table(DISTRIBUTORS)?;
        let encoded = serde_json::to_vec(self)?;
        table.insert(self.id.to_string().as_str(), encoded.as_slice())?;
        Ok(())
    }

    /// Load a distributor inside an open write transaction.
    pub fn select_one_in(
        id: Uuid,
        txn: &redb::WriteTransaction,
    ) -> Result<Option<Self>, DatabaseError> {
        let table = txn.open_table(DISTRIBUTORS)?;
        let Some(raw) = table.get(id.to_string().as_str())? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(raw.value())?))
    }

    pub fn set_stripe_account(&mut self, account_id: String, status: PayoutAccountStatus) {
        self.stripe_account_id = Some(account_id);
        self.stripe_account_status = Some(status);
    }

    pub fn set_paypal_merchant(&mut self, merchant_id: String, status: PayoutAccountStatus) {
        self.paypal_merchant_id = Some(merchant_id);
        self.paypal_account_status = Some(status);
    }
}
