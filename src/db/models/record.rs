//! Models for authoritative inventory records. The cart validator re-prices
//! every checkout line from these; client-supplied prices are never read.
use redb::ReadableTable as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{errors::DatabaseError, Store, RECORDS};

/// INSERT model for a vinyl `Record`. Used ONLY when adding inventory.
pub struct RecordInsert {
    pub distributor_id: Uuid,
    pub title: String,
    pub artist: String,
    pub cover_url: Option<String>,
    /// Selling price in decimal currency units.
    pub selling_price: f64,
    /// Shipping weight in grams, when known.
    pub weight_grams: Option<i64>,
    /// Whether this record is part of sellable inventory (as opposed to a
    /// catalogue-only entry).
    pub is_inventory_item: bool,
    pub is_for_sale: bool,
}

/// A `Record` held in the store. Can only be constructed by reading it back.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Record {
    id: Uuid,
    pub distributor_id: Uuid,
    pub title: String,
    pub artist: String,
    pub cover_url: Option<String>,
    pub selling_price: f64,
    pub weight_grams: Option<i64>,
    pub is_inventory_item: bool,
    pub is_for_sale: bool,
}

impl RecordInsert {
    /// Store this INSERT model and return the complete `Record`.
    pub fn store(self, store: &Store) -> Result<Record, DatabaseError> {
        let record = Record {
            id: Uuid::new_v4(),
            distributor_id: self.distributor_id,
            title: self.title,
            artist: self.artist,
            cover_url: self.cover_url,
            selling_price: self.selling_price,
            weight_grams: self.weight_grams,
            is_inventory_item: self.is_inventory_item,
            is_for_sale: self.is_for_sale,
        };
        let txn = store.begin_write()?;
        {
            let mut table = txn.open_table(RECORDS)?;
            let encoded = serde_json::to_vec(&record)?;
            table.insert(record.id.to_string().as_str(), encoded.as_slice())?;
        }
        txn.commit()?;
        Ok(record)
    }
}

impl Record {
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Whether this record may appear in a cart at all.
    pub const fn purchasable(&self) -> bool {
        self.is_inventory_item && self.is_for_sale
    }

    pub fn select_one(id: Uuid, store: &Store) -> Result<Option<Self>, DatabaseError> {
        let txn = store.begin_read()?;
        let table = txn.open_table(RECORDS)?;
        let Some(raw) = table.get(id.to_string().as_str())? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(raw.value())?))
    }
}
