//! The embedded order store and its models. redb was chosen because order
//! promotion (create order + advance the distributor counter + consume the
//! pending order) must be one atomic transaction with serialized writers;
//! a write transaction here is exactly that unit.
pub mod models;

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadTransaction, TableDefinition, WriteTransaction};

/// Authoritative inventory records, keyed by record UUID.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
/// Distributor documents (payout accounts, order counter), keyed by UUID.
pub const DISTRIBUTORS: TableDefinition<&str, &[u8]> = TableDefinition::new("distributors");
/// Staged carts awaiting payment, keyed by opaque pending order id.
pub const PENDING_ORDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("pending_orders");
/// Durable orders, keyed by order UUID.
pub const ORDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");
/// Secondary index: provider capture id -> order UUID, for refund webhooks.
pub const ORDERS_BY_CAPTURE: TableDefinition<&str, &str> =
    TableDefinition::new("orders_by_capture");

/// Handle on the embedded database, cheap to clone into handlers.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open (or create) the database and make sure every table exists, so
    /// later read transactions never race table creation.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, errors::DatabaseError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(errors::DatabaseError::Io)?;
        }
        let db = Database::create(path)?;
        let txn = db.begin_write()?;
        {
            txn.open_table(RECORDS)?;
            txn.open_table(DISTRIBUTORS)?;
            txn.open_table(PENDING_ORDERS)?;
            txn.open_table(ORDERS)?;
            txn.open_table(ORDERS_BY_CAPTURE)?;
        }
        txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn begin_read(&self) -> Result<ReadTransaction, errors::DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Write transactions are serialized by redb; whoever holds one is the
    /// single writer for the whole store.
    pub fn begin_write(&self) -> Result<WriteTransaction, errors::DatabaseError> {
        Ok(self.db.begin_write()?)
    }
}

pub mod errors {
    use thiserror::Error;

    /// Errors returned by the embedded order store.
    #[derive(Error, Debug)]
    pub enum DatabaseError {
        #[error(transparent)]
        Open(#[from] redb::DatabaseError),
        #[error(transparent)]
        Transaction(#[from] redb::TransactionError),
        #[error(transparent)]
        Table(#[from] redb::TableError),
        #[error(transparent)]
        Storage(#[from] redb::StorageError),
        #[error(transparent)]
        Commit(#[from] redb::CommitError),
        #[error("Stored document could not be decoded: {0}")]
        Decode(#[from] serde_json::Error),
        #[error("Failed to prepare the database directory: {0}")]
        Io(std::io::Error),
    }
}
