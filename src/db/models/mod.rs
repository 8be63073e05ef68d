//! Models stored in the embedded order store. Each follows the same shape:
//! an `*Insert` struct for creating a document and an entity struct that can
//! only be obtained by reading one back.
pub mod distributor;
pub mod order;
pub mod pending_order;
pub mod record;
