//! Vinylogix order payment reconciliation core: server-side cart validation,
//! provider checkout (Stripe/PayPal with marketplace fee splitting), and
//! idempotent promotion of completed payments into durable orders.
pub mod constants;
pub mod db;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
