//! API routes within the application. Mainly exposes sub-routers which should
//! be nested with the main Axum router.
pub mod checkout;
pub mod orders;
pub mod webhook;
