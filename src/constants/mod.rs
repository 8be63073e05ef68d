//! Constants (primarily environment variables/secrets) used across the application.
pub mod api;
pub mod db;
pub mod email;
pub mod fees;
pub mod paypal;
mod secrets;
pub mod stripe;
