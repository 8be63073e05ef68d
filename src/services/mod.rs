//! Business logic services. Routes stay thin; everything with an invariant
//! lives here.
pub mod cart;
pub mod checkout;
pub mod distributors;
pub mod notifications;
pub mod orders;
pub mod providers;
pub mod reconcile;
