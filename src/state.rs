//! Defines the state shared across the Axum application.
use std::sync::Arc;

use crate::{db::Store, services::notifications::Notifier, services::providers::Providers};

#[derive(Clone)]
/// The state struct shared across routers.
pub struct AppState {
    /// Handle on the embedded order store.
    pub store: Store,
    /// The configured payment provider clients.
    pub providers: Arc<Providers>,
    /// Fire-and-forget notification sink.
    pub notifier: Notifier,
}
