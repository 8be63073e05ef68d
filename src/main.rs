use std::sync::Arc;

use vinylogix_api::{
    constants,
    db::Store,
    routes,
    services::{
        notifications::Notifier,
        providers::{paypal::PaypalProvider, stripe::StripeProvider, Providers},
    },
    state::AppState,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let store = Store::open(&*constants::db::DB_PATH).expect("Failed to open order store");
    let providers = Arc::new(Providers {
        stripe: Arc::new(StripeProvider::from_env().expect("Failed to build Stripe client")),
        paypal: Arc::new(PaypalProvider::from_env().expect("Failed to build PayPal client")),
    });
    let state = AppState {
        store: store.clone(),
        providers,
        notifier: Notifier::from_env(),
    };

    spawn_pending_order_sweeper(store);

    let app = axum::Router::new()
        .route("/", axum::routing::get(root))
        .nest("/checkout", routes::checkout::create_router())
        .nest("/orders", routes::orders::create_router())
        .nest("/webhook", routes::webhook::create_router())
        .with_state(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", *constants::api::PORT))
        .await
        .expect("Failed to bind listener");
    tracing::info!(port = *constants::api::PORT, "vinylogix-api listening");
    axum::serve(listener, app)
        .await
        .expect("Failed to init Axum service");
}

/// Periodically deletes pending orders that were never paid for. Abandoned
/// checkouts would otherwise accumulate forever.
fn spawn_pending_order_sweeper(store: Store) {
    let ttl = time::Duration::seconds(*constants::api::PENDING_ORDER_TTL_SECONDS);
    let every = std::time::Duration::from_secs(*constants::api::PENDING_ORDER_SWEEP_SECONDS);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match vinylogix_api::db::models::pending_order::PendingOrder::sweep_expired(ttl, &store)
            {
                Ok(0) => {}
                Ok(swept) => tracing::info!(swept, "Swept expired pending orders"),
                Err(err) => tracing::error!(%err, "Pending order sweep failed"),
            }
        }
    });
}

async fn root() -> String {
    "Vinylogix order service is running!".to_string()
}
