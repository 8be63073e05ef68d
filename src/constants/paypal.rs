use std::{env::var, sync::LazyLock};

use super::secrets::read_secret;

pub static PAYPAL_CLIENT_ID: LazyLock<String> = LazyLock::new(|| {
    var("PAYPAL_CLIENT_ID").expect("PAYPAL_CLIENT_ID not set in environment variables.")
});

pub static PAYPAL_CLIENT_SECRET: LazyLock<String> = LazyLock::new(|| {
    var("PAYPAL_CLIENT_SECRET").unwrap_or_else(|_| {
        let secret_path = var("PAYPAL_CLIENT_SECRET_DOCKER_SECRET").expect(
            "Neither PAYPAL_CLIENT_SECRET nor PAYPAL_CLIENT_SECRET_DOCKER_SECRET provided in environment variables"
        );
        read_secret(&secret_path).expect("Failed to read PAYPAL_CLIENT_SECRET docker secret")
    })
});

/// Webhook id assigned by PayPal when the webhook endpoint is registered,
/// required by the signature verification endpoint.
pub static PAYPAL_WEBHOOK_ID: LazyLock<String> = LazyLock::new(|| {
    var("PAYPAL_WEBHOOK_ID").expect("PAYPAL_WEBHOOK_ID not set in environment variables.")
});

/// Either `live` or `sandbox`. Selects the API base URL and whether webhook
/// signature verification failures are fatal.
pub static PAYPAL_MODE: LazyLock<String> =
    LazyLock::new(|| var("PAYPAL_MODE").unwrap_or_else(|_| String::from("sandbox")));
