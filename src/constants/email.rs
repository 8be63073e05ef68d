//! Constants for the outbound email notification sink.

use std::{env::var, sync::LazyLock};

use super::secrets::read_secret;

/// API key for the transactional email provider. `None` disables sending
/// (notifications are logged only), which is the default for local runs.
pub static EMAIL_API_KEY: LazyLock<Option<String>> = LazyLock::new(|| {
    var("EMAIL_API_KEY").ok().or_else(|| {
        var("EMAIL_API_KEY_DOCKER_SECRET")
            .ok()
            .and_then(|secret_path| read_secret(&secret_path).ok())
    })
});

pub static EMAIL_API_URL: LazyLock<String> =
    LazyLock::new(|| var("EMAIL_API_URL").unwrap_or_else(|_| String::from("https://api.resend.com/emails")));

pub static EMAIL_FROM_ADDRESS: LazyLock<String> =
    LazyLock::new(|| var("EMAIL_FROM_ADDRESS").unwrap_or_else(|_| String::from("orders@vinylogix.example")));
