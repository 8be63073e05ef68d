//! Constants related to the general configuration of the entire API and its deployment.

use std::{env::var, sync::LazyLock};

/// The TCP port the API listens on.
pub static PORT: LazyLock<u16> = LazyLock::new(|| {
    var("PORT").map_or(8080, |port| {
        port.parse().expect("PORT is not a valid port number")
    })
});

/// The externally reachable base URL, used to build payment provider
/// return/cancel URLs.
pub static PUBLIC_BASE_URL: LazyLock<String> =
    LazyLock::new(|| var("PUBLIC_BASE_URL").unwrap_or_else(|_| String::from("http://localhost:8080")));

/// How long an unpaid pending order may exist before the sweeper removes it.
pub static PENDING_ORDER_TTL_SECONDS: LazyLock<i64> = LazyLock::new(|| {
    var("PENDING_ORDER_TTL_SECONDS").map_or(86_400, |ttl| {
        ttl.parse()
            .expect("PENDING_ORDER_TTL_SECONDS is not a valid number of seconds")
    })
});

/// Interval between pending order expiry sweeps.
pub static PENDING_ORDER_SWEEP_SECONDS: LazyLock<u64> = LazyLock::new(|| {
    var("PENDING_ORDER_SWEEP_SECONDS").map_or(3_600, |every| {
        every
            .parse()
            .expect("PENDING_ORDER_SWEEP_SECONDS is not a valid number of seconds")
    })
});
