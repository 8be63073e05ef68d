//! Platform fee configuration. The fee percentage is deployment
//! configuration, not something business logic may hardcode.

use std::{env::var, sync::LazyLock};

/// Platform fee retained on every order, in basis points of the order total
/// (400 = 4%).
pub static PLATFORM_FEE_BASIS_POINTS: LazyLock<u32> = LazyLock::new(|| {
    var("PLATFORM_FEE_BASIS_POINTS").map_or(400, |bp| {
        bp.parse()
            .expect("PLATFORM_FEE_BASIS_POINTS is not a valid number")
    })
});
