//! Integer-minor-unit money helpers. All order arithmetic happens in cents
//! to avoid floating-point drift; decimals exist only at the API edge.

/// Convert a decimal selling price into integer minor units.
#[expect(
    clippy::cast_possible_truncation,
    reason = "Prices are validated as finite and positive before conversion"
)]
pub fn price_to_minor_units(price: f64) -> i64 {
    (price * 100.0).round() as i64
}

/// Platform fee in minor units, rounded half-up. `None` when the scaled
/// total does not fit in an `i64`.
pub const fn platform_fee(total_minor_units: i64, basis_points: u32) -> Option<i64> {
    match total_minor_units.checked_mul(basis_points as i64) {
        Some(scaled) => match scaled.checked_add(5_000) {
            Some(biased) => Some(biased / 10_000),
            None => None,
        },
        None => None,
    }
}

/// Render minor units as a decimal string ("5500" -> "55.00"), the format
/// PayPal amount fields require.
pub fn minor_units_to_decimal(minor_units: i64) -> String {
    format!("{}.{:02}", minor_units / 100, (minor_units % 100).abs())
}

/// Minor units as decimal currency units for API responses.
#[expect(
    clippy::cast_precision_loss,
    reason = "Order totals are far below the 2^53 precision boundary"
)]
pub fn minor_units_to_amount(minor_units: i64) -> f64 {
    minor_units as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::{minor_units_to_decimal, platform_fee, price_to_minor_units};

    #[test]
    fn prices_round_to_cents() {
        assert_eq!(price_to_minor_units(12.50), 1250);
        assert_eq!(price_to_minor_units(30.00), 3000);
        assert_eq!(price_to_minor_units(0.015), 2); // rounds half away from zero
    }

    #[test]
    fn fee_is_four_percent_at_default_basis_points() {
        assert_eq!(platform_fee(5_500, 400), Some(220));
        assert_eq!(platform_fee(100, 400), Some(4));
        assert_eq!(platform_fee(12, 400), Some(0)); // 0.48 rounds down
        assert_eq!(platform_fee(13, 400), Some(1)); // 0.52 rounds up
    }

    #[test]
    fn fee_refuses_totals_that_overflow_when_scaled() {
        assert!(platform_fee(i64::MAX, 400).is_none());
        assert!(platform_fee(i64::MAX / 300, 400).is_none());
    }

    #[test]
    fn decimal_rendering_pads_cents() {
        assert_eq!(minor_units_to_decimal(5_500), "55.00");
        assert_eq!(minor_units_to_decimal(220), "2.20");
        assert_eq!(minor_units_to_decimal(5), "0.05");
    }
}
