//! Server-side cart validation and re-pricing. The client supplies only
//! record ids and quantities; every price comes from the authoritative
//! record store, and totals are computed in integer minor units.
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{
    models::{pending_order::PendingOrderItem, record::Record},
    Store,
};
use crate::utils::money::{platform_fee, price_to_minor_units};

/// Maximum quantity of a single record per order.
pub const MAX_LINE_QUANTITY: u32 = 100;

/// One client-submitted cart line. Deliberately carries no price field;
/// non-integer quantities are rejected at deserialization.
#[derive(Clone, Debug, Deserialize)]
pub struct CartLine {
    pub record_id: Uuid,
    pub quantity: u32,
}

/// A fully validated, server-priced cart.
#[derive(Debug)]
pub struct ValidatedCart {
    pub items: Vec<PendingOrderItem>,
    pub total_minor_units: i64,
    pub platform_fee_minor_units: i64,
    /// Summed shipping weight, when every line has a known weight.
    pub total_weight_grams: Option<i64>,
}

/// Validate a cart against the claimed distributor. Pure: no persistence on
/// any path. Rules run in order per line; the first violation aborts.
pub fn validate_cart(
    distributor_id: Uuid,
    lines: &[CartLine],
    fee_basis_points: u32,
    store: &Store,
) -> Result<ValidatedCart, errors::CartValidationError> {
    if lines.is_empty() {
        return Err(errors::CartValidationError::EmptyCart);
    }
    let mut items = Vec::with_capacity(lines.len());
    let mut total_minor_units: i64 = 0;
    let mut total_weight_grams: Option<i64> = Some(0);
    for line in lines {
        let record = Record::select_one(line.record_id, store)?
            .ok_or(errors::CartValidationError::RecordNonExistent(line.record_id))?;
        if record.distributor_id != distributor_id {
            return Err(errors::CartValidationError::TenantMismatch {
                record_id: line.record_id,
                claimed_distributor_id: distributor_id,
            });
        }
        if !record.purchasable() {
            return Err(errors::CartValidationError::NotForSale(line.record_id));
        }
        if line.quantity < 1 || line.quantity > MAX_LINE_QUANTITY {
            return Err(errors::CartValidationError::InvalidQuantity {
                record_id: line.record_id,
                quantity: line.quantity,
            });
        }
        if !record.selling_price.is_finite() || record.selling_price <= 0.0 {
            return Err(errors::CartValidationError::InvalidPrice(line.record_id));
        }
        let price_minor_units = price_to_minor_units(record.selling_price);
        total_minor_units = total_minor_units
            .checked_add(
                price_minor_units
                    .checked_mul(i64::from(line.quantity))
                    .ok_or(errors::CartValidationError::TotalTooLarge)?,
            )
            .ok_or(errors::CartValidationError::TotalTooLarge)?;
        total_weight_grams = match (total_weight_grams, record.weight_grams) {
            (Some(sum), Some(weight)) => Some(sum + weight * i64::from(line.quantity)),
            _ => None,
        };
        items.push(PendingOrderItem {
            record_id: record.id(),
            title: record.title,
            artist: record.artist,
            cover_url: record.cover_url,
            price_minor_units,
            quantity: line.quantity,
        });
    }
    let platform_fee_minor_units = platform_fee(total_minor_units, fee_basis_points)
        .ok_or(errors::CartValidationError::TotalTooLarge)?;
    Ok(ValidatedCart {
        platform_fee_minor_units,
        items,
        total_minor_units,
        total_weight_grams,
    })
}

pub mod errors {
    use thiserror::Error;
    use uuid::Uuid;

    use crate::db::errors::DatabaseError;

    #[derive(Error, Debug)]
    pub enum CartValidationError {
        #[error(transparent)]
        DatabaseError(#[from] DatabaseError),
        #[error("Cart contains no items")]
        EmptyCart,
        #[error("Record does not exist")]
        RecordNonExistent(Uuid),
        #[error("Record belongs to a different distributor")]
        TenantMismatch {
            record_id: Uuid,
            claimed_distributor_id: Uuid,
        },
        #[error("Record is not for sale")]
        NotForSale(Uuid),
        #[error("Quantity must be between 1 and 100")]
        InvalidQuantity { record_id: Uuid, quantity: u32 },
        #[error("Record has no valid selling price")]
        InvalidPrice(Uuid),
        #[error("Cart total exceeds the representable range")]
        TotalTooLarge,
    }
}
