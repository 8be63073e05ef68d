//! Distributor payout-account maintenance driven by provider onboarding
//! webhook events.
use crate::db::{
    models::distributor::{Distributor, PayoutAccountStatus},
    Store,
};

/// Record the status of a distributor's connected Stripe account. Stripe's
/// `account.updated` events carry only the account id, so the distributor
/// is located by it.
pub fn update_stripe_account_status(
    account_id: &str,
    charges_enabled: bool,
    store: &Store,
) -> Result<(), errors::AccountStatusError> {
    let mut distributor = Distributor::select_by_stripe_account(account_id, store)?
        .ok_or_else(|| errors::AccountStatusError::UnknownAccount(account_id.to_owned()))?;
    let status = if charges_enabled {
        PayoutAccountStatus::Active
    } else {
        PayoutAccountStatus::Pending
    };
    distributor.set_stripe_account(account_id.to_owned(), status);
    distributor.store_payout_accounts(store)?;
    tracing::info!(
        distributor_id = %distributor.id(),
        account_id,
        ?status,
        "Stripe payout account status updated"
    );
    Ok(())
}

/// Record the status of a distributor's PayPal merchant account from
/// onboarding / consent events.
pub fn update_paypal_merchant_status(
    merchant_id: &str,
    status: PayoutAccountStatus,
    store: &Store,
) -> Result<(), errors::AccountStatusError> {
    let mut distributor = Distributor::select_by_paypal_merchant(merchant_id, store)?
        .ok_or_else(|| errors::AccountStatusError::UnknownAccount(merchant_id.to_owned()))?;
    distributor.set_paypal_merchant(merchant_id.to_owned(), status);
    distributor.store_payout_accounts(store)?;
    tracing::info!(
        distributor_id = %distributor.id(),
        merchant_id,
        ?status,
        "PayPal payout account status updated"
    );
    Ok(())
}

pub mod errors {
    use thiserror::Error;

    use crate::db::errors::DatabaseError;

    #[derive(Error, Debug)]
    pub enum AccountStatusError {
        #[error(transparent)]
        DatabaseError(#[from] DatabaseError),
        #[error("No distributor is linked to payout account {0}")]
        UnknownAccount(String),
    }
}
