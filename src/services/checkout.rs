//! Checkout orchestration: validate the cart, stage a pending order, create
//! the provider-side checkout, and hand the buyer the approval URL. The
//! staged record is what the later capture step trusts; nothing returned by
//! the provider redirect is believed except correlation ids.
use uuid::Uuid;

use crate::db::{
    models::{
        distributor::Distributor,
        pending_order::{PendingOrder, PendingOrderInsert},
    },
    Store,
};
use crate::services::cart::{self, CartLine};
use crate::services::providers::{
    CheckoutLine, CheckoutSpec, PaymentMethod, PaymentProvider,
};
use crate::utils::email::EmailAddress;

/// Everything a buyer submits to start a checkout. Prices are conspicuously
/// absent; the server re-prices.
pub struct CheckoutRequest {
    pub distributor_id: Uuid,
    pub payment_method: PaymentMethod,
    pub items: Vec<CartLine>,
    pub viewer_id: Uuid,
    pub customer_email: EmailAddress,
    pub customer_name: String,
    pub shipping_address: String,
    pub billing_address: String,
    pub phone_number: Option<String>,
}

/// A started checkout: where to send the buyer, and the ids to correlate
/// the eventual capture.
pub struct CheckoutStarted {
    pub pending_order_id: String,
    pub provider_order_id: String,
    pub redirect_url: String,
}

/// URLs the provider sends the buyer back to.
pub struct ReturnUrls {
    pub return_url: String,
    pub cancel_url: String,
}

pub async fn start_checkout(
    request: CheckoutRequest,
    provider: &dyn PaymentProvider,
    urls: &ReturnUrls,
    fee_basis_points: u32,
    currency: &str,
    store: &Store,
) -> Result<CheckoutStarted, errors::CheckoutError> {
    let distributor = Distributor::select_one(request.distributor_id, store)?
        .ok_or(errors::CheckoutError::DistributorNonExistent(request.distributor_id))?;
    let destination_account = match request.payment_method {
        PaymentMethod::Stripe => distributor.stripe_account_id.clone(),
        PaymentMethod::Paypal => distributor.paypal_merchant_id.clone(),
    }
    .ok_or_else(|| errors::CheckoutError::DistributorNotPayable {
        distributor_id: request.distributor_id,
        payment_method: request.payment_method,
    })?;

    let cart = cart::validate_cart(request.distributor_id, &request.items, fee_basis_points, store)?;

    let mut pending = PendingOrderInsert {
        distributor_id: request.distributor_id,
        viewer_id: request.viewer_id,
        viewer_email: request.customer_email,
        customer_name: request.customer_name,
        shipping_address: request.shipping_address,
        billing_address: request.billing_address,
        phone_number: request.phone_number,
        items: cart.items,
        total_minor_units: cart.total_minor_units,
        platform_fee_minor_units: cart.platform_fee_minor_units,
        total_weight_grams: cart.total_weight_grams,
        payment_method: request.payment_method,
    }
    .store(store)?;

    let spec = CheckoutSpec {
        pending_order_id: pending.id().to_owned(),
        distributor_id: request.distributor_id.to_string(),
        destination_account,
        lines: pending
            .items
            .iter()
            .map(|item| CheckoutLine {
                title: item.title.clone(),
                artist: item.artist.clone(),
                unit_minor_units: item.price_minor_units,
                quantity: item.quantity,
            })
            .collect(),
        total_minor_units: pending.total_minor_units,
        platform_fee_minor_units: pending.platform_fee_minor_units,
        currency: currency.to_owned(),
        return_url: urls.return_url.clone(),
        cancel_url: urls.cancel_url.clone(),
    };

    let checkout = match provider.create_checkout(&spec).await {
        Ok(checkout) => checkout,
        Err(err) => {
            // The buyer got an error, so nothing will ever reference this
            // staging record; remove it rather than waiting for the sweep.
            let pending_order_id = pending.id().to_owned();
            if let Err(cleanup_err) = pending.delete(store) {
                tracing::warn!(
                    pending_order_id,
                    %cleanup_err,
                    "Failed to clean up pending order after provider error"
                );
            }
            return Err(errors::CheckoutError::Provider(err));
        }
    };

    pending.attach_provider_order_id(checkout.provider_order_id.clone(), store)?;
    tracing::info!(
        pending_order_id = pending.id(),
        provider_order_id = checkout.provider_order_id,
        method = ?provider.method(),
        total_minor_units = pending.total_minor_units,
        "Checkout staged"
    );
    Ok(CheckoutStarted {
        pending_order_id: pending.id().to_owned(),
        provider_order_id: checkout.provider_order_id,
        redirect_url: checkout.redirect_url,
    })
}

/// Re-load a staged pending order (used by the capture callback to confirm
/// the reference is genuine before calling the provider).
pub fn get_pending(
    pending_order_id: &str,
    store: &Store,
) -> Result<Option<PendingOrder>, crate::db::errors::DatabaseError> {
    PendingOrder::select_one(pending_order_id, store)
}

pub mod errors {
    use thiserror::Error;
    use uuid::Uuid;

    use crate::db::errors::DatabaseError;
    use crate::services::cart::errors::CartValidationError;
    use crate::services::providers::{errors::ProviderError, PaymentMethod};

    #[derive(Error, Debug)]
    pub enum CheckoutError {
        #[error(transparent)]
        DatabaseError(#[from] DatabaseError),
        #[error(transparent)]
        Validation(#[from] CartValidationError),
        #[error("Distributor does not exist")]
        DistributorNonExistent(Uuid),
        #[error("Distributor has no payout account for the requested payment method")]
        DistributorNotPayable {
            distributor_id: Uuid,
            payment_method: PaymentMethod,
        },
        #[error("Payment provider error")]
        Provider(#[source] ProviderError),
    }
}
