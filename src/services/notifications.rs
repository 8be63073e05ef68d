//! Best-effort email notifications. Every send is fire-and-forget: a spawned
//! task posts to the transactional email API and failures are logged, never
//! propagated. Reconciliation success is independent of notification
//! success by construction.
use serde_json::json;

use crate::constants::email as constants;
use crate::db::models::order::Order;
use crate::utils::email::EmailAddress;
use crate::utils::money::minor_units_to_decimal;

#[derive(Clone)]
pub struct Notifier {
    /// `None` disables sending entirely; notifications are logged only.
    api_key: Option<String>,
    api_url: String,
    from_address: String,
    http: reqwest::Client,
}

impl Notifier {
    pub fn from_env() -> Self {
        Self::new(
            constants::EMAIL_API_KEY.clone(),
            constants::EMAIL_API_URL.clone(),
            constants::EMAIL_FROM_ADDRESS.clone(),
        )
    }

    pub fn new(api_key: Option<String>, api_url: String, from_address: String) -> Self {
        Self {
            api_key,
            api_url,
            from_address,
            http: reqwest::Client::new(),
        }
    }

    /// A notifier that only logs. Used in tests and local runs.
    pub fn disabled() -> Self {
        Self::new(None, String::from("http://disabled.invalid"), String::from("noreply@invalid"))
    }

    /// Confirmation email to the buyer.
    pub fn order_confirmation(&self, order: &Order) {
        let subject = format!("Order {} confirmed", order.order_number);
        let body = format!(
            "Thanks for your order, {}!\n\nOrder {} for €{} has been received and paid.",
            order.customer_name,
            order.order_number,
            minor_units_to_decimal(order.total_minor_units()),
        );
        self.dispatch(order.viewer_email.clone(), subject, body);
    }

    /// New-order alert to the distributor's contact address.
    pub fn new_order_alert(&self, order: &Order, contact: &EmailAddress) {
        let subject = format!("New order {}", order.order_number);
        let body = format!(
            "A new order {} for €{} ({} line(s)) is ready for fulfillment.",
            order.order_number,
            minor_units_to_decimal(order.total_minor_units()),
            order.items().len(),
        );
        self.dispatch(contact.clone(), subject, body);
    }

    fn dispatch(&self, to: EmailAddress, subject: String, body: String) {
        let Some(api_key) = self.api_key.clone() else {
            tracing::info!(to = to.as_str(), subject, "Email sending disabled; notification logged only");
            return;
        };
        let http = self.http.clone();
        let api_url = self.api_url.clone();
        let from_address = self.from_address.clone();
        tokio::spawn(async move {
            let payload = json!({
                "from": from_address,
                "to": [to.as_str()],
                "subject": subject,
                "text": body,
            });
            let result = http
                .post(&api_url)
                .bearer_auth(api_key)
                .json(&payload)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(to = to.as_str(), subject, "Notification sent");
                }
                Ok(response) => tracing::warn!(
                    to = to.as_str(),
                    subject,
                    status = %response.status(),
                    "Notification rejected by email API"
                ),
                Err(err) => tracing::warn!(to = to.as_str(), subject, %err, "Notification send failed"),
            }
        });
    }
}
