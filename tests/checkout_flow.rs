//! End-to-end service-level tests for the checkout -> capture -> order
//! pipeline, using a scripted in-process payment provider.
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::http::HeaderMap;
use tempfile::TempDir;
use uuid::Uuid;

use vinylogix_api::db::models::distributor::{Distributor, DistributorInsert, PayoutAccountStatus};
use vinylogix_api::db::models::order::{OrderStatus, PaymentStatus};
use vinylogix_api::db::models::pending_order::PendingOrder;
use vinylogix_api::db::models::record::{Record, RecordInsert};
use vinylogix_api::db::Store;
use vinylogix_api::services::cart::CartLine;
use vinylogix_api::services::checkout::{self, CheckoutRequest, ReturnUrls};
use vinylogix_api::services::notifications::Notifier;
use vinylogix_api::services::orders;
use vinylogix_api::services::providers::{
    errors::ProviderError, CheckoutSpec, PaymentMethod, PaymentProvider, ProviderCapture,
    ProviderCheckout,
};
use vinylogix_api::services::reconcile::{self, ReconcileOutcome};

/// Scripted provider: hands out deterministic ids, counts calls, and can be
/// told to fail either capability.
struct FakeProvider {
    method: PaymentMethod,
    create_calls: AtomicUsize,
    capture_calls: AtomicUsize,
    fail_create: bool,
    fail_capture: bool,
}

impl FakeProvider {
    fn stripe() -> Self {
        Self::new(PaymentMethod::Stripe)
    }

    fn paypal() -> Self {
        Self::new(PaymentMethod::Paypal)
    }

    fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            create_calls: AtomicUsize::new(0),
            capture_calls: AtomicUsize::new(0),
            fail_create: false,
            fail_capture: false,
        }
    }

    fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    fn failing_capture(mut self) -> Self {
        self.fail_capture = true;
        self
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn create_checkout(
        &self,
        spec: &CheckoutSpec,
    ) -> Result<ProviderCheckout, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return Err(ProviderError::Api {
                status: 500,
                body: String::from("scripted failure"),
            });
        }
        Ok(ProviderCheckout {
            provider_order_id: format!("prov_{}", spec.pending_order_id),
            redirect_url: format!("https://pay.invalid/approve/{}", spec.pending_order_id),
        })
    }

    async fn capture(&self, provider_order_id: &str) -> Result<ProviderCapture, ProviderError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_capture {
            return Err(ProviderError::Api {
                status: 422,
                body: String::from("scripted capture failure"),
            });
        }
        Ok(ProviderCapture {
            capture_id: format!("cap_{provider_order_id}"),
            payer_email: Some(String::from("buyer@records.example")),
            payer_name: Some(String::from("A Buyer")),
        })
    }

    async fn verify_webhook(
        &self,
        _payload: &[u8],
        _headers: &HeaderMap,
    ) -> Result<(), ProviderError> {
        Ok(())
    }
}

struct Fixture {
    _dir: TempDir,
    store: Store,
    distributor: Distributor,
    record: Record,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let store = Store::open(dir.path().join("test.redb")).expect("store opens");
    let mut distributor = DistributorInsert {
        name: String::from("Groove Imports"),
        contact_email: "orders@groove.example".try_into().expect("valid email"),
        order_id_prefix: String::from("GRV"),
    }
    .store(&store)
    .expect("distributor stores");
    distributor.set_stripe_account(String::from("acct_1"), PayoutAccountStatus::Active);
    distributor.set_paypal_merchant(String::from("MERCH1"), PayoutAccountStatus::Active);
    distributor
        .store_payout_accounts(&store)
        .expect("payout accounts store");
    let record = RecordInsert {
        distributor_id: distributor.id(),
        title: String::from("Blue Train"),
        artist: String::from("John Coltrane"),
        cover_url: None,
        selling_price: 27.50,
        weight_grams: Some(180),
        is_inventory_item: true,
        is_for_sale: true,
    }
    .store(&store)
    .expect("record stores");
    Fixture {
        _dir: dir,
        store,
        distributor,
        record,
    }
}

fn checkout_request(fix: &Fixture, method: PaymentMethod, quantity: u32) -> CheckoutRequest {
    CheckoutRequest {
        distributor_id: fix.distributor.id(),
        payment_method: method,
        items: vec![CartLine {
            record_id: fix.record.id(),
            quantity,
        }],
        viewer_id: Uuid::new_v4(),
        customer_email: "buyer@records.example".try_into().expect("valid email"),
        customer_name: String::from("A Buyer"),
        shipping_address: String::from("12 Canal Street"),
        billing_address: String::from("12 Canal Street"),
        phone_number: None,
    }
}

fn urls() -> ReturnUrls {
    ReturnUrls {
        return_url: String::from("https://shop.invalid/return"),
        cancel_url: String::from("https://shop.invalid/cancel"),
    }
}

#[tokio::test]
async fn checkout_then_capture_creates_exactly_one_order() {
    let fix = fixture();
    let provider = FakeProvider::paypal();
    let started = checkout::start_checkout(
        checkout_request(&fix, PaymentMethod::Paypal, 2),
        &provider,
        &urls(),
        400,
        "eur",
        &fix.store,
    )
    .await
    .expect("checkout starts");

    let pending = PendingOrder::select_one(&started.pending_order_id, &fix.store)
        .expect("pending loads")
        .expect("pending exists");
    assert_eq!(pending.total_minor_units, 5_500);
    assert_eq!(pending.platform_fee_minor_units, 220);
    assert_eq!(
        pending.provider_order_id.as_deref(),
        Some(started.provider_order_id.as_str())
    );

    let notifier = Notifier::disabled();
    let outcome =
        reconcile::reconcile_capture(&started.pending_order_id, &provider, &fix.store, &notifier)
            .await
            .expect("capture reconciles");
    let order = match outcome {
        ReconcileOutcome::Created(order) => order,
        ReconcileOutcome::AlreadyProcessed => panic!("first capture must create an order"),
    };
    assert_eq!(order.order_number, "GRV-00001");
    assert_eq!(order.total_minor_units(), 5_500);
    assert_eq!(order.platform_fee_minor_units(), 220);
    assert_eq!(order.status(), OrderStatus::Paid);
    assert_eq!(order.payment_status(), PaymentStatus::Paid);
    assert!(order.paid_at.is_some());
    assert_eq!(order.payer_email.as_deref(), Some("buyer@records.example"));
    assert_eq!(order.payer_name.as_deref(), Some("A Buyer"));

    // Pending order consumed.
    assert!(PendingOrder::select_one(&started.pending_order_id, &fix.store)
        .expect("pending loads")
        .is_none());

    // Duplicate delivery is a success no-op with no second capture call.
    let captures_before = provider.capture_calls.load(Ordering::SeqCst);
    let second =
        reconcile::reconcile_capture(&started.pending_order_id, &provider, &fix.store, &notifier)
            .await
            .expect("duplicate reconciliation succeeds");
    assert!(matches!(second, ReconcileOutcome::AlreadyProcessed));
    assert_eq!(provider.capture_calls.load(Ordering::SeqCst), captures_before);
    assert_eq!(
        orders::list_orders_for_distributor(fix.distributor.id(), &fix.store)
            .expect("orders list")
            .len(),
        1
    );
}

#[tokio::test]
async fn cross_tenant_checkout_stages_nothing() {
    let fix = fixture();
    let mut other = DistributorInsert {
        name: String::from("Other Records"),
        contact_email: "other@records.example".try_into().expect("valid email"),
        order_id_prefix: String::from("OTH"),
    }
    .store(&fix.store)
    .expect("distributor stores");
    other.set_stripe_account(String::from("acct_2"), PayoutAccountStatus::Active);
    other
        .store_payout_accounts(&fix.store)
        .expect("payout accounts store");

    let provider = FakeProvider::stripe();
    let mut request = checkout_request(&fix, PaymentMethod::Stripe, 1);
    // Claim the record belongs to the other distributor.
    request.distributor_id = other.id();
    let result =
        checkout::start_checkout(request, &provider, &urls(), 400, "eur", &fix.store).await;
    assert!(result.is_err());
    assert_eq!(provider.create_calls.load(Ordering::SeqCst), 0);
    // Sweeping with a zero TTL deletes every staged order; zero swept means
    // nothing was ever staged.
    assert_eq!(
        PendingOrder::sweep_expired(time::Duration::seconds(0), &fix.store).expect("sweep"),
        0
    );
}

#[tokio::test]
async fn provider_create_failure_cleans_up_the_staging_record() {
    let fix = fixture();
    let provider = FakeProvider::stripe().failing_create();
    let result = checkout::start_checkout(
        checkout_request(&fix, PaymentMethod::Stripe, 1),
        &provider,
        &urls(),
        400,
        "eur",
        &fix.store,
    )
    .await;
    assert!(result.is_err());
    assert_eq!(
        PendingOrder::sweep_expired(time::Duration::seconds(0), &fix.store).expect("sweep"),
        0
    );
}

#[tokio::test]
async fn capture_failure_leaves_the_pending_order_for_investigation() {
    let fix = fixture();
    let good = FakeProvider::paypal();
    let started = checkout::start_checkout(
        checkout_request(&fix, PaymentMethod::Paypal, 1),
        &good,
        &urls(),
        400,
        "eur",
        &fix.store,
    )
    .await
    .expect("checkout starts");

    let failing = FakeProvider::paypal().failing_capture();
    let notifier = Notifier::disabled();
    let result =
        reconcile::reconcile_capture(&started.pending_order_id, &failing, &fix.store, &notifier)
            .await;
    assert!(result.is_err());
    // Staging record intact so a retry can reattempt.
    assert!(PendingOrder::select_one(&started.pending_order_id, &fix.store)
        .expect("pending loads")
        .is_some());
    assert!(orders::list_orders_for_distributor(fix.distributor.id(), &fix.store)
        .expect("orders list")
        .is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_promotions_assign_distinct_sequential_order_numbers() {
    let fix = fixture();
    let provider = FakeProvider::paypal();
    let mut pending_ids = Vec::new();
    for _ in 0..8 {
        let started = checkout::start_checkout(
            checkout_request(&fix, PaymentMethod::Paypal, 1),
            &provider,
            &urls(),
            400,
            "eur",
            &fix.store,
        )
        .await
        .expect("checkout starts");
        pending_ids.push(started.pending_order_id);
    }

    let mut handles = Vec::new();
    for pending_id in pending_ids {
        let store = fix.store.clone();
        handles.push(std::thread::spawn(move || {
            let capture = ProviderCapture {
                capture_id: format!("cap_{pending_id}"),
                payer_email: None,
                payer_name: None,
            };
            reconcile::promote(&pending_id, &capture, &store, &Notifier::disabled())
                .expect("promotion succeeds")
        }));
    }
    for handle in handles {
        handle.join().expect("promotion thread");
    }

    let mut numbers: Vec<String> = orders::list_orders_for_distributor(fix.distributor.id(), &fix.store)
        .expect("orders list")
        .into_iter()
        .map(|order| order.order_number)
        .collect();
    numbers.sort();
    let expected: Vec<String> = (1..=8).map(|n| format!("GRV-{n:05}")).collect();
    assert_eq!(numbers, expected);
}

#[tokio::test]
async fn refund_webhook_flips_payment_status_and_nothing_else() {
    let fix = fixture();
    let provider = FakeProvider::paypal();
    let started = checkout::start_checkout(
        checkout_request(&fix, PaymentMethod::Paypal, 2),
        &provider,
        &urls(),
        400,
        "eur",
        &fix.store,
    )
    .await
    .expect("checkout starts");
    let notifier = Notifier::disabled();
    let outcome =
        reconcile::reconcile_capture(&started.pending_order_id, &provider, &fix.store, &notifier)
            .await
            .expect("capture reconciles");
    let order = match outcome {
        ReconcileOutcome::Created(order) => order,
        ReconcileOutcome::AlreadyProcessed => panic!("expected creation"),
    };

    let capture_key = order.provider_references.capture_key().to_owned();
    let refunded = reconcile::apply_refund(&capture_key, &fix.store)
        .expect("refund applies")
        .expect("order located by capture id");
    assert_eq!(refunded.payment_status(), PaymentStatus::Refunded);
    assert_eq!(refunded.total_minor_units(), order.total_minor_units());
    assert_eq!(refunded.items().len(), order.items().len());
    assert_eq!(refunded.status(), OrderStatus::Paid); // fulfillment untouched

    // Unknown capture ids are a quiet no-op.
    assert!(reconcile::apply_refund("cap_unknown", &fix.store)
        .expect("no-op refund")
        .is_none());
}

#[tokio::test]
async fn fulfillment_transitions_and_bulk_partial_failure() {
    let fix = fixture();
    let provider = FakeProvider::paypal();
    let mut order_ids = Vec::new();
    for _ in 0..2 {
        let started = checkout::start_checkout(
            checkout_request(&fix, PaymentMethod::Paypal, 1),
            &provider,
            &urls(),
            400,
            "eur",
            &fix.store,
        )
        .await
        .expect("checkout starts");
        let outcome = reconcile::reconcile_capture(
            &started.pending_order_id,
            &provider,
            &fix.store,
            &Notifier::disabled(),
        )
        .await
        .expect("capture reconciles");
        match outcome {
            ReconcileOutcome::Created(order) => order_ids.push(order.id()),
            ReconcileOutcome::AlreadyProcessed => panic!("expected creation"),
        }
    }

    // Move one order forward so the bulk ship below can only succeed for it.
    let processed =
        orders::transition_order(order_ids[0], OrderStatus::Processing, None, &fix.store)
            .expect("paid -> processing");
    assert_eq!(processed.status(), OrderStatus::Processing);

    let report = orders::bulk_transition(&order_ids, OrderStatus::Shipped, &fix.store);
    assert_eq!(report.succeeded, vec![order_ids[0]]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].order_id, order_ids[1]);

    let shipped = orders::get_order(order_ids[0], &fix.store)
        .expect("order loads")
        .expect("order exists");
    assert_eq!(shipped.status(), OrderStatus::Shipped);
    assert!(shipped.shipped_at.is_some());
    // The failed order was not rolled back or mutated.
    let untouched = orders::get_order(order_ids[1], &fix.store)
        .expect("order loads")
        .expect("order exists");
    assert_eq!(untouched.status(), OrderStatus::Paid);
}

#[tokio::test]
async fn pending_order_sweep_removes_only_unpaid_stale_checkouts() {
    let fix = fixture();
    let provider = FakeProvider::paypal();
    let started = checkout::start_checkout(
        checkout_request(&fix, PaymentMethod::Paypal, 1),
        &provider,
        &urls(),
        400,
        "eur",
        &fix.store,
    )
    .await
    .expect("checkout starts");

    // A generous TTL keeps the fresh staging record alive.
    assert_eq!(
        PendingOrder::sweep_expired(time::Duration::days(1), &fix.store).expect("sweep"),
        0
    );
    assert!(PendingOrder::select_one(&started.pending_order_id, &fix.store)
        .expect("pending loads")
        .is_some());

    // A zero TTL expires it.
    assert_eq!(
        PendingOrder::sweep_expired(time::Duration::seconds(0), &fix.store).expect("sweep"),
        1
    );
    assert!(PendingOrder::select_one(&started.pending_order_id, &fix.store)
        .expect("pending loads")
        .is_none());
}

#[tokio::test]
async fn payout_updates_from_a_stale_copy_never_roll_back_the_order_counter() {
    let fix = fixture();
    let provider = FakeProvider::paypal();
    // Copy read before any promotion, as an onboarding webhook handler
    // would hold one while a buyer pays.
    let mut stale = Distributor::select_one(fix.distributor.id(), &fix.store)
        .expect("distributor loads")
        .expect("distributor exists");

    let started = checkout::start_checkout(
        checkout_request(&fix, PaymentMethod::Paypal, 1),
        &provider,
        &urls(),
        400,
        "eur",
        &fix.store,
    )
    .await
    .expect("checkout starts");
    let notifier = Notifier::disabled();
    let first =
        reconcile::reconcile_capture(&started.pending_order_id, &provider, &fix.store, &notifier)
            .await
            .expect("capture reconciles");
    assert!(matches!(first, ReconcileOutcome::Created(_)));

    // Payout write through the stale copy lands after the promotion.
    stale.set_stripe_account(String::from("acct_rotated"), PayoutAccountStatus::Active);
    stale
        .store_payout_accounts(&fix.store)
        .expect("payout accounts store");

    let started = checkout::start_checkout(
        checkout_request(&fix, PaymentMethod::Paypal, 1),
        &provider,
        &urls(),
        400,
        "eur",
        &fix.store,
    )
    .await
    .expect("checkout starts");
    let second =
        reconcile::reconcile_capture(&started.pending_order_id, &provider, &fix.store, &notifier)
            .await
            .expect("capture reconciles");
    let order = match second {
        ReconcileOutcome::Created(order) => order,
        ReconcileOutcome::AlreadyProcessed => panic!("expected creation"),
    };
    assert_eq!(order.order_number, "GRV-00002");

    let current = Distributor::select_one(fix.distributor.id(), &fix.store)
        .expect("distributor loads")
        .expect("distributor exists");
    assert_eq!(current.order_counter(), 2);
    assert_eq!(current.stripe_account_id.as_deref(), Some("acct_rotated"));
}

#[tokio::test]
async fn refund_survives_a_subsequent_fulfillment_write() {
    let fix = fixture();
    let provider = FakeProvider::paypal();
    let started = checkout::start_checkout(
        checkout_request(&fix, PaymentMethod::Paypal, 1),
        &provider,
        &urls(),
        400,
        "eur",
        &fix.store,
    )
    .await
    .expect("checkout starts");
    let outcome = reconcile::reconcile_capture(
        &started.pending_order_id,
        &provider,
        &fix.store,
        &Notifier::disabled(),
    )
    .await
    .expect("capture reconciles");
    let order = match outcome {
        ReconcileOutcome::Created(order) => order,
        ReconcileOutcome::AlreadyProcessed => panic!("expected creation"),
    };

    let capture_key = order.provider_references.capture_key().to_owned();
    reconcile::apply_refund(&capture_key, &fix.store)
        .expect("refund applies")
        .expect("order located by capture id");

    // Staff keep fulfilling the refunded order; the refund must persist
    // through their write.
    let processed = orders::transition_order(order.id(), OrderStatus::Processing, None, &fix.store)
        .expect("paid -> processing");
    assert_eq!(processed.payment_status(), PaymentStatus::Refunded);

    let reloaded = orders::get_order(order.id(), &fix.store)
        .expect("order loads")
        .expect("order exists");
    assert_eq!(reloaded.status(), OrderStatus::Processing);
    assert_eq!(reloaded.payment_status(), PaymentStatus::Refunded);
}
