//! End-to-end marketplace workflows against a scratch database.
//!
//! Telegram delivery is represented by the notification outbox (the worker
//! is the only component that talks to the network) and Stripe is exercised
//! only on paths that skip the remote call, so these tests run hermetically.

use std::sync::{Mutex, MutexGuard};

use diesel::prelude::*;
use tempfile::TempDir;

use subshare_server::db::{self, DbPool};
use subshare_server::models::dispute::Dispute;
use subshare_server::models::listing::{DeliveryType, Listing, ListingStatus, NewListing};
use subshare_server::models::transaction::Transaction;
use subshare_server::models::user::{TelegramProfile, User};
use subshare_server::schema::notification_outbox;
use subshare_server::services::approval::{self, DecisionOutcome};
use subshare_server::services::payments::StripeClient;
use subshare_server::services::transactions::{
    self, ConfirmOutcome, DisputeOutcome, ResolveOutcome, WebhookApply,
};

// Tests here mutate process-wide env vars; run those sections serialized.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_guard() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn scratch_pool() -> (TempDir, DbPool) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flow.db");
    let pool = db::create_pool(path.to_str().unwrap()).unwrap();
    db::run_migrations(&pool).unwrap();
    (dir, pool)
}

fn outbox_kinds(pool: &DbPool) -> Vec<String> {
    let mut conn = pool.get().unwrap();
    notification_outbox::table
        .order(notification_outbox::created_at.asc())
        .select(notification_outbox::kind)
        .load::<String>(&mut conn)
        .unwrap()
}

fn seed_seller(pool: &DbPool, telegram_id: i64) -> User {
    let mut conn = pool.get().unwrap();
    User::find_or_create(
        &mut conn,
        telegram_id,
        TelegramProfile {
            username: Some(format!("user{telegram_id}")),
            display_name: Some("Seller".into()),
            ..Default::default()
        },
    )
    .unwrap()
}

fn seed_listing(pool: &DbPool, seller: &User) -> Listing {
    let mut conn = pool.get().unwrap();
    Listing::create(
        &mut conn,
        NewListing::new(
            seller.id.clone(),
            "Streaming family slot".into(),
            "One seat on a family plan".into(),
            "streaming".into(),
            1500,
            DeliveryType::Instant,
        ),
    )
    .unwrap()
}

#[tokio::test]
async fn listing_travels_from_creation_to_completed_sale() {
    let _env = env_guard();
    let (_dir, pool) = scratch_pool();

    let seller = seed_seller(&pool, 1001);
    let buyer = seed_seller(&pool, 1002);
    let listing = seed_listing(&pool, &seller);
    assert_eq!(listing.status, "pending_approval");

    // Submission fans out one approval request per configured approver.
    std::env::set_var("APPROVER_USER_IDS", "42,43");
    {
        let mut conn = pool.get().unwrap();
        approval::submit_for_approval(&mut conn, &listing, &seller).unwrap();
    }

    // An outsider cannot decide; an approver can.
    {
        let mut conn = pool.get().unwrap();
        let denied = approval::process_decision(&mut conn, &listing.id, true, 999).unwrap();
        assert!(matches!(denied, DecisionOutcome::Unauthorized));

        let approved = approval::process_decision(&mut conn, &listing.id, true, 42).unwrap();
        assert!(matches!(approved, DecisionOutcome::Approved(_)));
    }
    std::env::remove_var("APPROVER_USER_IDS");

    {
        let mut conn = pool.get().unwrap();
        let live = Listing::find_by_id(&mut conn, &listing.id).unwrap().unwrap();
        assert_eq!(live.status, "active");
    }

    // Purchase: pending transaction, then the provider reports payment.
    let tx = {
        let mut conn = pool.get().unwrap();
        Transaction::create(
            &mut conn,
            subshare_server::models::transaction::NewTransaction::pending_payment(
                listing.id.clone(),
                buyer.id.clone(),
                seller.id.clone(),
                1500,
                "usd".into(),
            ),
        )
        .unwrap()
    };

    let applied = transactions::apply_checkout_completed(&pool, "evt_flow_1", &tx.id).unwrap();
    assert_eq!(applied, WebhookApply::Applied);

    // A redelivered event is dropped before touching any state.
    let replayed = transactions::apply_checkout_completed(&pool, "evt_flow_1", &tx.id).unwrap();
    assert_eq!(replayed, WebhookApply::DuplicateEvent);

    // Buyer confirms; seller has no connected account, so no transfer call.
    let stripe = StripeClient::new(String::new());
    let outcome = transactions::confirm_delivery(&pool, &stripe, &tx.id, buyer.telegram_id)
        .await
        .unwrap();
    assert_eq!(outcome, ConfirmOutcome::Completed);

    {
        let mut conn = pool.get().unwrap();
        let done = Transaction::find_by_id(&mut conn, &tx.id).unwrap().unwrap();
        assert_eq!(done.status, "completed");
        assert_eq!(done.escrow_status.as_deref(), Some("released"));

        let deliveries =
            subshare_server::models::delivery::Delivery::find_by_transaction(&mut conn, &tx.id)
                .unwrap();
        assert_eq!(deliveries.len(), 1);
        assert!(deliveries[0].delivered_at.is_some());
    }

    // The whole journey left its notification trail in the outbox.
    let kinds = outbox_kinds(&pool);
    let count = |k: &str| kinds.iter().filter(|x| x.as_str() == k).count();
    assert_eq!(count("approval_request"), 2);
    assert_eq!(count("listing_approved"), 1);
    assert_eq!(count("payment_received"), 1);
    assert_eq!(count("payment_confirmed"), 1);
    assert_eq!(count("funds_released"), 1);
}

#[tokio::test]
async fn disputed_sale_refunds_the_buyer() {
    let (_dir, pool) = scratch_pool();

    let seller = seed_seller(&pool, 2001);
    let buyer = seed_seller(&pool, 2002);
    let listing = seed_listing(&pool, &seller);

    {
        let mut conn = pool.get().unwrap();
        Listing::transition_status(
            &mut conn,
            &listing.id,
            &[ListingStatus::PendingApproval],
            ListingStatus::Active,
        )
        .unwrap();
    }

    let tx = {
        let mut conn = pool.get().unwrap();
        Transaction::create(
            &mut conn,
            subshare_server::models::transaction::NewTransaction::pending_payment(
                listing.id.clone(),
                buyer.id.clone(),
                seller.id.clone(),
                1500,
                "usd".into(),
            ),
        )
        .unwrap()
    };
    transactions::apply_checkout_completed(&pool, "evt_flow_2", &tx.id).unwrap();

    let dispute = match transactions::open_dispute(
        &pool,
        &tx.id,
        buyer.telegram_id,
        Some("codes never arrived".into()),
    )
    .unwrap()
    {
        DisputeOutcome::Opened(d) => d,
        other => panic!("expected Opened, got {other:?}"),
    };

    {
        let mut conn = pool.get().unwrap();
        let disputed = Transaction::find_by_id(&mut conn, &tx.id).unwrap().unwrap();
        assert_eq!(disputed.status, "disputed");
    }

    let resolved =
        transactions::resolve_dispute(&pool, &dispute.id, "refund issued", true).unwrap();
    assert_eq!(resolved, ResolveOutcome::Resolved);

    {
        let mut conn = pool.get().unwrap();
        let refunded = Transaction::find_by_id(&mut conn, &tx.id).unwrap().unwrap();
        assert_eq!(refunded.status, "refunded");
        assert_eq!(refunded.escrow_status.as_deref(), Some("refunded"));

        let closed = Dispute::find_by_id(&mut conn, &dispute.id).unwrap().unwrap();
        assert_eq!(closed.status, "resolved");
        assert_eq!(closed.resolution.as_deref(), Some("refund issued"));
    }
}

#[tokio::test]
async fn seller_lifecycle_mark_sold_blocks_further_management() {
    let (_dir, pool) = scratch_pool();

    let seller = seed_seller(&pool, 3001);
    let listing = seed_listing(&pool, &seller);

    {
        let mut conn = pool.get().unwrap();
        Listing::transition_status(
            &mut conn,
            &listing.id,
            &[ListingStatus::PendingApproval],
            ListingStatus::Active,
        )
        .unwrap();

        // active -> sold succeeds once
        assert!(Listing::transition_status(
            &mut conn,
            &listing.id,
            &[ListingStatus::Active],
            ListingStatus::Sold,
        )
        .unwrap());

        // sold listings are out of reach for management transitions
        assert!(!Listing::transition_status(
            &mut conn,
            &listing.id,
            &[ListingStatus::Active],
            ListingStatus::Removed,
        )
        .unwrap());

        let sold = Listing::find_by_id(&mut conn, &listing.id).unwrap().unwrap();
        assert_eq!(sold.status, "sold");
    }
}
