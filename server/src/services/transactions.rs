//! Purchase and payment workflow.
//!
//! Drives the transaction state machine: checkout initiation, webhook event
//! application (guarded by the processed-event table so replays are no-ops),
//! delivery confirmation with the seller payout, disputes, and refunds.
//! Party notifications are queued on the outbox; Stripe failures on
//! non-critical paths are logged and never abort a state change that already
//! happened.

use anyhow::{Context, Result};
use diesel::SqliteConnection;
use std::env;
use tracing::{error, info, warn};

use crate::bot::format::escape_markdown;
use crate::config;
use crate::models::delivery::Delivery;
use crate::models::dispute::{Dispute, NewDispute};
use crate::models::listing::{Listing, ListingStatus};
use crate::models::outbox::{IntentKind, NewNotificationIntent, NotificationIntent};
use crate::models::payment_event::ProcessedPaymentEvent;
use crate::models::transaction::{NewTransaction, Transaction};
use crate::models::user::{TelegramProfile, User};
use crate::services::payments::{CheckoutParams, StripeClient};

fn notify(conn: &mut SqliteConnection, recipient: String, kind: IntentKind, body: String) {
    if let Err(e) =
        NotificationIntent::enqueue(conn, NewNotificationIntent::new(recipient, kind, body, None))
    {
        warn!(error = %e, "Failed to queue notification");
    }
}

fn notify_user(conn: &mut SqliteConnection, user_id: &str, kind: IntentKind, body: String) {
    match User::find_by_id(conn, user_id) {
        Ok(Some(user)) => notify(conn, user.telegram_id.to_string(), kind, body),
        Ok(None) => warn!(user_id, "Notification target no longer exists"),
        Err(e) => warn!(user_id, error = %e, "Failed to load notification target"),
    }
}

// --- Purchase initiation --------------------------------------------------

#[derive(Debug)]
pub enum PurchaseOutcome {
    ListingNotFound,
    ListingNotAvailable,
    Created {
        transaction_id: String,
        checkout_url: String,
    },
}

/// Start a purchase: create the pending transaction and the hosted checkout
/// session, and remember the session id for webhook reconciliation.
pub async fn initiate_purchase(
    pool: &crate::db::DbPool,
    stripe: &StripeClient,
    listing_id: &str,
    buyer_telegram_id: i64,
) -> Result<PurchaseOutcome> {
    let mut conn = pool.get().context("Failed to get DB connection")?;

    let buyer = User::find_or_create(&mut conn, buyer_telegram_id, TelegramProfile::default())?;

    let listing = match Listing::find_by_id(&mut conn, listing_id)? {
        Some(l) => l,
        None => return Ok(PurchaseOutcome::ListingNotFound),
    };
    if listing.status != ListingStatus::Active.as_str() {
        return Ok(PurchaseOutcome::ListingNotAvailable);
    }

    let transaction = Transaction::create(
        &mut conn,
        NewTransaction::pending_payment(
            listing.id.clone(),
            buyer.id.clone(),
            listing.seller_id.clone(),
            listing.price_cents,
            listing.currency.clone(),
        ),
    )?;

    let base_url =
        env::var("PLATFORM_BASE_URL").unwrap_or_else(|_| "http://localhost:4000".to_string());

    let description = if listing.description.is_empty() {
        "Digital subscription/ticket".to_string()
    } else {
        listing.description.clone()
    };

    let session = stripe
        .create_checkout_session(CheckoutParams {
            currency: listing.currency.clone(),
            product_name: listing.title.clone(),
            product_description: description,
            unit_amount_cents: listing.price_cents as i64,
            success_url: format!("{base_url}/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{base_url}/cancel"),
            metadata: vec![
                ("transaction_id".to_string(), transaction.id.clone()),
                ("listing_id".to_string(), listing.id.clone()),
                (
                    "buyer_telegram_id".to_string(),
                    buyer_telegram_id.to_string(),
                ),
            ],
        })
        .await
        .context("Failed to create checkout session")?;

    Transaction::set_session_id(&mut conn, &transaction.id, &session.id)?;

    let checkout_url = session.url.unwrap_or_default();
    info!(
        transaction_id = %transaction.id,
        listing_id = %listing.id,
        "Purchase initiated"
    );

    Ok(PurchaseOutcome::Created {
        transaction_id: transaction.id,
        checkout_url,
    })
}

// --- Webhook event application --------------------------------------------

#[derive(Debug, PartialEq, Eq)]
pub enum WebhookApply {
    /// Event id seen before; nothing was changed.
    DuplicateEvent,
    /// Transaction id from the event metadata does not exist.
    NotFound,
    /// Transaction was not in a state this event applies to.
    Ignored,
    Applied,
}

/// Apply `checkout.session.completed`: the buyer paid, funds are held.
pub fn apply_checkout_completed(
    pool: &crate::db::DbPool,
    event_id: &str,
    transaction_id: &str,
) -> Result<WebhookApply> {
    let mut conn = pool.get().context("Failed to get DB connection")?;

    if !ProcessedPaymentEvent::claim(&mut conn, event_id)? {
        info!(event_id, "Duplicate payment event, dropping");
        return Ok(WebhookApply::DuplicateEvent);
    }

    if !Transaction::mark_paid(&mut conn, transaction_id)? {
        return Ok(match Transaction::find_by_id(&mut conn, transaction_id)? {
            None => WebhookApply::NotFound,
            Some(_) => WebhookApply::Ignored,
        });
    }

    let transaction = Transaction::find_by_id(&mut conn, transaction_id)?
        .context("Transaction vanished after update")?;

    let title = transaction
        .listing_id
        .as_deref()
        .and_then(|id| Listing::find_by_id(&mut conn, id).ok().flatten())
        .map(|l| l.title)
        .unwrap_or_else(|| "your item".to_string());

    if let Some(seller_id) = &transaction.seller_id {
        notify_user(
            &mut conn,
            seller_id,
            IntentKind::PaymentReceived,
            format!(
                "💰 Payment received for \"{}\"!\n\nPlease deliver the item to the buyer.",
                escape_markdown(&title)
            ),
        );
    }
    if let Some(buyer_id) = &transaction.buyer_id {
        notify_user(
            &mut conn,
            buyer_id,
            IntentKind::PaymentConfirmed,
            format!(
                "✅ Payment confirmed for \"{}\"!\n\nThe seller has been notified to deliver your item.",
                escape_markdown(&title)
            ),
        );
    }

    info!(transaction_id, event_id, "Payment applied");
    Ok(WebhookApply::Applied)
}

/// Apply `payment_intent.payment_failed` for the owning transaction.
pub fn apply_payment_failed(
    pool: &crate::db::DbPool,
    event_id: &str,
    transaction_id: &str,
) -> Result<WebhookApply> {
    let mut conn = pool.get().context("Failed to get DB connection")?;

    if !ProcessedPaymentEvent::claim(&mut conn, event_id)? {
        info!(event_id, "Duplicate payment event, dropping");
        return Ok(WebhookApply::DuplicateEvent);
    }

    if !Transaction::mark_payment_failed(&mut conn, transaction_id)? {
        return Ok(match Transaction::find_by_id(&mut conn, transaction_id)? {
            None => WebhookApply::NotFound,
            Some(_) => WebhookApply::Ignored,
        });
    }

    let transaction = Transaction::find_by_id(&mut conn, transaction_id)?
        .context("Transaction vanished after update")?;

    if let Some(buyer_id) = &transaction.buyer_id {
        notify_user(
            &mut conn,
            buyer_id,
            IntentKind::PaymentFailed,
            "❌ Payment failed. Please try again or contact support.".to_string(),
        );
    }

    info!(transaction_id, event_id, "Payment failure recorded");
    Ok(WebhookApply::Applied)
}

// --- Delivery confirmation ------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
pub enum ConfirmOutcome {
    NotFound,
    NotPaid,
    Completed,
}

/// Buyer confirms delivery: complete the transaction, release escrow, pay
/// out the seller minus the platform fee when they have a connected account.
pub async fn confirm_delivery(
    pool: &crate::db::DbPool,
    stripe: &StripeClient,
    transaction_id: &str,
    buyer_telegram_id: i64,
) -> Result<ConfirmOutcome> {
    let mut conn = pool.get().context("Failed to get DB connection")?;

    let buyer = match User::find_by_telegram_id(&mut conn, buyer_telegram_id)? {
        Some(u) => u,
        None => return Ok(ConfirmOutcome::NotFound),
    };

    let transaction = match Transaction::find_by_id(&mut conn, transaction_id)? {
        Some(t) if t.buyer_id.as_deref() == Some(buyer.id.as_str()) => t,
        // someone else's transaction looks exactly like a missing one
        _ => return Ok(ConfirmOutcome::NotFound),
    };

    if !Transaction::mark_completed(&mut conn, transaction_id)? {
        return Ok(ConfirmOutcome::NotPaid);
    }

    Delivery::record_confirmed(&mut conn, transaction_id)?;

    let title = transaction
        .listing_id
        .as_deref()
        .and_then(|id| Listing::find_by_id(&mut conn, id).ok().flatten())
        .map(|l| l.title)
        .unwrap_or_else(|| "your item".to_string());

    let seller = match &transaction.seller_id {
        Some(id) => User::find_by_id(&mut conn, id)?,
        None => None,
    };

    if let Some(seller) = &seller {
        if let Some(account) = &seller.stripe_account_id {
            let fee = config::platform_fee_cents(transaction.amount_cents as i64);
            let payout = transaction.amount_cents as i64 - fee;

            if let Err(e) = stripe
                .create_transfer(payout, &transaction.currency, account, &transaction.id)
                .await
            {
                // escrow is already released; payout will need manual replay
                error!(
                    transaction_id,
                    destination = %account,
                    error = %e,
                    "Seller transfer failed"
                );
            }
        }

        notify(
            &mut conn,
            seller.telegram_id.to_string(),
            IntentKind::FundsReleased,
            format!("Payment released for {}", escape_markdown(&title)),
        );
    }

    info!(transaction_id, "Delivery confirmed, escrow released");
    Ok(ConfirmOutcome::Completed)
}

// --- Disputes ---------------------------------------------------------------

#[derive(Debug)]
pub enum DisputeOutcome {
    NotFound,
    NotDisputable,
    Opened(Dispute),
}

/// Open a dispute on behalf of the buyer or seller of a paid transaction.
pub fn open_dispute(
    pool: &crate::db::DbPool,
    transaction_id: &str,
    opener_telegram_id: i64,
    reason: Option<String>,
) -> Result<DisputeOutcome> {
    let mut conn = pool.get().context("Failed to get DB connection")?;

    let opener = match User::find_by_telegram_id(&mut conn, opener_telegram_id)? {
        Some(u) => u,
        None => return Ok(DisputeOutcome::NotFound),
    };

    let transaction = match Transaction::find_by_id(&mut conn, transaction_id)? {
        Some(t) => t,
        None => return Ok(DisputeOutcome::NotFound),
    };

    let is_party = transaction.buyer_id.as_deref() == Some(opener.id.as_str())
        || transaction.seller_id.as_deref() == Some(opener.id.as_str());
    if !is_party {
        // non-participants can't learn the transaction exists
        return Ok(DisputeOutcome::NotFound);
    }

    if !Transaction::mark_disputed(&mut conn, transaction_id)? {
        return Ok(DisputeOutcome::NotDisputable);
    }

    let dispute = Dispute::create(
        &mut conn,
        NewDispute::open(transaction_id.to_string(), opener.id.clone(), reason.clone()),
    )?;

    if let Some(admin_chat) = config::admin_chat_id() {
        notify(
            &mut conn,
            admin_chat.to_string(),
            IntentKind::DisputeOpened,
            format!(
                "Dispute opened for transaction {}: {}",
                transaction_id,
                reason.as_deref().unwrap_or("no reason given")
            ),
        );
    }

    info!(transaction_id, dispute_id = %dispute.id, "Dispute opened");
    Ok(DisputeOutcome::Opened(dispute))
}

#[derive(Debug, PartialEq, Eq)]
pub enum ResolveOutcome {
    NotFound,
    AlreadyClosed,
    Resolved,
}

/// Admin resolution: close the dispute and settle the transaction either
/// way (refund the buyer, or release to the seller).
pub fn resolve_dispute(
    pool: &crate::db::DbPool,
    dispute_id: &str,
    resolution: &str,
    refund_buyer: bool,
) -> Result<ResolveOutcome> {
    let mut conn = pool.get().context("Failed to get DB connection")?;

    let dispute = match Dispute::find_by_id(&mut conn, dispute_id)? {
        Some(d) => d,
        None => return Ok(ResolveOutcome::NotFound),
    };

    if !Dispute::resolve(&mut conn, dispute_id, resolution)? {
        return Ok(ResolveOutcome::AlreadyClosed);
    }

    if !Transaction::resolve_dispute(&mut conn, &dispute.transaction_id, refund_buyer)? {
        warn!(
            dispute_id,
            transaction_id = %dispute.transaction_id,
            "Dispute resolved but transaction was not in disputed state"
        );
    }

    info!(dispute_id, refund_buyer, "Dispute resolved");
    Ok(ResolveOutcome::Resolved)
}

// --- Refunds ----------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
pub enum RefundOutcome {
    NotFound,
    NotRefundable,
    Refunded,
}

/// Admin refund: mark the transaction refunded and push the money back
/// through the payment provider when a session is on record.
pub async fn refund(
    pool: &crate::db::DbPool,
    stripe: &StripeClient,
    transaction_id: &str,
    reason: &str,
) -> Result<RefundOutcome> {
    let mut conn = pool.get().context("Failed to get DB connection")?;

    let transaction = match Transaction::find_by_id(&mut conn, transaction_id)? {
        Some(t) => t,
        None => return Ok(RefundOutcome::NotFound),
    };

    if !Transaction::mark_refunded(&mut conn, transaction_id)? {
        return Ok(RefundOutcome::NotRefundable);
    }

    if let Some(session_id) = &transaction.stripe_session_id {
        match stripe.retrieve_session(session_id).await {
            Ok(session) => {
                if let Some(payment_intent) = session.payment_intent {
                    if let Err(e) = stripe.create_refund(&payment_intent).await {
                        error!(transaction_id, error = %e, "Stripe refund failed");
                    }
                }
            }
            Err(e) => error!(transaction_id, error = %e, "Failed to look up session for refund"),
        }
    }

    if let Some(buyer_id) = &transaction.buyer_id {
        notify_user(
            &mut conn,
            buyer_id,
            IntentKind::RefundProcessed,
            format!("Refund processed for transaction {transaction_id}. Reason: {reason}"),
        );
    }

    info!(transaction_id, "Refund processed");
    Ok(RefundOutcome::Refunded)
}

// --- Off-platform sale ------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
pub enum OfflineSaleOutcome {
    NotFound,
    NotActive,
    Sold,
}

/// Seller-confirmed sale that happened outside the payment flow: mark the
/// listing sold and keep a buyer-less completed transaction for the books.
pub fn mark_listing_sold(
    pool: &crate::db::DbPool,
    listing_id: &str,
    seller_telegram_id: i64,
) -> Result<OfflineSaleOutcome> {
    let mut conn = pool.get().context("Failed to get DB connection")?;

    let seller = match User::find_by_telegram_id(&mut conn, seller_telegram_id)? {
        Some(u) => u,
        None => return Ok(OfflineSaleOutcome::NotFound),
    };

    let listing = match Listing::verify_ownership(&mut conn, listing_id, &seller.id)? {
        Some(l) => l,
        None => return Ok(OfflineSaleOutcome::NotFound),
    };

    if !Listing::transition_status(
        &mut conn,
        listing_id,
        &[ListingStatus::Active],
        ListingStatus::Sold,
    )? {
        return Ok(OfflineSaleOutcome::NotActive);
    }

    Transaction::create(
        &mut conn,
        NewTransaction::offline_sale(listing.id.clone(), seller.id.clone(), listing.price_cents),
    )?;

    info!(listing_id, "Listing sold off-platform");
    Ok(OfflineSaleOutcome::Sold)
}

// --- Contact info -----------------------------------------------------------

#[derive(Debug, serde::Serialize)]
pub struct ContactInfo {
    pub listing_title: String,
    pub listing_price: i32,
    pub seller_username: Option<String>,
    pub contact_message: String,
}

/// Seller contact details for an active listing.
pub fn contact_info(pool: &crate::db::DbPool, listing_id: &str) -> Result<Option<ContactInfo>> {
    let mut conn = pool.get().context("Failed to get DB connection")?;

    let listing = match Listing::find_by_id(&mut conn, listing_id)? {
        Some(l) if l.status == ListingStatus::Active.as_str() => l,
        _ => return Ok(None),
    };

    let seller = User::find_by_id(&mut conn, &listing.seller_id)?;

    Ok(Some(ContactInfo {
        contact_message: format!(
            "Hi! I'm interested in your listing \"{}\". Is it still available?",
            listing.title
        ),
        listing_title: listing.title,
        listing_price: listing.price_cents,
        seller_username: seller.and_then(|s| s.username),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::scratch_pool;
    use crate::models::listing::{DeliveryType, NewListing};

    fn seed_paid_transaction(pool: &crate::db::DbPool) -> (User, User, Transaction) {
        let mut conn = pool.get().unwrap();
        let seller = User::find_or_create(
            &mut conn,
            900,
            TelegramProfile {
                username: Some("seller900".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let buyer = User::find_or_create(&mut conn, 901, TelegramProfile::default()).unwrap();
        let listing = Listing::create(
            &mut conn,
            NewListing::new(
                seller.id.clone(),
                "Concert ticket".into(),
                "Front row".into(),
                "events".into(),
                5000,
                DeliveryType::Manual,
            ),
        )
        .unwrap();
        let tx = Transaction::create(
            &mut conn,
            NewTransaction::pending_payment(
                listing.id,
                buyer.id.clone(),
                seller.id.clone(),
                5000,
                "usd".into(),
            ),
        )
        .unwrap();
        (seller, buyer, tx)
    }

    #[test]
    fn checkout_completed_applies_once_and_notifies_both_parties() {
        let (_dir, pool) = scratch_pool();
        let (_seller, _buyer, tx) = seed_paid_transaction(&pool);

        let first = apply_checkout_completed(&pool, "evt_1", &tx.id).unwrap();
        assert_eq!(first, WebhookApply::Applied);

        let mut conn = pool.get().unwrap();
        let paid = Transaction::find_by_id(&mut conn, &tx.id).unwrap().unwrap();
        assert_eq!(paid.status, "paid");
        assert_eq!(paid.escrow_status.as_deref(), Some("held"));

        let intents = NotificationIntent::all(&mut conn).unwrap();
        let kinds: Vec<&str> = intents.iter().map(|i| i.kind.as_str()).collect();
        assert!(kinds.contains(&"payment_received"));
        assert!(kinds.contains(&"payment_confirmed"));
        let count_after_first = intents.len();
        drop(conn);

        // replaying the exact same event id changes nothing and re-sends nothing
        let replay = apply_checkout_completed(&pool, "evt_1", &tx.id).unwrap();
        assert_eq!(replay, WebhookApply::DuplicateEvent);

        let mut conn = pool.get().unwrap();
        assert_eq!(
            NotificationIntent::all(&mut conn).unwrap().len(),
            count_after_first
        );
    }

    #[test]
    fn fresh_event_id_on_already_paid_transaction_is_ignored() {
        let (_dir, pool) = scratch_pool();
        let (_seller, _buyer, tx) = seed_paid_transaction(&pool);

        apply_checkout_completed(&pool, "evt_1", &tx.id).unwrap();
        let second = apply_checkout_completed(&pool, "evt_2", &tx.id).unwrap();
        assert_eq!(second, WebhookApply::Ignored);
    }

    #[test]
    fn payment_failed_only_from_pending() {
        let (_dir, pool) = scratch_pool();
        let (_seller, _buyer, tx) = seed_paid_transaction(&pool);

        apply_checkout_completed(&pool, "evt_1", &tx.id).unwrap();
        // failure event arriving after success does not regress the state
        let late = apply_payment_failed(&pool, "evt_2", &tx.id).unwrap();
        assert_eq!(late, WebhookApply::Ignored);

        let mut conn = pool.get().unwrap();
        let unchanged = Transaction::find_by_id(&mut conn, &tx.id).unwrap().unwrap();
        assert_eq!(unchanged.status, "paid");
    }

    #[test]
    fn dispute_requires_participant_and_paid_state() {
        let (_dir, pool) = scratch_pool();
        let (_seller, buyer, tx) = seed_paid_transaction(&pool);

        // not yet paid
        match open_dispute(&pool, &tx.id, buyer.telegram_id, Some("late".into())).unwrap() {
            DisputeOutcome::NotDisputable => {}
            other => panic!("expected NotDisputable, got {other:?}"),
        }

        apply_checkout_completed(&pool, "evt_1", &tx.id).unwrap();

        // a stranger cannot even learn the transaction exists
        let mut conn = pool.get().unwrap();
        User::find_or_create(&mut conn, 999, TelegramProfile::default()).unwrap();
        drop(conn);
        match open_dispute(&pool, &tx.id, 999, None).unwrap() {
            DisputeOutcome::NotFound => {}
            other => panic!("expected NotFound, got {other:?}"),
        }

        // the buyer can
        let dispute = match open_dispute(&pool, &tx.id, buyer.telegram_id, Some("never arrived".into()))
            .unwrap()
        {
            DisputeOutcome::Opened(d) => d,
            other => panic!("expected Opened, got {other:?}"),
        };
        assert_eq!(dispute.status, "open");

        let mut conn = pool.get().unwrap();
        let disputed = Transaction::find_by_id(&mut conn, &tx.id).unwrap().unwrap();
        assert_eq!(disputed.status, "disputed");
        drop(conn);

        // resolve in the buyer's favor
        let outcome = resolve_dispute(&pool, &dispute.id, "seller unresponsive", true).unwrap();
        assert_eq!(outcome, ResolveOutcome::Resolved);

        let mut conn = pool.get().unwrap();
        let refunded = Transaction::find_by_id(&mut conn, &tx.id).unwrap().unwrap();
        assert_eq!(refunded.status, "refunded");
        assert_eq!(refunded.escrow_status.as_deref(), Some("refunded"));
        let closed = Dispute::find_by_id(&mut conn, &dispute.id).unwrap().unwrap();
        assert_eq!(closed.status, "resolved");
        assert_eq!(closed.resolution.as_deref(), Some("seller unresponsive"));
    }

    #[test]
    fn offline_sale_requires_active_listing_and_owner() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();

        let seller = User::find_or_create(&mut conn, 910, TelegramProfile::default()).unwrap();
        let other = User::find_or_create(&mut conn, 911, TelegramProfile::default()).unwrap();
        let listing = Listing::create(
            &mut conn,
            NewListing::new(
                seller.id.clone(),
                "Season pass".into(),
                "".into(),
                "events".into(),
                3000,
                DeliveryType::Manual,
            ),
        )
        .unwrap();
        drop(conn);

        // pending listings can't be sold
        match mark_listing_sold(&pool, &listing.id, seller.telegram_id).unwrap() {
            OfflineSaleOutcome::NotActive => {}
            other => panic!("expected NotActive, got {other:?}"),
        }

        let mut conn = pool.get().unwrap();
        Listing::transition_status(
            &mut conn,
            &listing.id,
            &[ListingStatus::PendingApproval],
            ListingStatus::Active,
        )
        .unwrap();
        drop(conn);

        // non-owner gets not-found
        match mark_listing_sold(&pool, &listing.id, other.telegram_id).unwrap() {
            OfflineSaleOutcome::NotFound => {}
            other => panic!("expected NotFound, got {other:?}"),
        }

        match mark_listing_sold(&pool, &listing.id, seller.telegram_id).unwrap() {
            OfflineSaleOutcome::Sold => {}
            other => panic!("expected Sold, got {other:?}"),
        }

        let mut conn = pool.get().unwrap();
        let sold = Listing::find_by_id(&mut conn, &listing.id).unwrap().unwrap();
        assert_eq!(sold.status, "sold");
    }

    #[test]
    fn contact_info_only_for_active_listings() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();

        let seller = User::find_or_create(
            &mut conn,
            920,
            TelegramProfile {
                username: Some("ticketguy".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let listing = Listing::create(
            &mut conn,
            NewListing::new(
                seller.id.clone(),
                "Festival pass".into(),
                "".into(),
                "events".into(),
                8000,
                DeliveryType::Manual,
            ),
        )
        .unwrap();
        drop(conn);

        assert!(contact_info(&pool, &listing.id).unwrap().is_none());

        let mut conn = pool.get().unwrap();
        Listing::transition_status(
            &mut conn,
            &listing.id,
            &[ListingStatus::PendingApproval],
            ListingStatus::Active,
        )
        .unwrap();
        drop(conn);

        let info = contact_info(&pool, &listing.id).unwrap().unwrap();
        assert_eq!(info.listing_title, "Festival pass");
        assert_eq!(info.listing_price, 8000);
        assert_eq!(info.seller_username.as_deref(), Some("ticketguy"));
        assert!(info.contact_message.contains("Festival pass"));
    }
}
