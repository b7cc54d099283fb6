//! Listing approval workflow.
//!
//! Newly created listings are routed to a configured set of approver
//! identities; their decision moves the listing to `active` or `rejected`,
//! publishes approved listings to the public channel, and notifies the
//! seller. All notifications go through the outbox; a recipient failure can
//! never block another recipient or roll back a decision.

use anyhow::Result;
use diesel::SqliteConnection;
use std::env;
use tracing::{info, warn};

use crate::bot::format::{delivery_emoji, escape_markdown, usd};
use crate::config;
use crate::models::listing::{Listing, ListingStatus};
use crate::models::outbox::{IntentKind, NewNotificationIntent, NotificationIntent};
use crate::models::user::User;

/// Approver identities, re-read from the environment on every call.
///
/// Authorization must reflect the live configuration: changing
/// APPROVER_USER_IDS between submission and decision changes who may decide.
pub fn approver_user_ids() -> Vec<i64> {
    match env::var("APPROVER_USER_IDS") {
        Ok(raw) => raw
            .split(',')
            .filter_map(|part| part.trim().parse::<i64>().ok())
            .collect(),
        Err(_) => Vec::new(),
    }
}

pub fn is_approver(telegram_id: i64) -> bool {
    approver_user_ids().contains(&telegram_id)
}

/// Queue an approval request to every configured approver.
///
/// With no approvers configured this is a silent no-op: approval is optional
/// when unconfigured.
pub fn submit_for_approval(
    conn: &mut SqliteConnection,
    listing: &Listing,
    seller: &User,
) -> Result<()> {
    let approvers = approver_user_ids();
    if approvers.is_empty() {
        info!(listing_id = %listing.id, "No approvers configured, skipping approval request");
        return Ok(());
    }

    let body = approval_request_text(listing, seller);

    for approver_id in &approvers {
        let intent = NewNotificationIntent::new(
            approver_id.to_string(),
            IntentKind::ApprovalRequest,
            body.clone(),
            Some(listing.id.clone()),
        );
        if let Err(e) = NotificationIntent::enqueue(conn, intent) {
            warn!(
                listing_id = %listing.id,
                approver_id,
                error = %e,
                "Failed to queue approval request"
            );
        }
    }

    info!(
        listing_id = %listing.id,
        approver_count = approvers.len(),
        "Queued approval requests"
    );
    Ok(())
}

/// Result of an approve/deny attempt.
#[derive(Debug, Clone)]
pub enum DecisionOutcome {
    Unauthorized,
    NotFound,
    AlreadyDecided,
    Approved(Listing),
    Rejected(Listing),
}

impl DecisionOutcome {
    /// Message shown to the acting approver in the bot.
    pub fn approver_message(&self) -> String {
        match self {
            DecisionOutcome::Unauthorized => {
                "❌ You are not authorized to approve listings.".to_string()
            }
            DecisionOutcome::NotFound => "❌ Listing not found.".to_string(),
            DecisionOutcome::AlreadyDecided => {
                "❌ This listing has already been decided.".to_string()
            }
            DecisionOutcome::Approved(listing) => format!(
                "✅ *Listing Approved and Posted!*\n\n📝 *{}*\n\nThe listing has been posted to the trading channel.",
                escape_markdown(&listing.title)
            ),
            DecisionOutcome::Rejected(listing) => format!(
                "❌ *Listing Rejected*\n\n📝 *{}*\n\nThe seller has been notified of the rejection.",
                escape_markdown(&listing.title)
            ),
        }
    }
}

/// Process an approver's decision from the bot.
///
/// The authorization check runs against the approver list as configured
/// right now, not as it was when the request went out.
pub fn process_decision(
    conn: &mut SqliteConnection,
    listing_id: &str,
    approve: bool,
    actor_telegram_id: i64,
) -> Result<DecisionOutcome> {
    if !is_approver(actor_telegram_id) {
        info!(
            listing_id,
            actor = actor_telegram_id,
            "Unauthorized approval attempt"
        );
        return Ok(DecisionOutcome::Unauthorized);
    }

    apply_verdict(conn, listing_id, approve)
}

/// Apply an approve/deny verdict and queue the follow-up notifications.
///
/// Shared by the bot decision path and the trusted admin REST endpoint
/// (which performs no approver check of its own).
pub fn apply_verdict(
    conn: &mut SqliteConnection,
    listing_id: &str,
    approve: bool,
) -> Result<DecisionOutcome> {
    let target = if approve {
        ListingStatus::Active
    } else {
        ListingStatus::Rejected
    };

    let moved = Listing::transition_status(
        conn,
        listing_id,
        &[ListingStatus::PendingApproval],
        target,
    )?;

    if !moved {
        return Ok(match Listing::find_by_id(conn, listing_id)? {
            None => DecisionOutcome::NotFound,
            Some(_) => DecisionOutcome::AlreadyDecided,
        });
    }

    let listing = match Listing::find_by_id(conn, listing_id)? {
        Some(l) => l,
        None => return Ok(DecisionOutcome::NotFound),
    };
    let seller = User::find_by_id(conn, &listing.seller_id)?;

    if approve {
        publish_to_channel(conn, &listing, seller.as_ref());

        if let Some(seller) = &seller {
            let body = format!(
                "🎉 *Your listing has been approved!*\n\n📝 *{}*\n\nYour subscription listing is now live on our trading channel!\n\nUse /portfolio to view your listings.",
                escape_markdown(&listing.title)
            );
            enqueue_quietly(
                conn,
                NewNotificationIntent::new(
                    seller.telegram_id.to_string(),
                    IntentKind::ListingApproved,
                    body,
                    Some(listing.id.clone()),
                ),
            );
        }

        info!(listing_id = %listing.id, "Listing approved");
        Ok(DecisionOutcome::Approved(listing))
    } else {
        if let Some(seller) = &seller {
            let body = format!(
                "❌ *Your listing was not approved*\n\n📝 *{}*\n\nUnfortunately, your listing did not meet our quality standards or community guidelines.\n\nPlease review our guidelines and feel free to submit a new listing.\n\nUse /sell to create a new listing.",
                escape_markdown(&listing.title)
            );
            enqueue_quietly(
                conn,
                NewNotificationIntent::new(
                    seller.telegram_id.to_string(),
                    IntentKind::ListingRejected,
                    body,
                    Some(listing.id.clone()),
                ),
            );
        }

        info!(listing_id = %listing.id, "Listing rejected");
        Ok(DecisionOutcome::Rejected(listing))
    }
}

/// Queue the public channel post for an approved listing.
///
/// Best-effort: no configured channel means no post, and a queueing failure
/// is logged without surfacing to the approver or seller.
fn publish_to_channel(conn: &mut SqliteConnection, listing: &Listing, seller: Option<&User>) {
    let channel = match config::channel_id() {
        Some(c) => c,
        None => {
            info!(listing_id = %listing.id, "CHANNEL_ID not set, skipping channel post");
            return;
        }
    };

    let body = channel_post_text(listing, seller);
    enqueue_quietly(
        conn,
        NewNotificationIntent::new(channel, IntentKind::ChannelPost, body, Some(listing.id.clone())),
    );
}

fn enqueue_quietly(conn: &mut SqliteConnection, intent: NewNotificationIntent) {
    if let Err(e) = NotificationIntent::enqueue(conn, intent) {
        warn!(error = %e, "Failed to queue notification");
    }
}

fn approval_request_text(listing: &Listing, seller: &User) -> String {
    format!(
        "🔍 *New Listing Awaiting Approval*\n\n\
         📝 *Title:* {title}\n\n\
         📋 *Description:*\n{description}\n\n\
         🏷️ *Category:* {category}\n\
         💰 *Price:* ${price} USD\n\
         {delivery_emoji} *Delivery:* {delivery}\n\n\
         👤 *Seller:* {seller}\n\
         💬 *Contact:* {contact}\n\
         🆔 *Seller ID:* {seller_tg}\n\n\
         🆔 *Listing ID:* {listing_id}\n\n\
         Please review this listing and approve or deny it.",
        title = escape_markdown(&listing.title),
        description = escape_markdown(&listing.description),
        category = escape_markdown(&listing.category),
        price = usd(listing.price_cents),
        delivery_emoji = delivery_emoji(&listing.delivery_type),
        delivery = escape_markdown(&listing.delivery_type),
        seller = escape_markdown(seller.label()),
        contact = seller
            .username
            .as_deref()
            .map(|u| format!("@{}", escape_markdown(u)))
            .unwrap_or_else(|| "No username set".to_string()),
        seller_tg = seller.telegram_id,
        listing_id = listing.id,
    )
}

fn channel_post_text(listing: &Listing, seller: Option<&User>) -> String {
    let bot_username = env::var("BOT_USERNAME").unwrap_or_else(|_| "subshare_bot".to_string());
    let seller_line = seller
        .and_then(|s| s.username.as_deref())
        .map(|u| format!("@{}", escape_markdown(u)))
        .unwrap_or_else(|| "Someone".to_string());

    format!(
        "{seller_line} is selling {title}\n\n\
         💰 ${price} USD\n\
         📋 {description}\n\n\
         Category: {category}\n\
         {delivery_emoji} Delivery: {delivery}\n\n\
         List your sharable subscriptions and digital products with @{bot}",
        title = escape_markdown(&listing.title),
        price = usd(listing.price_cents),
        description = escape_markdown(&listing.description),
        category = escape_markdown(&listing.category),
        delivery_emoji = delivery_emoji(&listing.delivery_type),
        delivery = escape_markdown(&listing.delivery_type),
        bot = bot_username.trim_start_matches('@'),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::scratch_pool;
    use crate::models::listing::{DeliveryType, NewListing};
    use crate::models::user::TelegramProfile;
    use std::sync::{Mutex, MutexGuard};

    // These tests mutate APPROVER_USER_IDS / CHANNEL_ID; serialize them so
    // the parallel test runner cannot interleave env writes.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn seed(conn: &mut SqliteConnection) -> (User, Listing) {
        let seller = User::find_or_create(
            conn,
            500,
            TelegramProfile {
                username: Some("seller".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let listing = Listing::create(
            conn,
            NewListing::new(
                seller.id.clone(),
                "Netflix 4K".into(),
                "Shared household slot".into(),
                "streaming".into(),
                1500,
                DeliveryType::Instant,
            ),
        )
        .unwrap();
        (seller, listing)
    }

    #[test]
    fn parses_approver_ids_ignoring_junk() {
        let _env = env_guard();
        std::env::set_var("APPROVER_USER_IDS", " 111, 222,abc, ,333 ");
        assert_eq!(approver_user_ids(), vec![111, 222, 333]);
        std::env::set_var("APPROVER_USER_IDS", "");
        assert!(approver_user_ids().is_empty());
        std::env::remove_var("APPROVER_USER_IDS");
        assert!(approver_user_ids().is_empty());
    }

    #[test]
    fn submission_queues_one_request_per_approver() {
        let _env = env_guard();
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();
        let (seller, listing) = seed(&mut conn);

        std::env::set_var("APPROVER_USER_IDS", "111,222");
        submit_for_approval(&mut conn, &listing, &seller).unwrap();
        std::env::remove_var("APPROVER_USER_IDS");

        let intents = NotificationIntent::all(&mut conn).unwrap();
        assert_eq!(intents.len(), 2);
        assert!(intents.iter().any(|i| i.recipient == "111"));
        assert!(intents.iter().any(|i| i.recipient == "222"));
        for intent in &intents {
            assert_eq!(intent.kind, "approval_request");
            assert_eq!(intent.reference_id.as_deref(), Some(listing.id.as_str()));
            assert!(intent.body.contains("Netflix 4K"));
        }
    }

    #[test]
    fn decision_requires_membership_in_live_config() {
        let _env = env_guard();
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();
        let (_seller, listing) = seed(&mut conn);

        std::env::set_var("APPROVER_USER_IDS", "111");

        // 222 is not in the list: unauthorized and nothing written
        let outcome = process_decision(&mut conn, &listing.id, true, 222).unwrap();
        assert!(matches!(outcome, DecisionOutcome::Unauthorized));
        let unchanged = Listing::find_by_id(&mut conn, &listing.id).unwrap().unwrap();
        assert_eq!(unchanged.status, "pending_approval");

        // config changes take effect immediately
        std::env::set_var("APPROVER_USER_IDS", "111,222");
        let outcome = process_decision(&mut conn, &listing.id, true, 222).unwrap();
        assert!(matches!(outcome, DecisionOutcome::Approved(_)));
        std::env::remove_var("APPROVER_USER_IDS");

        let approved = Listing::find_by_id(&mut conn, &listing.id).unwrap().unwrap();
        assert_eq!(approved.status, "active");
    }

    #[test]
    fn approval_is_terminal() {
        let _env = env_guard();
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();
        let (_seller, listing) = seed(&mut conn);

        std::env::set_var("APPROVER_USER_IDS", "111");
        let first = process_decision(&mut conn, &listing.id, false, 111).unwrap();
        assert!(matches!(first, DecisionOutcome::Rejected(_)));

        // a second decision on the same listing bounces
        let second = process_decision(&mut conn, &listing.id, true, 111).unwrap();
        assert!(matches!(second, DecisionOutcome::AlreadyDecided));
        std::env::remove_var("APPROVER_USER_IDS");

        let rejected = Listing::find_by_id(&mut conn, &listing.id).unwrap().unwrap();
        assert_eq!(rejected.status, "rejected");
    }

    #[test]
    fn approval_queues_channel_post_and_seller_notice() {
        let _env = env_guard();
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();
        let (_seller, listing) = seed(&mut conn);

        std::env::set_var("APPROVER_USER_IDS", "111");
        std::env::set_var("CHANNEL_ID", "@subshare_market");
        let outcome = process_decision(&mut conn, &listing.id, true, 111).unwrap();
        std::env::remove_var("CHANNEL_ID");
        std::env::remove_var("APPROVER_USER_IDS");

        assert!(matches!(outcome, DecisionOutcome::Approved(_)));

        let intents = NotificationIntent::all(&mut conn).unwrap();
        let kinds: Vec<&str> = intents.iter().map(|i| i.kind.as_str()).collect();
        assert!(kinds.contains(&"channel_post"));
        assert!(kinds.contains(&"listing_approved"));

        let channel_post = intents.iter().find(|i| i.kind == "channel_post").unwrap();
        assert_eq!(channel_post.recipient, "@subshare_market");
        assert!(channel_post.body.contains("is selling"));
    }
}
