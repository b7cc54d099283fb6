//! Notification outbox.
//!
//! Business operations never talk to Telegram directly: they insert intents
//! here in the same breath as the state change that caused them, and the
//! worker in `services::notifier` delivers them with exponential backoff:
//!
//! Attempt 1: immediate
//! Attempt 2: +60s
//! Attempt 3: +300s
//! Attempt 4: +900s
//! Attempt 5: +3600s
//! Attempt 6: +7200s - final attempt

use anyhow::Result;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::notification_outbox;

/// Retry delays in seconds between attempts.
pub const RETRY_DELAYS: [i64; 5] = [60, 300, 900, 3600, 7200];

/// Maximum delivery attempts, including the initial one.
pub const MAX_ATTEMPTS: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Retrying,
    Delivered,
    Failed,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrying => "retrying",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

/// What kind of notification an intent carries.
///
/// `ApprovalRequest` intents get the approve/deny keyboard rebuilt from
/// `reference_id` at send time; everything else is plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    ApprovalRequest,
    ListingApproved,
    ListingRejected,
    ChannelPost,
    PaymentReceived,
    PaymentConfirmed,
    PaymentFailed,
    FundsReleased,
    DisputeOpened,
    RefundProcessed,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApprovalRequest => "approval_request",
            Self::ListingApproved => "listing_approved",
            Self::ListingRejected => "listing_rejected",
            Self::ChannelPost => "channel_post",
            Self::PaymentReceived => "payment_received",
            Self::PaymentConfirmed => "payment_confirmed",
            Self::PaymentFailed => "payment_failed",
            Self::FundsReleased => "funds_released",
            Self::DisputeOpened => "dispute_opened",
            Self::RefundProcessed => "refund_processed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approval_request" => Some(Self::ApprovalRequest),
            "listing_approved" => Some(Self::ListingApproved),
            "listing_rejected" => Some(Self::ListingRejected),
            "channel_post" => Some(Self::ChannelPost),
            "payment_received" => Some(Self::PaymentReceived),
            "payment_confirmed" => Some(Self::PaymentConfirmed),
            "payment_failed" => Some(Self::PaymentFailed),
            "funds_released" => Some(Self::FundsReleased),
            "dispute_opened" => Some(Self::DisputeOpened),
            "refund_processed" => Some(Self::RefundProcessed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = notification_outbox)]
pub struct NotificationIntent {
    pub id: String,
    /// Numeric chat id or `@channelname`.
    pub recipient: String,
    pub kind: String,
    pub body: String,
    pub reference_id: Option<String>,
    pub status: String,
    pub attempt_count: i32,
    pub next_retry_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub delivered_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notification_outbox)]
pub struct NewNotificationIntent {
    pub id: String,
    pub recipient: String,
    pub kind: String,
    pub body: String,
    pub reference_id: Option<String>,
    pub status: String,
    pub attempt_count: i32,
}

impl NewNotificationIntent {
    pub fn new(
        recipient: String,
        kind: IntentKind,
        body: String,
        reference_id: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            recipient,
            kind: kind.as_str().to_string(),
            body,
            reference_id,
            status: IntentStatus::Pending.as_str().to_string(),
            attempt_count: 0,
        }
    }
}

impl NotificationIntent {
    pub fn enqueue(
        conn: &mut SqliteConnection,
        new_intent: NewNotificationIntent,
    ) -> Result<NotificationIntent> {
        use crate::schema::notification_outbox::dsl;

        diesel::insert_into(dsl::notification_outbox)
            .values(&new_intent)
            .execute(conn)?;

        let intent = dsl::notification_outbox
            .find(&new_intent.id)
            .first::<NotificationIntent>(conn)?;
        Ok(intent)
    }

    /// Intents ready for (re)delivery, oldest first.
    pub fn due(conn: &mut SqliteConnection, limit: i64) -> Result<Vec<NotificationIntent>> {
        use crate::schema::notification_outbox::dsl;

        let now = chrono::Utc::now().naive_utc();
        let results = dsl::notification_outbox
            .filter(
                dsl::status
                    .eq(IntentStatus::Pending.as_str())
                    .or(dsl::status.eq(IntentStatus::Retrying.as_str())),
            )
            .filter(dsl::next_retry_at.is_null().or(dsl::next_retry_at.le(now)))
            .order(dsl::created_at.asc())
            .limit(limit)
            .load::<NotificationIntent>(conn)?;
        Ok(results)
    }

    pub fn mark_delivered(conn: &mut SqliteConnection, intent_id: &str) -> Result<()> {
        use crate::schema::notification_outbox::dsl;

        let now = chrono::Utc::now().naive_utc();
        diesel::update(dsl::notification_outbox.find(intent_id))
            .set((
                dsl::status.eq(IntentStatus::Delivered.as_str()),
                dsl::attempt_count.eq(dsl::attempt_count + 1),
                dsl::delivered_at.eq(now),
            ))
            .execute(conn)?;
        Ok(())
    }

    /// Record a failed attempt and schedule the next retry.
    ///
    /// Returns true when the intent has exhausted its attempts and is now
    /// terminally failed.
    pub fn mark_failed(
        conn: &mut SqliteConnection,
        intent_id: &str,
        error: &str,
    ) -> Result<bool> {
        use crate::schema::notification_outbox::dsl;

        let current: NotificationIntent =
            dsl::notification_outbox.find(intent_id).first(conn)?;

        let attempts = current.attempt_count + 1;
        let now = chrono::Utc::now().naive_utc();

        if attempts >= MAX_ATTEMPTS {
            diesel::update(dsl::notification_outbox.find(intent_id))
                .set((
                    dsl::status.eq(IntentStatus::Failed.as_str()),
                    dsl::attempt_count.eq(attempts),
                    dsl::last_error.eq(error),
                    dsl::next_retry_at.eq(None::<NaiveDateTime>),
                ))
                .execute(conn)?;
            return Ok(true);
        }

        let delay_idx = (attempts as usize - 1).min(RETRY_DELAYS.len() - 1);
        let next_retry = now + chrono::Duration::seconds(RETRY_DELAYS[delay_idx]);

        diesel::update(dsl::notification_outbox.find(intent_id))
            .set((
                dsl::status.eq(IntentStatus::Retrying.as_str()),
                dsl::attempt_count.eq(attempts),
                dsl::last_error.eq(error),
                dsl::next_retry_at.eq(next_retry),
            ))
            .execute(conn)?;

        Ok(false)
    }

    #[cfg(test)]
    pub fn all(conn: &mut SqliteConnection) -> Result<Vec<NotificationIntent>> {
        use crate::schema::notification_outbox::dsl;
        Ok(dsl::notification_outbox
            .order(dsl::created_at.asc())
            .load::<NotificationIntent>(conn)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::scratch_pool;

    #[test]
    fn enqueue_is_immediately_due() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();

        NotificationIntent::enqueue(
            &mut conn,
            NewNotificationIntent::new("12345".into(), IntentKind::ListingApproved, "hi".into(), None),
        )
        .unwrap();

        let due = NotificationIntent::due(&mut conn, 10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].status, "pending");
    }

    #[test]
    fn failure_schedules_backoff_then_exhausts() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();

        let intent = NotificationIntent::enqueue(
            &mut conn,
            NewNotificationIntent::new("12345".into(), IntentKind::ChannelPost, "post".into(), None),
        )
        .unwrap();

        // First failure: retrying, scheduled in the future, so not due
        let final_now = NotificationIntent::mark_failed(&mut conn, &intent.id, "chat not found").unwrap();
        assert!(!final_now);
        assert!(NotificationIntent::due(&mut conn, 10).unwrap().is_empty());

        for _ in 1..(MAX_ATTEMPTS - 1) {
            NotificationIntent::mark_failed(&mut conn, &intent.id, "still failing").unwrap();
        }
        // Sixth failure exhausts the attempts
        let exhausted = NotificationIntent::mark_failed(&mut conn, &intent.id, "gone").unwrap();
        assert!(exhausted);

        let rows = NotificationIntent::all(&mut conn).unwrap();
        assert_eq!(rows[0].status, "failed");
        assert_eq!(rows[0].attempt_count, MAX_ATTEMPTS);
    }

    #[test]
    fn delivered_intents_leave_the_queue() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();

        let intent = NotificationIntent::enqueue(
            &mut conn,
            NewNotificationIntent::new("@channel".into(), IntentKind::ChannelPost, "post".into(), None),
        )
        .unwrap();

        NotificationIntent::mark_delivered(&mut conn, &intent.id).unwrap();
        assert!(NotificationIntent::due(&mut conn, 10).unwrap().is_empty());

        let rows = NotificationIntent::all(&mut conn).unwrap();
        assert_eq!(rows[0].status, "delivered");
        assert!(rows[0].delivered_at.is_some());
    }
}
