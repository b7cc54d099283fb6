//! Outbox delivery worker.
//!
//! Periodically drains due notification intents and sends them through the
//! Telegram Bot API. Failures reschedule the intent with exponential backoff
//! until its attempts run out; nothing here ever propagates an error back
//! into the business operation that queued the intent.

use anyhow::{Context, Result};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode, Recipient};
use tracing::{error, info, warn};

use crate::bot::keyboards;
use crate::db::DbPool;
use crate::models::outbox::{IntentKind, NotificationIntent};

/// Intents fetched per drain pass.
const DRAIN_BATCH_SIZE: i64 = 25;

pub struct OutboxWorker {
    bot: Bot,
    pool: DbPool,
    poll_interval: Duration,
}

/// Resolve an outbox recipient: numeric chat id or `@channelname`.
fn parse_recipient(raw: &str) -> Option<Recipient> {
    if raw.starts_with('@') {
        return Some(Recipient::ChannelUsername(raw.to_string()));
    }
    raw.parse::<i64>().ok().map(|id| Recipient::Id(ChatId(id)))
}

impl OutboxWorker {
    pub fn new(bot: Bot, pool: DbPool, poll_interval_secs: u64) -> Self {
        Self {
            bot,
            pool,
            poll_interval: Duration::from_secs(poll_interval_secs),
        }
    }

    /// Run the drain loop forever.
    pub async fn start(self) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "Starting notification outbox worker"
        );

        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            interval.tick().await;

            match self.process_due().await {
                Ok(0) => {}
                Ok(count) => info!(delivered = count, "Processed notification intents"),
                Err(e) => error!(error = %e, "Outbox drain pass failed"),
            }
        }
    }

    /// Deliver everything currently due. Returns the number of attempts made.
    pub async fn process_due(&self) -> Result<usize> {
        let due = {
            let mut conn = self.pool.get().context("Failed to get DB connection")?;
            NotificationIntent::due(&mut conn, DRAIN_BATCH_SIZE)?
        };

        if due.is_empty() {
            return Ok(0);
        }

        let mut processed = 0;
        for intent in due {
            self.deliver(&intent).await;
            processed += 1;
        }

        Ok(processed)
    }

    async fn deliver(&self, intent: &NotificationIntent) {
        let result = match parse_recipient(&intent.recipient) {
            Some(recipient) => self.send(recipient, intent).await,
            None => Err(format!("unusable recipient {:?}", intent.recipient)),
        };

        let mut conn = match self.pool.get() {
            Ok(c) => c,
            Err(e) => {
                error!(intent_id = %intent.id, error = %e, "Lost DB connection after send");
                return;
            }
        };

        match result {
            Ok(()) => {
                if let Err(e) = NotificationIntent::mark_delivered(&mut conn, &intent.id) {
                    error!(intent_id = %intent.id, error = %e, "Failed to mark intent delivered");
                }
            }
            Err(send_error) => {
                match NotificationIntent::mark_failed(&mut conn, &intent.id, &send_error) {
                    Ok(true) => warn!(
                        intent_id = %intent.id,
                        recipient = %intent.recipient,
                        error = %send_error,
                        "Notification permanently failed"
                    ),
                    Ok(false) => warn!(
                        intent_id = %intent.id,
                        error = %send_error,
                        "Notification failed, retry scheduled"
                    ),
                    Err(e) => error!(intent_id = %intent.id, error = %e, "Failed to record failure"),
                }
            }
        }
    }

    async fn send(&self, recipient: Recipient, intent: &NotificationIntent) -> Result<(), String> {
        let mut request = self
            .bot
            .send_message(recipient, intent.body.clone())
            .parse_mode(ParseMode::Markdown);

        // Approval requests carry the approve/deny buttons, rebuilt from the
        // listing id so the queue stores no keyboard state.
        if IntentKind::parse(&intent.kind) == Some(IntentKind::ApprovalRequest) {
            if let Some(listing_id) = &intent.reference_id {
                request = request.reply_markup(keyboards::approval_keyboard(listing_id));
            }
        }

        request.await.map(|_| ()).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipients_parse_as_chat_or_channel() {
        assert!(matches!(
            parse_recipient("12345"),
            Some(Recipient::Id(ChatId(12345)))
        ));
        assert!(matches!(
            parse_recipient("-1001234567890"),
            Some(Recipient::Id(ChatId(-1001234567890)))
        ));
        match parse_recipient("@subshare_market") {
            Some(Recipient::ChannelUsername(name)) => assert_eq!(name, "@subshare_market"),
            other => panic!("expected channel username, got {other:?}"),
        }
        assert!(parse_recipient("not a chat").is_none());
    }
}
