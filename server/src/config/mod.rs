//! Environment-driven configuration.
//!
//! Recognized variables:
//! - DATABASE_URL: SQLite database path (required)
//! - BOT_TOKEN: Telegram bot token (required)
//! - BOT_USERNAME: bot handle advertised in channel posts
//! - APPROVER_USER_IDS: comma-separated Telegram ids allowed to approve
//!   listings; re-read on every decision, never cached
//! - CHANNEL_ID: channel for publishing approved listings (`@name` or `-100…`)
//! - ADMIN_TELEGRAM_ID: chat receiving dispute alerts
//! - STRIPE_SECRET / STRIPE_WEBHOOK_SECRET: payment provider credentials
//! - PLATFORM_BASE_URL: base for checkout success/cancel links
//! - OUTBOX_POLL_SECS: notification worker interval (default 15)
//! - HOST / PORT: HTTP bind address (defaults 0.0.0.0:4000)

use anyhow::{Context, Result};
use std::env;

/// Platform cut taken from released funds, in percent. Fixed by product
/// decision, intentionally not configurable.
pub const PLATFORM_FEE_PERCENT: i64 = 5;

/// Default poll interval for the notification outbox worker.
pub const DEFAULT_OUTBOX_POLL_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bot_token: String,
    pub bot_username: String,
    pub host: String,
    pub port: u16,
    pub outbox_poll_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let bot_token = env::var("BOT_TOKEN").context("BOT_TOKEN must be set")?;

        let bot_username = env::var("BOT_USERNAME")
            .unwrap_or_else(|_| "subshare_bot".to_string())
            .trim_start_matches('@')
            .to_string();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4000);

        let outbox_poll_secs = env::var("OUTBOX_POLL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_OUTBOX_POLL_SECS);

        Ok(Self {
            database_url,
            bot_token,
            bot_username,
            host,
            port,
            outbox_poll_secs,
        })
    }
}

/// Channel configured for publishing approved listings, if any.
///
/// Accepts `@channelname` or a numeric chat id. Anything else is treated as
/// unconfigured so a typo degrades to "no channel post" instead of a stream
/// of failed sends.
pub fn channel_id() -> Option<String> {
    let raw = env::var("CHANNEL_ID").ok()?;
    let trimmed = raw.trim().to_string();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('@') || trimmed.starts_with('-') || trimmed.parse::<i64>().is_ok() {
        Some(trimmed)
    } else {
        tracing::warn!(channel = %trimmed, "CHANNEL_ID has unexpected format, ignoring");
        None
    }
}

/// Chat that receives dispute alerts, if configured.
pub fn admin_chat_id() -> Option<i64> {
    env::var("ADMIN_TELEGRAM_ID").ok()?.trim().parse().ok()
}

/// Compute the platform fee for a released amount, rounding half up.
pub fn platform_fee_cents(amount_cents: i64) -> i64 {
    (amount_cents * PLATFORM_FEE_PERCENT + 50) / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_is_five_percent_rounded() {
        assert_eq!(platform_fee_cents(1000), 50);
        assert_eq!(platform_fee_cents(1500), 75);
        // 5% of 1010 = 50.5, rounds up
        assert_eq!(platform_fee_cents(1010), 51);
        assert_eq!(platform_fee_cents(0), 0);
    }
}
