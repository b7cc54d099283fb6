//! Telegram bot front-end.
//!
//! Updates arrive through `POST /webhooks/telegram` and are dispatched here:
//! commands and form-flow messages to `commands`, button presses to
//! `callbacks`. The sell flow itself is the pure state machine in `flow`,
//! with per-user sessions held behind the `state::SessionStore` trait.
//!
//! Every update is wrapped in a catch-all: whatever goes wrong, the user
//! gets an apology instead of silence, and the cause goes to the log.

pub mod callbacks;
pub mod commands;
pub mod flow;
pub mod format;
pub mod keyboards;
pub mod state;

use teloxide::prelude::*;
use teloxide::types::{Update, UpdateKind};
use tracing::error;

use crate::db::DbPool;
use state::SessionStore;

/// Dispatch one inbound update. Never returns an error to the webhook
/// handler; failures are logged and answered with a generic apology.
pub async fn handle_update(bot: &Bot, pool: &DbPool, store: &dyn SessionStore, update: Update) {
    match update.kind {
        UpdateKind::Message(message) => {
            let result = match message.text() {
                Some(text) if text.starts_with('/') => {
                    commands::handle_command(bot, pool, store, &message, text).await
                }
                _ => commands::handle_message(bot, pool, store, &message).await,
            };

            if let Err(e) = result {
                error!(error = %e, chat = message.chat.id.0, "Message handling failed");
                let _ = bot
                    .send_message(
                        message.chat.id,
                        "Sorry, there was an error processing your request. Please try again later.",
                    )
                    .await;
            }
        }

        UpdateKind::CallbackQuery(query) => {
            if let Err(e) = callbacks::handle_callback(bot, pool, store, &query).await {
                error!(error = %e, user = query.from.id.0, "Callback handling failed");
                let _ = bot
                    .answer_callback_query(query.id.clone())
                    .text("Error occurred. Please try again.")
                    .await;
            }
        }

        // channel posts, edits and the rest are none of our business
        _ => {}
    }
}
