//! Inline-keyboard callback routing.
//!
//! Callback data follows the `action_` / `action_<id>` convention set by
//! `bot::keyboards`. Flow-step callbacks feed the state machine; management
//! and approval callbacks act directly and answer the query with the result.

use anyhow::{Context, Result};
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ChatId, InlineKeyboardMarkup, ParseMode};
use tracing::debug;

use crate::bot::flow::{self, Action, Event, Session, Step};
use crate::bot::format::{escape_markdown, usd};
use crate::bot::keyboards;
use crate::bot::state::SessionStore;
use crate::db::DbPool;
use crate::models::listing::{Listing, ListingStatus};
use crate::models::user::User;
use crate::services::approval;

/// Answer the callback query, optionally with toast text. Best-effort: the
/// button press was already handled, a failed ack only leaves a spinner.
async fn answer(bot: &Bot, query: &CallbackQuery, text: Option<&str>) {
    let mut request = bot.answer_callback_query(query.id.clone());
    if let Some(text) = text {
        request = request.text(text.to_string());
    }
    if let Err(e) = request.await {
        debug!(error = %e, "Failed to answer callback query");
    }
}

/// Replace the message the button lives on, falling back to a fresh message
/// when the original is no longer editable.
async fn edit_or_send(
    bot: &Bot,
    query: &CallbackQuery,
    text: &str,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    match &query.message {
        Some(message) => {
            let mut request = bot
                .edit_message_text(message.chat.id, message.id, text.to_string())
                .parse_mode(ParseMode::Markdown);
            if let Some(keyboard) = keyboard {
                request = request.reply_markup(keyboard);
            }
            request.await.context("Failed to edit message")?;
        }
        None => {
            let mut request = bot
                .send_message(ChatId(query.from.id.0 as i64), text.to_string())
                .parse_mode(ParseMode::Markdown);
            if let Some(keyboard) = keyboard {
                request = request.reply_markup(keyboard);
            }
            request.await.context("Failed to send fallback message")?;
        }
    }
    Ok(())
}

pub async fn handle_callback(
    bot: &Bot,
    pool: &DbPool,
    store: &dyn SessionStore,
    query: &CallbackQuery,
) -> Result<()> {
    let data = match query.data.as_deref() {
        Some(d) => d,
        None => return Ok(()),
    };
    let telegram_id = query.from.id.0 as i64;

    if let Some(category) = data.strip_prefix("category_") {
        let category = category.replace('_', " ");
        // a stale button can arrive without a session; start one fresh
        let session = store
            .get(telegram_id)
            .unwrap_or_else(|| Session::new(Step::Category));
        run_flow_event(bot, store, query, telegram_id, session, Event::CategorySelected(&category))
            .await?;
    } else if data == "price_custom" {
        match store.get(telegram_id) {
            Some(session) => {
                run_flow_event(bot, store, query, telegram_id, session, Event::CustomPriceRequested)
                    .await?;
            }
            None => answer(bot, query, Some("Please start over with /sell")).await,
        }
    } else if let Some(raw_price) = data.strip_prefix("price_") {
        match (store.get(telegram_id), raw_price.parse::<i32>()) {
            (Some(session), Ok(cents)) => {
                run_flow_event(
                    bot,
                    store,
                    query,
                    telegram_id,
                    session,
                    Event::PriceTierSelected(cents),
                )
                .await?;
            }
            _ => answer(bot, query, Some("Please start over with /sell")).await,
        }
    } else if let Some(delivery) = data.strip_prefix("delivery_") {
        match store.get(telegram_id) {
            Some(session) => {
                run_flow_event(
                    bot,
                    store,
                    query,
                    telegram_id,
                    session,
                    Event::DeliverySelected(delivery),
                )
                .await?;
            }
            None => answer(bot, query, Some("Please start over with /sell")).await,
        }
    } else if data == "back_to_category" {
        let session = store
            .get(telegram_id)
            .unwrap_or_else(|| Session::new(Step::Category));
        run_flow_event(bot, store, query, telegram_id, session, Event::BackToCategory).await?;
    } else if data == "back_to_pricing" {
        match store.get(telegram_id) {
            Some(session) => {
                run_flow_event(bot, store, query, telegram_id, session, Event::BackToPricing)
                    .await?;
            }
            None => answer(bot, query, Some("Please start over with /sell")).await,
        }
    } else if data == "cancel_sell" {
        store.clear(telegram_id);
        edit_or_send(
            bot,
            query,
            "❌ *Cancelled*\n\nSubscription creation cancelled. Use /sell to start again.",
            None,
        )
        .await?;
        answer(bot, query, None).await;
    } else if let Some(listing_id) = data.strip_prefix("approve_") {
        handle_approval(bot, pool, query, listing_id, true, telegram_id).await?;
    } else if let Some(listing_id) = data.strip_prefix("deny_") {
        handle_approval(bot, pool, query, listing_id, false, telegram_id).await?;
    } else if let Some(listing_id) = data.strip_prefix("mark_sold_") {
        handle_mark_sold(bot, pool, query, listing_id, telegram_id).await?;
    } else if let Some(listing_id) = data.strip_prefix("remove_image_") {
        handle_remove_image(bot, pool, query, listing_id, telegram_id).await?;
    } else if let Some(listing_id) = data.strip_prefix("manage_") {
        handle_manage(bot, pool, query, listing_id, telegram_id).await?;
    } else if let Some(listing_id) = data.strip_prefix("delete_") {
        handle_delete(bot, pool, query, listing_id, telegram_id).await?;
    } else if let Some(listing_id) = data.strip_prefix("edit_") {
        handle_edit(bot, pool, store, query, listing_id, telegram_id).await?;
    } else if let Some(listing_id) = data.strip_prefix("images_") {
        handle_images(bot, pool, store, query, listing_id, telegram_id).await?;
    } else if data == "cancel_edit" {
        store.clear(telegram_id);
        edit_or_send(
            bot,
            query,
            "❌ *Edit Cancelled*\n\nListing editing cancelled. Use /portfolio to manage your listings again.",
            None,
        )
        .await?;
        answer(bot, query, None).await;
    } else if data == "cancel_manage" {
        edit_or_send(
            bot,
            query,
            "❌ *Cancelled*\n\nListing management cancelled. Use /portfolio to view your listings again.",
            None,
        )
        .await?;
        answer(bot, query, None).await;
    } else if data == "main_menu" {
        handle_main_menu(bot, pool, query, telegram_id).await?;
    } else if data == "sell_listing" {
        handle_sell_listing(bot, pool, store, query, telegram_id).await?;
    } else if data == "view_portfolio" {
        handle_view_portfolio(bot, pool, query, telegram_id).await?;
    } else if data == "view_settings" {
        edit_or_send(
            bot,
            query,
            "⚙️ *Settings*\n\nSettings feature coming soon!",
            Some(keyboards::back_to_menu()),
        )
        .await?;
        answer(bot, query, None).await;
    } else if data == "help_menu" {
        edit_or_send(
            bot,
            query,
            "❓ *SubShare Help*\n\n\
             *Available Commands:*\n\
             /start - Initialize your account\n\
             /sell - Create a new listing\n\
             /portfolio - View your listings\n\
             /settings - Manage preferences\n\
             /help - Show this help message",
            Some(keyboards::back_to_menu()),
        )
        .await?;
        answer(bot, query, None).await;
    } else {
        debug!(data, "Unhandled callback data");
        answer(bot, query, None).await;
    }

    Ok(())
}

/// Run a flow event triggered by a button press; the reply replaces the
/// keyboard message.
async fn run_flow_event(
    bot: &Bot,
    store: &dyn SessionStore,
    query: &CallbackQuery,
    telegram_id: i64,
    session: Session,
    event: Event<'_>,
) -> Result<()> {
    match flow::advance(session, event) {
        Action::Continue { session, reply } => {
            store.set(telegram_id, session);
            edit_or_send(bot, query, &reply.text, reply.keyboard).await?;
        }
        Action::Reprompt { reply } => {
            edit_or_send(bot, query, &reply.text, reply.keyboard).await?;
        }
        Action::Reset { reply } => {
            store.clear(telegram_id);
            edit_or_send(bot, query, &reply.text, reply.keyboard).await?;
        }
        // Submit/ApplyEdit/AttachImage are driven by messages, not buttons
        other => {
            debug!(action = ?other, "Unexpected flow action from callback");
        }
    }
    answer(bot, query, None).await;
    Ok(())
}

async fn handle_approval(
    bot: &Bot,
    pool: &DbPool,
    query: &CallbackQuery,
    listing_id: &str,
    approve: bool,
    actor_telegram_id: i64,
) -> Result<()> {
    let outcome = {
        let mut conn = pool.get().context("Failed to get DB connection")?;
        approval::process_decision(&mut conn, listing_id, approve, actor_telegram_id)?
    };

    use approval::DecisionOutcome::*;
    match &outcome {
        Approved(_) | Rejected(_) => {
            edit_or_send(bot, query, &outcome.approver_message(), None).await?;
            answer(
                bot,
                query,
                Some(if approve {
                    "✅ Listing approved and posted to channel!"
                } else {
                    "❌ Listing rejected"
                }),
            )
            .await;
        }
        Unauthorized | NotFound | AlreadyDecided => {
            answer(bot, query, Some(&outcome.approver_message())).await;
        }
    }
    Ok(())
}

/// Load the listing iff the acting user owns it.
fn owned_listing(
    pool: &DbPool,
    listing_id: &str,
    telegram_id: i64,
) -> Result<Option<Listing>> {
    let mut conn = pool.get().context("Failed to get DB connection")?;
    let user = match User::find_by_telegram_id(&mut conn, telegram_id)? {
        Some(u) => u,
        None => return Ok(None),
    };
    Listing::verify_ownership(&mut conn, listing_id, &user.id)
}

async fn handle_manage(
    bot: &Bot,
    pool: &DbPool,
    query: &CallbackQuery,
    listing_id: &str,
    telegram_id: i64,
) -> Result<()> {
    let listing = match owned_listing(pool, listing_id, telegram_id)? {
        Some(l) => l,
        None => {
            answer(
                bot,
                query,
                Some("❌ Listing not found or you do not own this listing."),
            )
            .await;
            return Ok(());
        }
    };

    if listing.status != ListingStatus::Active.as_str() {
        answer(bot, query, Some("❌ Only active listings can be managed.")).await;
        return Ok(());
    }

    let text = format!(
        "🔧 *Manage Listing*\n\n\
         📝 *{}*\n\
         💰 *Price:* ${}\n\
         📊 *Status:* {}\n\n\
         Choose an action:",
        escape_markdown(&listing.title),
        usd(listing.price_cents),
        listing.status,
    );

    edit_or_send(bot, query, &text, Some(keyboards::manage_menu(listing_id))).await?;
    answer(bot, query, None).await;
    Ok(())
}

async fn handle_mark_sold(
    bot: &Bot,
    pool: &DbPool,
    query: &CallbackQuery,
    listing_id: &str,
    telegram_id: i64,
) -> Result<()> {
    let listing = match owned_listing(pool, listing_id, telegram_id)? {
        Some(l) => l,
        None => {
            answer(
                bot,
                query,
                Some("❌ Listing not found or you do not own this listing."),
            )
            .await;
            return Ok(());
        }
    };

    let moved = {
        let mut conn = pool.get().context("Failed to get DB connection")?;
        Listing::transition_status(
            &mut conn,
            listing_id,
            &[ListingStatus::Active],
            ListingStatus::Sold,
        )?
    };

    if !moved {
        answer(bot, query, Some("❌ Only active listings can be sold.")).await;
        return Ok(());
    }

    edit_or_send(
        bot,
        query,
        &format!(
            "💰 *Listing Marked as Sold!*\n\n\
             📝 *{}*\n\n\
             Your listing has been marked as sold and removed from the trading channel.\n\n\
             Use /portfolio to view your updated listings.",
            escape_markdown(&listing.title)
        ),
        None,
    )
    .await?;
    answer(bot, query, Some("✅ Listing marked as sold!")).await;
    Ok(())
}

async fn handle_delete(
    bot: &Bot,
    pool: &DbPool,
    query: &CallbackQuery,
    listing_id: &str,
    telegram_id: i64,
) -> Result<()> {
    let listing = match owned_listing(pool, listing_id, telegram_id)? {
        Some(l) => l,
        None => {
            answer(
                bot,
                query,
                Some("❌ Listing not found or you do not own this listing."),
            )
            .await;
            return Ok(());
        }
    };

    let moved = {
        let mut conn = pool.get().context("Failed to get DB connection")?;
        Listing::transition_status(
            &mut conn,
            listing_id,
            &[ListingStatus::Active],
            ListingStatus::Removed,
        )?
    };

    if !moved {
        answer(bot, query, Some("❌ Only active listings can be deleted.")).await;
        return Ok(());
    }

    edit_or_send(
        bot,
        query,
        &format!(
            "🗑️ *Listing Deleted!*\n\n\
             📝 *{}*\n\n\
             Your listing has been deleted and removed from the trading channel.\n\n\
             Use /portfolio to view your updated listings.",
            escape_markdown(&listing.title)
        ),
        None,
    )
    .await?;
    answer(bot, query, Some("✅ Listing deleted!")).await;
    Ok(())
}

async fn handle_edit(
    bot: &Bot,
    pool: &DbPool,
    store: &dyn SessionStore,
    query: &CallbackQuery,
    listing_id: &str,
    telegram_id: i64,
) -> Result<()> {
    let listing = match owned_listing(pool, listing_id, telegram_id)? {
        Some(l) => l,
        None => {
            answer(
                bot,
                query,
                Some("❌ Listing not found or you do not own this listing."),
            )
            .await;
            return Ok(());
        }
    };

    if listing.status == ListingStatus::Sold.as_str()
        || listing.status == ListingStatus::Removed.as_str()
    {
        answer(bot, query, Some("❌ Cannot edit sold or deleted listings.")).await;
        return Ok(());
    }

    store.set(
        telegram_id,
        Session::new(Step::Editing {
            listing_id: listing_id.to_string(),
        }),
    );

    let text = format!(
        "✏️ *Edit Listing*\n\n\
         📝 *{}*\n\n\
         What would you like to edit?\n\n\
         Send me the new information in this format:\n\
         *Title:* \\[new title]\n\
         *Description:* \\[new description]\n\
         *Price:* \\[new price in USD]\n\n\
         _You can send just the fields you want to change._",
        escape_markdown(&listing.title)
    );

    edit_or_send(bot, query, &text, Some(keyboards::cancel_edit())).await?;
    answer(bot, query, None).await;
    Ok(())
}

async fn handle_images(
    bot: &Bot,
    pool: &DbPool,
    store: &dyn SessionStore,
    query: &CallbackQuery,
    listing_id: &str,
    telegram_id: i64,
) -> Result<()> {
    let listing = match owned_listing(pool, listing_id, telegram_id)? {
        Some(l) => l,
        None => {
            answer(
                bot,
                query,
                Some("❌ Listing not found or you do not own this listing."),
            )
            .await;
            return Ok(());
        }
    };

    let has_image = listing.proof_telegram_file_path.is_some();
    let status_line = if has_image { "✅ Has image" } else { "❌ No image" };

    let text = format!(
        "📷 *Manage Images*\n\n\
         📝 *{}*\n\n\
         Current status: {status_line}\n\n\
         You can:\n\
         • Send a photo to add/update image\n\
         • Use buttons below to manage existing image",
        escape_markdown(&listing.title)
    );

    store.set(
        telegram_id,
        Session::new(Step::ManagingImages {
            listing_id: listing_id.to_string(),
        }),
    );

    edit_or_send(
        bot,
        query,
        &text,
        Some(keyboards::images_menu(listing_id, has_image)),
    )
    .await?;
    answer(bot, query, None).await;
    Ok(())
}

async fn handle_remove_image(
    bot: &Bot,
    pool: &DbPool,
    query: &CallbackQuery,
    listing_id: &str,
    telegram_id: i64,
) -> Result<()> {
    let listing = match owned_listing(pool, listing_id, telegram_id)? {
        Some(l) => l,
        None => {
            answer(
                bot,
                query,
                Some("❌ Listing not found or you do not own this listing."),
            )
            .await;
            return Ok(());
        }
    };

    {
        let mut conn = pool.get().context("Failed to get DB connection")?;
        Listing::set_proof_file(&mut conn, listing_id, None)?;
    }

    edit_or_send(
        bot,
        query,
        &format!(
            "🗑️ *Image Removed!*\n\n\
             📝 *{}*\n\n\
             The image has been removed from your listing.\n\n\
             Use /portfolio to manage your listings again.",
            escape_markdown(&listing.title)
        ),
        None,
    )
    .await?;
    answer(bot, query, Some("✅ Image removed!")).await;
    Ok(())
}

async fn handle_main_menu(
    bot: &Bot,
    pool: &DbPool,
    query: &CallbackQuery,
    telegram_id: i64,
) -> Result<()> {
    let username = {
        let mut conn = pool.get().context("Failed to get DB connection")?;
        User::find_by_telegram_id(&mut conn, telegram_id)?.and_then(|u| u.username)
    };

    let mut text = String::from("🎯 *SubShare Main Menu*\n\n");
    match username {
        Some(username) => {
            text.push_str(&format!("👋 Welcome back, @{}!\n\n", escape_markdown(&username)));
        }
        None => {
            text.push_str("👋 Welcome! You need a username to share subscriptions.\n\n");
        }
    }
    text.push_str("*Choose what you'd like to do:*");

    edit_or_send(bot, query, &text, Some(keyboards::main_menu())).await?;
    answer(bot, query, None).await;
    Ok(())
}

async fn handle_sell_listing(
    bot: &Bot,
    pool: &DbPool,
    store: &dyn SessionStore,
    query: &CallbackQuery,
    telegram_id: i64,
) -> Result<()> {
    let user = {
        let mut conn = pool.get().context("Failed to get DB connection")?;
        User::find_by_telegram_id(&mut conn, telegram_id)?
    };

    if user.and_then(|u| u.username).is_none() {
        edit_or_send(
            bot,
            query,
            "⚠️ *Username Required to Share Subscriptions!*\n\n\
             You need to set a Telegram username before you can share subscriptions.\n\n\
             *Why?* Buyers need to contact you directly!\n\n\
             *Steps to set username:*\n\
             1. Go to Telegram Settings\n\
             2. Tap on \"Username\"\n\
             3. Set your desired username (e.g., @yourname)\n\
             4. Use /start to refresh your profile\n\n\
             Once you've set your username, come back and try sharing again!",
            None,
        )
        .await?;
        answer(bot, query, None).await;
        return Ok(());
    }

    store.set(telegram_id, Session::new(Step::Category));
    let prompt = flow::category_prompt();
    edit_or_send(bot, query, &prompt.text, prompt.keyboard).await?;
    answer(bot, query, None).await;
    Ok(())
}

async fn handle_view_portfolio(
    bot: &Bot,
    pool: &DbPool,
    query: &CallbackQuery,
    telegram_id: i64,
) -> Result<()> {
    let mut conn = pool.get().context("Failed to get DB connection")?;

    let user = match User::find_by_telegram_id(&mut conn, telegram_id)? {
        Some(u) => u,
        None => {
            edit_or_send(
                bot,
                query,
                "Please use /start first to create your account.",
                None,
            )
            .await?;
            answer(bot, query, None).await;
            return Ok(());
        }
    };

    let listings = Listing::find_by_seller(&mut conn, &user.id)?;
    drop(conn);

    let keyboard = crate::bot::commands::portfolio_keyboard(&listings);
    edit_or_send(bot, query, "📊 Your Shared Subscriptions", Some(keyboard)).await?;
    answer(bot, query, None).await;
    Ok(())
}
