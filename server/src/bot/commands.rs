//! Slash-command handlers and form-flow message handling.

use anyhow::{Context, Result};
use teloxide::prelude::*;
use teloxide::types::{Message, ParseMode};
use tracing::{info, warn};

use crate::bot::flow::{self, Action, Event, Reply, Session, Step};
use crate::bot::format::{escape_markdown, status_emoji, usd};
use crate::bot::keyboards;
use crate::bot::state::SessionStore;
use crate::db::DbPool;
use crate::models::listing::{Listing, ListingChanges, NewListing};
use crate::models::transaction::Transaction;
use crate::models::user::{TelegramProfile, User};
use crate::services::approval;

pub fn profile_from(user: &teloxide::types::User) -> TelegramProfile {
    let display_name = match &user.last_name {
        Some(last) => format!("{} {}", user.first_name, last),
        None => user.first_name.clone(),
    };
    TelegramProfile {
        username: user.username.clone(),
        display_name: Some(display_name),
        first_name: Some(user.first_name.clone()),
        last_name: user.last_name.clone(),
    }
}

async fn reply_md(bot: &Bot, msg: &Message, text: &str) -> Result<()> {
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Markdown)
        .await
        .context("Failed to send reply")?;
    Ok(())
}

async fn send_flow_reply(bot: &Bot, msg: &Message, reply: &Reply) -> Result<()> {
    let mut request = bot
        .send_message(msg.chat.id, reply.text.clone())
        .parse_mode(ParseMode::Markdown);
    if let Some(keyboard) = &reply.keyboard {
        request = request.reply_markup(keyboard.clone());
    }
    request.await.context("Failed to send flow reply")?;
    Ok(())
}

/// Route a `/command` message.
pub async fn handle_command(
    bot: &Bot,
    pool: &DbPool,
    store: &dyn SessionStore,
    msg: &Message,
    text: &str,
) -> Result<()> {
    let command = text
        .split_whitespace()
        .next()
        .unwrap_or("")
        .split('@')
        .next()
        .unwrap_or("");

    match command {
        "/start" => start(bot, pool, msg).await,
        "/sell" => sell(bot, pool, store, msg).await,
        "/listings" => listings(bot, pool, msg).await,
        "/portfolio" => portfolio(bot, pool, msg).await,
        "/settings" => settings(bot, pool, msg).await,
        "/help" => help(bot, msg).await,
        "/cancel" => cancel(bot, store, msg).await,
        _ => default_reply(bot, msg).await,
    }
}

async fn start(bot: &Bot, pool: &DbPool, msg: &Message) -> Result<()> {
    let from = msg.from().context("Message without sender")?;
    let profile = profile_from(from);
    let greeting_name = profile
        .display_name
        .clone()
        .or_else(|| profile.username.clone())
        .unwrap_or_else(|| "trader".to_string());

    let mut conn = pool.get().context("Failed to get DB connection")?;
    User::find_or_create(&mut conn, from.id.0 as i64, profile)?;

    reply_md(
        bot,
        msg,
        &format!(
            "🎉 Welcome to SubShare, {}!\n\n\
             I'm your personal trading assistant. Here's what you can do:\n\n\
             📈 /listings - Browse available trading opportunities\n\
             💰 /sell - List your own trading opportunity\n\
             📊 /portfolio - View your trading history\n\
             ⚙️ /settings - Manage your preferences\n\n\
             Ready to start trading? Use /listings to see what's available!",
            escape_markdown(&greeting_name)
        ),
    )
    .await
}

/// Start the sell flow. Requires a Telegram username so buyers can make
/// contact; without one the flow aborts with setup instructions.
pub async fn sell(bot: &Bot, pool: &DbPool, store: &dyn SessionStore, msg: &Message) -> Result<()> {
    let from = msg.from().context("Message without sender")?;
    let telegram_id = from.id.0 as i64;

    let mut conn = pool.get().context("Failed to get DB connection")?;
    let user = User::find_or_create(&mut conn, telegram_id, profile_from(from))?;

    if user.username.is_none() {
        return reply_md(
            bot,
            msg,
            "⚠️ *Username Required to Share Subscriptions!*\n\n\
             You need to set a Telegram username before you can share subscriptions.\n\n\
             *Why?* Buyers need to contact you directly!\n\n\
             *Steps to set username:*\n\
             1. Go to Telegram Settings\n\
             2. Tap on \"Username\"\n\
             3. Set your desired username (e.g., @yourname)\n\
             4. Use /start to refresh your profile\n\n\
             Once you've set your username, come back and try sharing again!",
        )
        .await;
    }

    store.set(telegram_id, Session::new(Step::Category));
    send_flow_reply(bot, msg, &flow::category_prompt()).await
}

async fn listings(bot: &Bot, pool: &DbPool, msg: &Message) -> Result<()> {
    let mut conn = pool.get().context("Failed to get DB connection")?;
    let active = Listing::active_latest(&mut conn, 10)?;

    if active.is_empty() {
        return reply_md(
            bot,
            msg,
            "📭 No active listings available at the moment. Check back later!",
        )
        .await;
    }

    let mut text = String::from("📋 *Active Trading Opportunities:*\n\n");
    for listing in &active {
        let seller = User::find_by_id(&mut conn, &listing.seller_id)?;
        let seller_label = seller
            .as_ref()
            .map(|s| s.label().to_string())
            .unwrap_or_else(|| "Anonymous".to_string());

        text.push_str(&format!(
            "🔸 *{}*\n💰 Price: ${} {}\n📦 Type: {}\n👤 Seller: {}\n\n",
            escape_markdown(&listing.title),
            usd(listing.price_cents),
            listing.currency.to_uppercase(),
            escape_markdown(&listing.delivery_type),
            escape_markdown(&seller_label),
        ));
    }

    reply_md(bot, msg, &text).await
}

async fn portfolio(bot: &Bot, pool: &DbPool, msg: &Message) -> Result<()> {
    let from = msg.from().context("Message without sender")?;
    let mut conn = pool.get().context("Failed to get DB connection")?;

    let user = match User::find_by_telegram_id(&mut conn, from.id.0 as i64)? {
        Some(u) => u,
        None => {
            return reply_md(bot, msg, "Please use /start first to create your account.").await;
        }
    };

    let listings = Listing::find_by_seller(&mut conn, &user.id)?;
    let purchases = Transaction::find_by_buyer(&mut conn, &user.id)?;

    if listings.is_empty() && purchases.is_empty() {
        let keyboard = teloxide::types::InlineKeyboardMarkup::new(vec![
            vec![teloxide::types::InlineKeyboardButton::callback(
                "💰 Share Subscription".to_string(),
                "sell_listing".to_string(),
            )],
            vec![teloxide::types::InlineKeyboardButton::callback(
                "🏠 Back to Menu".to_string(),
                "main_menu".to_string(),
            )],
        ]);
        bot.send_message(msg.chat.id, "📊 Your Shared Subscriptions")
            .reply_markup(keyboard)
            .await
            .context("Failed to send portfolio")?;
        return Ok(());
    }

    let keyboard = portfolio_keyboard(&listings);
    let mut text = String::from("📊 *Your Portfolio*\n\n");

    text.push_str(&format!("📝 *Your Listings ({}):*\n", listings.len()));
    if listings.is_empty() {
        text.push_str("No listings created yet. Use /sell to create your first one!\n");
    } else {
        text.push_str("Tap a listing below to manage it.\n");
    }

    text.push_str(&format!("\n🛒 *Your Purchases ({}):*\n", purchases.len()));
    if purchases.is_empty() {
        text.push_str("No purchases yet. Use /listings to find opportunities!\n");
    } else {
        for tx in purchases.iter().take(3) {
            let title = tx
                .listing_id
                .as_deref()
                .and_then(|id| Listing::find_by_id(&mut conn, id).ok().flatten())
                .map(|l| l.title)
                .unwrap_or_else(|| "(removed listing)".to_string());
            text.push_str(&format!(
                "🔸 *{}* - ${}\n   Status: {}\n",
                escape_markdown(&title),
                usd(tx.amount_cents),
                tx.status,
            ));
        }
    }

    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Markdown)
        .reply_markup(keyboard)
        .await
        .context("Failed to send portfolio")?;
    Ok(())
}

/// One manage button per listing, plus the share shortcut.
pub fn portfolio_keyboard(listings: &[Listing]) -> teloxide::types::InlineKeyboardMarkup {
    use teloxide::types::InlineKeyboardButton;

    let mut rows: Vec<Vec<InlineKeyboardButton>> = listings
        .iter()
        .map(|listing| {
            vec![InlineKeyboardButton::callback(
                format!(
                    "{} {} - ${}",
                    status_emoji(&listing.status),
                    listing.title,
                    usd(listing.price_cents)
                ),
                format!("manage_{}", listing.id),
            )]
        })
        .collect();

    rows.push(vec![InlineKeyboardButton::callback(
        "💰 Share New Subscription".to_string(),
        "sell_listing".to_string(),
    )]);

    teloxide::types::InlineKeyboardMarkup::new(rows)
}

async fn settings(bot: &Bot, pool: &DbPool, msg: &Message) -> Result<()> {
    let from = msg.from().context("Message without sender")?;
    let mut conn = pool.get().context("Failed to get DB connection")?;

    let user = match User::find_by_telegram_id(&mut conn, from.id.0 as i64)? {
        Some(u) => u,
        None => {
            return reply_md(bot, msg, "Please use /start first to create your account.").await;
        }
    };

    reply_md(
        bot,
        msg,
        &format!(
            "⚙️ *Your Settings*\n\n\
             👤 *Profile:*\n\
             Name: {}\n\
             Username: {}\n\
             Telegram ID: {}\n\n\
             📊 *Account Status:*\n\
             KYC Status: {}\n\
             Rating: {}/5 ⭐\n\n\
             _Settings management coming soon! For now, your basic profile is set up and ready to trade._",
            escape_markdown(user.display_name.as_deref().unwrap_or("Not set")),
            escape_markdown(user.username.as_deref().unwrap_or("Not set")),
            user.telegram_id,
            escape_markdown(&user.kyc_status),
            user.rating,
        ),
    )
    .await
}

async fn help(bot: &Bot, msg: &Message) -> Result<()> {
    bot.send_message(
        msg.chat.id,
        "❓ *SubShare Help*\n\n\
         *Available Commands:*\n\
         /start - Initialize your account\n\
         /sell - Create a new listing\n\
         /listings - Browse active listings\n\
         /portfolio - View your listings\n\
         /settings - Manage preferences\n\
         /help - Show this help message\n\n\
         *How to Use:*\n\
         1. Set your Telegram username first\n\
         2. Create listings with /sell\n\
         3. Browse others' listings on our trading channel\n\
         4. Manage your listings with /portfolio\n\n\
         *Need Help?* Contact support if you have questions!",
    )
    .parse_mode(ParseMode::Markdown)
    .reply_markup(keyboards::back_to_menu())
    .await
    .context("Failed to send help")?;
    Ok(())
}

async fn cancel(bot: &Bot, store: &dyn SessionStore, msg: &Message) -> Result<()> {
    let from = msg.from().context("Message without sender")?;
    store.clear(from.id.0 as i64);

    reply_md(
        bot,
        msg,
        "❌ *Cancelled*\n\n\
         Listing creation has been cancelled. Use /sell to start again or /help for other commands.",
    )
    .await
}

async fn default_reply(bot: &Bot, msg: &Message) -> Result<()> {
    bot.send_message(
        msg.chat.id,
        "Hi! I'm the SubShare trading bot. Use /start to begin or /help for available commands.",
    )
    .await
    .context("Failed to send default reply")?;
    Ok(())
}

/// Handle a plain message: feed it to the form flow when the user has a
/// session, otherwise nudge them toward the commands.
pub async fn handle_message(
    bot: &Bot,
    pool: &DbPool,
    store: &dyn SessionStore,
    msg: &Message,
) -> Result<()> {
    let from = msg.from().context("Message without sender")?;
    let telegram_id = from.id.0 as i64;

    let session = match store.get(telegram_id) {
        Some(s) => s,
        None => {
            // only text gets the nudge; stray media outside a flow is ignored
            if msg.text().is_some() {
                return default_reply(bot, msg).await;
            }
            return Ok(());
        }
    };

    let action = if let Some(text) = msg.text() {
        flow::advance(session, Event::MessageText(text))
    } else if let Some(photos) = msg.photo() {
        // highest-resolution rendition is last
        match photos.last() {
            Some(photo) => flow::advance(session, Event::PhotoUploaded(&photo.file.id)),
            None => return Ok(()),
        }
    } else {
        return Ok(());
    };

    execute_action(bot, pool, store, msg, telegram_id, action).await
}

async fn execute_action(
    bot: &Bot,
    pool: &DbPool,
    store: &dyn SessionStore,
    msg: &Message,
    telegram_id: i64,
    action: Action,
) -> Result<()> {
    match action {
        Action::Continue { session, reply } => {
            store.set(telegram_id, session);
            send_flow_reply(bot, msg, &reply).await
        }

        Action::Reprompt { reply } => send_flow_reply(bot, msg, &reply).await,

        Action::Reset { reply } => {
            store.clear(telegram_id);
            send_flow_reply(bot, msg, &reply).await
        }

        Action::Submit { draft } => {
            store.clear(telegram_id);

            let mut conn = pool.get().context("Failed to get DB connection")?;
            let user = match User::find_by_telegram_id(&mut conn, telegram_id)? {
                Some(u) => u,
                None => {
                    return reply_md(bot, msg, "Please use /start first to create your account.")
                        .await;
                }
            };

            if user.username.is_none() {
                return reply_md(
                    bot,
                    msg,
                    "❌ *Username Required!*\n\n\
                     To complete your listing, you need to set a Telegram username first.\n\n\
                     Once you've set your username, use /sell to create your listing again!",
                )
                .await;
            }

            let listing = match Listing::create(
                &mut conn,
                NewListing::new(
                    user.id.clone(),
                    draft.title.clone(),
                    draft.description.clone(),
                    draft.category.clone(),
                    draft.price_cents,
                    draft.delivery_type,
                ),
            ) {
                Ok(l) => l,
                Err(e) => {
                    warn!(error = %e, "Failed to create listing from flow");
                    return reply_md(
                        bot,
                        msg,
                        "❌ *Error creating listing!*\n\n\
                         There was an error saving your listing. Please try again later or contact support.",
                    )
                    .await;
                }
            };

            if let Err(e) = approval::submit_for_approval(&mut conn, &listing, &user) {
                warn!(listing_id = %listing.id, error = %e, "Failed to queue approval requests");
            }

            info!(listing_id = %listing.id, seller = %user.id, "Listing created via bot flow");

            reply_md(
                bot,
                msg,
                &format!(
                    "🎉 *Listing Created Successfully!*\n\n\
                     📝 *Title:* {}\n\
                     💰 *Price:* ${}\n\
                     📦 *Delivery:* {}\n\
                     📊 *Status:* Awaiting Admin Approval\n\n\
                     Your listing has been submitted and is awaiting admin approval before being posted to our trading channel.\n\n\
                     You'll be notified once it's approved or if any changes are needed.\n\n\
                     Use /portfolio to view your listings or /listings to see other opportunities!",
                    escape_markdown(&draft.title),
                    usd(draft.price_cents),
                    draft.delivery_type.as_str(),
                ),
            )
            .await
        }

        Action::ApplyEdit { listing_id, fields } => {
            store.clear(telegram_id);

            let mut conn = pool.get().context("Failed to get DB connection")?;
            let user = match User::find_by_telegram_id(&mut conn, telegram_id)? {
                Some(u) => u,
                None => return Ok(()),
            };

            let listing = match Listing::verify_ownership(&mut conn, &listing_id, &user.id)? {
                Some(l) => l,
                None => {
                    return reply_md(
                        bot,
                        msg,
                        "❌ Listing not found or you do not own this listing.",
                    )
                    .await;
                }
            };

            Listing::update_fields(
                &mut conn,
                &listing.id,
                ListingChanges {
                    title: fields.title.clone(),
                    description: fields.description.clone(),
                    price_cents: fields.price_cents,
                },
            )?;

            let mut summary = String::new();
            if let Some(title) = &fields.title {
                summary.push_str(&format!("• Title: {}\n", escape_markdown(title)));
            }
            if fields.description.is_some() {
                summary.push_str("• Description updated\n");
            }
            if let Some(price) = fields.price_cents {
                summary.push_str(&format!("• Price: ${}\n", usd(price)));
            }

            reply_md(
                bot,
                msg,
                &format!(
                    "✅ *Listing Updated!*\n\n{summary}\nUse /portfolio to manage your listings."
                ),
            )
            .await
        }

        Action::AttachImage {
            listing_id,
            file_id,
        } => {
            store.clear(telegram_id);

            let mut conn = pool.get().context("Failed to get DB connection")?;
            let user = match User::find_by_telegram_id(&mut conn, telegram_id)? {
                Some(u) => u,
                None => return Ok(()),
            };

            let listing = match Listing::verify_ownership(&mut conn, &listing_id, &user.id)? {
                Some(l) => l,
                None => {
                    return reply_md(
                        bot,
                        msg,
                        "❌ Listing not found or you do not own this listing.",
                    )
                    .await;
                }
            };

            // Resolve the stable file path; fall back to the raw file id as
            // an opaque reference when the lookup fails.
            let file_ref = match bot.get_file(file_id.clone()).await {
                Ok(file) => file.path,
                Err(e) => {
                    warn!(error = %e, "getFile failed, storing file id instead");
                    file_id.clone()
                }
            };

            Listing::set_proof_file(&mut conn, &listing.id, Some(&file_ref))?;

            reply_md(
                bot,
                msg,
                &format!(
                    "📷 *Image Updated!*\n\n📝 *{}*\n\nYour listing image has been saved.\n\nUse /portfolio to manage your listings.",
                    escape_markdown(&listing.title)
                ),
            )
            .await
        }
    }
}
