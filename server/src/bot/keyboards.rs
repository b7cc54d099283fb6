//! Inline keyboard builders.
//!
//! One builder per screen; callback data uses the `action_` / `action_<id>`
//! convention that `bot::callbacks` routes on.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

fn btn(text: &str, callback_data: &str) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text.to_string(), callback_data.to_string())
}

/// Category picker, first step of the sell flow.
pub fn category_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            btn("🎬 Streaming Services", "category_streaming"),
            btn("🎵 Music & Audio", "category_music"),
        ],
        vec![
            btn("💑 Dating Apps", "category_dating"),
            btn("📱 Software & Apps", "category_software"),
        ],
        vec![
            btn("🎫 Events & Tickets", "category_events"),
            btn("☁️ Cloud Storage", "category_storage"),
        ],
        vec![
            btn("📚 Education", "category_education"),
            btn("🎮 Gaming", "category_gaming"),
        ],
        vec![btn("❌ Cancel", "cancel_sell")],
    ])
}

/// Price tier picker. Tier callback data carries the price in cents.
pub fn pricing_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![btn("$5/month", "price_500"), btn("$10/month", "price_1000")],
        vec![btn("$25/month", "price_2500"), btn("$50/month", "price_5000")],
        vec![
            btn("$100/month", "price_10000"),
            btn("Custom Price", "price_custom"),
        ],
        vec![
            btn("⬅️ Back", "back_to_category"),
            btn("❌ Cancel", "cancel_sell"),
        ],
    ])
}

pub fn delivery_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            btn("📱 Instant Access", "delivery_instant"),
            btn("📧 Email Delivery", "delivery_email"),
        ],
        vec![
            btn("🔗 Private Link", "delivery_link"),
            btn("👤 Manual Setup", "delivery_manual"),
        ],
        vec![
            btn("⬅️ Back", "back_to_pricing"),
            btn("❌ Cancel", "cancel_sell"),
        ],
    ])
}

pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            btn("💰 Share Subscription", "sell_listing"),
            btn("📊 My Shares", "view_portfolio"),
        ],
        vec![btn("⚙️ Settings", "view_settings"), btn("❓ Help", "help_menu")],
    ])
}

pub fn back_to_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![btn("🏠 Back to Menu", "main_menu")]])
}

/// Per-listing management actions shown from the portfolio.
pub fn manage_menu(listing_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            btn("💰 Mark as Sold", &format!("mark_sold_{listing_id}")),
            btn("✏️ Edit Listing", &format!("edit_{listing_id}")),
        ],
        vec![
            btn("📷 Manage Images", &format!("images_{listing_id}")),
            btn("🗑️ Delete Listing", &format!("delete_{listing_id}")),
        ],
        vec![btn("❌ Cancel", "cancel_manage")],
    ])
}

pub fn images_menu(listing_id: &str, has_image: bool) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if has_image {
        rows.push(vec![btn(
            "🗑️ Remove Image",
            &format!("remove_image_{listing_id}"),
        )]);
    }
    rows.push(vec![btn(
        "⬅️ Back to Management",
        &format!("manage_{listing_id}"),
    )]);
    InlineKeyboardMarkup::new(rows)
}

pub fn cancel_edit() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![btn("❌ Cancel Edit", "cancel_edit")]])
}

/// Approve/deny buttons attached to approval-request notifications.
pub fn approval_keyboard(listing_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        btn("✅ Approve", &format!("approve_{listing_id}")),
        btn("❌ Deny", &format!("deny_{listing_id}")),
    ]])
}
