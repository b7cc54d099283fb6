//! The sell-flow state machine.
//!
//! Steps are a closed sum type and `advance` is a pure transition function
//! from (session, event) to an `Action`; illegal combinations fall through to
//! `Reset`, which is the only unknown-state recovery rule. All side effects
//! (database writes, approval routing, Telegram sends) happen in the caller.
//!
//! Canonical path:
//! category -> pricing -> (custom_price) -> delivery -> details -> submit
//! Side paths: editing an existing listing, managing its images.

use once_cell::sync::Lazy;
use regex::Regex;
use teloxide::types::InlineKeyboardMarkup;

use crate::bot::format::usd;
use crate::bot::keyboards;
use crate::models::listing::DeliveryType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Category,
    Pricing,
    CustomPrice,
    Delivery,
    Details,
    Editing { listing_id: String },
    ManagingImages { listing_id: String },
}

/// Accumulated form data while the seller walks the flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingDraft {
    pub category: Option<String>,
    pub price_cents: Option<i32>,
    pub delivery_type: Option<DeliveryType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub step: Step,
    pub draft: ListingDraft,
}

impl Session {
    pub fn new(step: Step) -> Self {
        Self {
            step,
            draft: ListingDraft::default(),
        }
    }
}

/// A fully collected draft, ready to become a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteDraft {
    pub category: String,
    pub price_cents: i32,
    pub delivery_type: DeliveryType,
    pub title: String,
    pub description: String,
}

/// Fields recovered from a `**Field:** value` edit message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i32>,
}

impl EditFields {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.price_cents.is_none()
    }
}

/// Inputs the machine reacts to.
#[derive(Debug, Clone)]
pub enum Event<'a> {
    CategorySelected(&'a str),
    PriceTierSelected(i32),
    CustomPriceRequested,
    DeliverySelected(&'a str),
    MessageText(&'a str),
    PhotoUploaded(&'a str),
    BackToCategory,
    BackToPricing,
}

/// What to show the user next.
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl Reply {
    fn new(text: impl Into<String>, keyboard: Option<InlineKeyboardMarkup>) -> Self {
        Self {
            text: text.into(),
            keyboard,
        }
    }
}

/// Result of a transition; the caller persists state and performs effects.
#[derive(Debug, Clone)]
pub enum Action {
    /// Store the new session and show the prompt.
    Continue { session: Session, reply: Reply },
    /// Validation failure: keep the current session, re-prompt.
    Reprompt { reply: Reply },
    /// Flow complete: clear state and create the listing.
    Submit { draft: CompleteDraft },
    /// Editing complete: clear state and merge the parsed fields.
    ApplyEdit {
        listing_id: String,
        fields: EditFields,
    },
    /// Image received: clear state and attach it to the listing.
    AttachImage {
        listing_id: String,
        file_id: String,
    },
    /// Unknown state or impossible input: clear state, ask to restart.
    Reset { reply: Reply },
}

/// Parse a user-entered price in dollars into cents.
///
/// `$` and `,` are tolerated; anything non-numeric or non-positive is
/// rejected.
pub fn parse_price(text: &str) -> Option<i32> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    let dollars: f64 = cleaned.parse().ok()?;
    if !dollars.is_finite() || dollars <= 0.0 {
        return None;
    }
    let cents = (dollars * 100.0).round();
    if cents > i32::MAX as f64 {
        return None;
    }
    Some(cents as i32)
}

static EDIT_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)\*\*Title:\*\*\s*(.+)").expect("valid regex"));
static EDIT_DESCRIPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)\*\*Description:\*\*\s*(.+)").expect("valid regex"));
static EDIT_PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)\*\*Price:\*\*\s*(.+)").expect("valid regex"));

/// Parse an edit message with `**Title:** / **Description:** / **Price:**`
/// markers. Returns the subset of fields present; a price marker with an
/// unparseable value is ignored rather than failing the whole message.
pub fn parse_edit_fields(text: &str) -> EditFields {
    let grab = |re: &Regex| {
        re.captures(text)
            .map(|c| c[1].trim().to_string())
            .filter(|s| !s.is_empty())
    };

    EditFields {
        title: grab(&EDIT_TITLE_RE),
        description: grab(&EDIT_DESCRIPTION_RE),
        price_cents: grab(&EDIT_PRICE_RE).and_then(|p| parse_price(&p)),
    }
}

pub fn category_prompt() -> Reply {
    Reply::new(
        "🚀 *Share Your Subscription or Sell Tickets*\n\n\
         Choose the category that best fits what you're sharing:",
        Some(keyboards::category_menu()),
    )
}

fn pricing_prompt(category: &str) -> Reply {
    Reply::new(
        format!(
            "💰 *Choose Your Subscription Price*\n\n\
             Category: {category}\n\n\
             Select a price tier or choose custom:"
        ),
        Some(keyboards::pricing_menu()),
    )
}

fn custom_price_prompt() -> Reply {
    Reply::new(
        "💰 *Enter Custom Price*\n\n\
         Please enter your monthly subscription price in USD:\n\n\
         _Examples: 15, 75, 150_",
        None,
    )
}

fn delivery_prompt(price_cents: i32) -> Reply {
    Reply::new(
        format!(
            "📦 *How will you deliver your subscription?*\n\n\
             Price: ${}/month\n\n\
             Choose delivery method:",
            usd(price_cents)
        ),
        Some(keyboards::delivery_menu()),
    )
}

fn details_prompt(draft: &ListingDraft) -> Reply {
    let category = draft.category.as_deref().unwrap_or("Unknown");
    let price = draft.price_cents.map(usd).unwrap_or_default();
    let delivery = draft
        .delivery_type
        .map(|d| d.as_str())
        .unwrap_or("unknown");

    Reply::new(
        format!(
            "📝 *Final Step: Subscription Details*\n\n\
             Category: {category}\n\
             Price: ${price}/month\n\
             Delivery: {delivery}\n\n\
             Please provide:\n\
             • *Title*: What's your subscription called?\n\
             • *Description*: What do subscribers get?\n\n\
             _Format: Title on first line, description on remaining lines_"
        ),
        None,
    )
}

fn invalid_price_prompt() -> Reply {
    Reply::new(
        "❌ *Invalid price!*\n\n\
         Please enter a valid price in USD (numbers only).\n\
         _Examples: 15, 75, 150_",
        None,
    )
}

fn invalid_details_prompt() -> Reply {
    Reply::new(
        "❌ *Invalid format!*\n\n\
         Please provide both title and description:\n\
         • Title on first line\n\
         • Description on remaining lines\n\n\
         _Example:_\n\
         Crypto Trading Signals Pro\n\
         Daily market analysis and trading signals for major cryptocurrencies...",
        None,
    )
}

fn invalid_edit_prompt() -> Reply {
    Reply::new(
        "❌ *No changes recognized.*\n\n\
         Send the fields you want to change in this format:\n\
         *Title:* \\[new title]\n\
         *Description:* \\[new description]\n\
         *Price:* \\[new price in USD]",
        Some(keyboards::cancel_edit()),
    )
}

fn restart_prompt() -> Reply {
    Reply::new("Something went wrong. Please start over with /sell", None)
}

/// The transition function. Pure: no I/O, no clock, no database.
pub fn advance(session: Session, event: Event<'_>) -> Action {
    let Session { step, mut draft } = session;

    match (step, event) {
        (_, Event::BackToCategory) => Action::Continue {
            session: Session {
                step: Step::Category,
                draft,
            },
            reply: category_prompt(),
        },

        (_, Event::BackToPricing) => {
            let category = draft.category.clone().unwrap_or_else(|| "Unknown".into());
            Action::Continue {
                session: Session {
                    step: Step::Pricing,
                    draft,
                },
                reply: pricing_prompt(&category),
            }
        }

        (Step::Category, Event::CategorySelected(category)) => {
            draft.category = Some(category.to_string());
            let reply = pricing_prompt(category);
            Action::Continue {
                session: Session {
                    step: Step::Pricing,
                    draft,
                },
                reply,
            }
        }

        (Step::Pricing, Event::PriceTierSelected(cents)) if cents > 0 => {
            draft.price_cents = Some(cents);
            let reply = delivery_prompt(cents);
            Action::Continue {
                session: Session {
                    step: Step::Delivery,
                    draft,
                },
                reply,
            }
        }

        (Step::Pricing, Event::CustomPriceRequested) => Action::Continue {
            session: Session {
                step: Step::CustomPrice,
                draft,
            },
            reply: custom_price_prompt(),
        },

        (Step::CustomPrice, Event::MessageText(text)) => match parse_price(text) {
            Some(cents) => {
                draft.price_cents = Some(cents);
                let reply = Reply::new(
                    format!(
                        "✅ *Price set to ${}/month*\n\n\
                         📦 *How will you deliver your subscription?*\n\n\
                         Choose delivery method:",
                        usd(cents)
                    ),
                    Some(keyboards::delivery_menu()),
                );
                Action::Continue {
                    session: Session {
                        step: Step::Delivery,
                        draft,
                    },
                    reply,
                }
            }
            None => Action::Reprompt {
                reply: invalid_price_prompt(),
            },
        },

        (Step::Delivery, Event::DeliverySelected(raw)) => match DeliveryType::parse(raw) {
            Some(delivery) => {
                draft.delivery_type = Some(delivery);
                let reply = details_prompt(&draft);
                Action::Continue {
                    session: Session {
                        step: Step::Details,
                        draft,
                    },
                    reply,
                }
            }
            None => Action::Reprompt {
                reply: Reply::new(
                    "❌ Unknown delivery method. Choose one below:",
                    Some(keyboards::delivery_menu()),
                ),
            },
        },

        (Step::Details, Event::MessageText(text)) => {
            let mut lines = text.lines();
            let title = lines.next().map(str::trim).unwrap_or("");
            let description = lines.collect::<Vec<_>>().join("\n").trim().to_string();

            if title.is_empty() || description.is_empty() {
                return Action::Reprompt {
                    reply: invalid_details_prompt(),
                };
            }

            match (draft.category, draft.price_cents, draft.delivery_type) {
                (Some(category), Some(price_cents), Some(delivery_type)) => Action::Submit {
                    draft: CompleteDraft {
                        category,
                        price_cents,
                        delivery_type,
                        title: title.to_string(),
                        description,
                    },
                },
                // A details message with holes in the draft means the state
                // map got out of sync; recover the only way we know.
                _ => Action::Reset {
                    reply: restart_prompt(),
                },
            }
        }

        (Step::Editing { listing_id }, Event::MessageText(text)) => {
            let fields = parse_edit_fields(text);
            if fields.is_empty() {
                Action::Reprompt {
                    reply: invalid_edit_prompt(),
                }
            } else {
                Action::ApplyEdit { listing_id, fields }
            }
        }

        (Step::ManagingImages { listing_id }, Event::PhotoUploaded(file_id)) => {
            Action::AttachImage {
                listing_id,
                file_id: file_id.to_string(),
            }
        }

        _ => Action::Reset {
            reply: restart_prompt(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(step: Step) -> Session {
        Session::new(step)
    }

    #[test]
    fn price_parsing_accepts_dollars_rejects_garbage() {
        assert_eq!(parse_price("15"), Some(1500));
        assert_eq!(parse_price("9.99"), Some(999));
        assert_eq!(parse_price("$20"), Some(2000));
        assert_eq!(parse_price("1,000"), Some(100_000));
        assert_eq!(parse_price("abc"), None);
        assert_eq!(parse_price("-5"), None);
        assert_eq!(parse_price("0"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn full_flow_with_custom_price_reprompt() {
        // category -> pricing
        let action = advance(session(Step::Category), Event::CategorySelected("streaming"));
        let session1 = match action {
            Action::Continue { session, .. } => session,
            other => panic!("expected Continue, got {other:?}"),
        };
        assert_eq!(session1.step, Step::Pricing);
        assert_eq!(session1.draft.category.as_deref(), Some("streaming"));

        // pricing -> custom price
        let session2 = match advance(session1, Event::CustomPriceRequested) {
            Action::Continue { session, .. } => session,
            other => panic!("expected Continue, got {other:?}"),
        };
        assert_eq!(session2.step, Step::CustomPrice);

        // invalid price re-prompts, state unchanged
        match advance(session2.clone(), Event::MessageText("abc")) {
            Action::Reprompt { reply } => assert!(reply.text.contains("Invalid price")),
            other => panic!("expected Reprompt, got {other:?}"),
        }

        // valid price -> delivery
        let session3 = match advance(session2, Event::MessageText("20")) {
            Action::Continue { session, .. } => session,
            other => panic!("expected Continue, got {other:?}"),
        };
        assert_eq!(session3.step, Step::Delivery);
        assert_eq!(session3.draft.price_cents, Some(2000));

        // delivery -> details
        let session4 = match advance(session3, Event::DeliverySelected("instant")) {
            Action::Continue { session, .. } => session,
            other => panic!("expected Continue, got {other:?}"),
        };
        assert_eq!(session4.step, Step::Details);

        // details -> submit with the accumulated draft
        match advance(session4, Event::MessageText("Title\nDesc")) {
            Action::Submit { draft } => {
                assert_eq!(draft.category, "streaming");
                assert_eq!(draft.price_cents, 2000);
                assert_eq!(draft.delivery_type, DeliveryType::Instant);
                assert_eq!(draft.title, "Title");
                assert_eq!(draft.description, "Desc");
            }
            other => panic!("expected Submit, got {other:?}"),
        }
    }

    #[test]
    fn single_line_details_reprompts() {
        let mut s = session(Step::Details);
        s.draft = ListingDraft {
            category: Some("gaming".into()),
            price_cents: Some(500),
            delivery_type: Some(DeliveryType::Link),
        };
        match advance(s, Event::MessageText("just a title")) {
            Action::Reprompt { reply } => assert!(reply.text.contains("Invalid format")),
            other => panic!("expected Reprompt, got {other:?}"),
        }
    }

    #[test]
    fn back_navigation_keeps_the_draft() {
        let mut s = session(Step::Delivery);
        s.draft.category = Some("music".into());
        s.draft.price_cents = Some(1000);

        match advance(s, Event::BackToPricing) {
            Action::Continue { session, reply } => {
                assert_eq!(session.step, Step::Pricing);
                assert_eq!(session.draft.category.as_deref(), Some("music"));
                assert!(reply.text.contains("music"));
            }
            other => panic!("expected Continue, got {other:?}"),
        }
    }

    #[test]
    fn edit_message_parses_partial_fields() {
        let fields = parse_edit_fields("**Title:** New name\n**Price:** 12.50");
        assert_eq!(fields.title.as_deref(), Some("New name"));
        assert_eq!(fields.price_cents, Some(1250));
        assert!(fields.description.is_none());

        let none = parse_edit_fields("hello there");
        assert!(none.is_empty());

        // price marker with garbage value is ignored, title still applies
        let partial = parse_edit_fields("**Title:** Kept\n**Price:** lots");
        assert_eq!(partial.title.as_deref(), Some("Kept"));
        assert!(partial.price_cents.is_none());
    }

    #[test]
    fn editing_step_routes_text_to_apply_edit() {
        let s = session(Step::Editing {
            listing_id: "L1".into(),
        });
        match advance(s, Event::MessageText("**Description:** better words")) {
            Action::ApplyEdit { listing_id, fields } => {
                assert_eq!(listing_id, "L1");
                assert_eq!(fields.description.as_deref(), Some("better words"));
            }
            other => panic!("expected ApplyEdit, got {other:?}"),
        }
    }

    #[test]
    fn unknown_combination_resets() {
        // a photo in the middle of the pricing step makes no sense
        match advance(session(Step::Pricing), Event::PhotoUploaded("f1")) {
            Action::Reset { reply } => assert!(reply.text.contains("/sell")),
            other => panic!("expected Reset, got {other:?}"),
        }
    }

    #[test]
    fn photo_during_image_management_attaches() {
        let s = session(Step::ManagingImages {
            listing_id: "L9".into(),
        });
        match advance(s, Event::PhotoUploaded("file-abc")) {
            Action::AttachImage {
                listing_id,
                file_id,
            } => {
                assert_eq!(listing_id, "L9");
                assert_eq!(file_id, "file-abc");
            }
            other => panic!("expected AttachImage, got {other:?}"),
        }
    }
}
