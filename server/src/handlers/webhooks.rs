//! Inbound webhooks: Telegram updates and Stripe payment events.

use actix_web::{post, web, HttpRequest, HttpResponse, Responder};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::Update;
use tracing::{error, info, warn};

use crate::bot;
use crate::bot::state::SessionStore;
use crate::db::DbPool;
use crate::services::payments::{self, StripeClient, WebhookEvent};
use crate::services::transactions::{self, WebhookApply};

/// `POST /webhooks/telegram` — one Telegram update per request.
#[post("/telegram")]
pub async fn telegram_webhook(
    pool: web::Data<DbPool>,
    bot_client: web::Data<Bot>,
    store: web::Data<dyn SessionStore>,
    body: web::Json<serde_json::Value>,
) -> impl Responder {
    let update: Update = match serde_json::from_value(body.into_inner()) {
        Ok(u) => u,
        Err(e) => {
            warn!(error = %e, "Undecodable Telegram update");
            // acknowledge anyway so Telegram stops redelivering it
            return HttpResponse::Ok().json(serde_json::json!({ "ok": true }));
        }
    };

    bot::handle_update(&bot_client, &pool, store.get_ref(), update).await;

    HttpResponse::Ok().json(serde_json::json!({ "ok": true }))
}

/// `POST /webhooks/stripe` — signature-verified payment events.
///
/// The body must stay raw bytes: the signature covers the exact payload as
/// sent, so parsing before verification would break it.
#[post("/stripe")]
pub async fn stripe_webhook(
    req: HttpRequest,
    body: web::Bytes,
    pool: web::Data<DbPool>,
    stripe: web::Data<StripeClient>,
) -> impl Responder {
    let signature = match req
        .headers()
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
    {
        Some(s) => s,
        None => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Missing Stripe-Signature header"
            }));
        }
    };

    let secret = match std::env::var("STRIPE_WEBHOOK_SECRET") {
        Ok(s) => s,
        Err(_) => {
            error!("STRIPE_WEBHOOK_SECRET not set, rejecting webhook");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Webhook not configured"
            }));
        }
    };

    if let Err(e) = payments::verify_signature(&body, signature, &secret) {
        warn!(error = %e, "Webhook signature verification failed");
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Webhook Error: {e}")
        }));
    }

    let event = match WebhookEvent::parse(&body) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "Undecodable Stripe event");
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Invalid event payload"
            }));
        }
    };

    match process_event(&pool, &stripe, &event).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "received": true })),
        Err(e) => {
            error!(event_id = %event.id, error = %e, "Webhook processing failed");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Webhook processing failed"
            }))
        }
    }
}

async fn process_event(
    pool: &DbPool,
    stripe: &StripeClient,
    event: &WebhookEvent,
) -> anyhow::Result<()> {
    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let transaction_id = match event.metadata("transaction_id") {
                Some(id) => id.to_string(),
                None => {
                    warn!(event_id = %event.id, "No transaction_id in session metadata");
                    return Ok(());
                }
            };

            let outcome =
                transactions::apply_checkout_completed(pool, &event.id, &transaction_id)?;
            log_apply(&event.id, &transaction_id, &outcome);
        }

        "payment_intent.payment_failed" => {
            let payment_intent = match event.object_id() {
                Some(id) => id.to_string(),
                None => return Ok(()),
            };

            // the failed intent only tells us about itself; the session it
            // belonged to carries our transaction id
            let session = stripe
                .find_session_by_payment_intent(&payment_intent)
                .await?;

            let transaction_id = session
                .as_ref()
                .and_then(|s| s.metadata.get("transaction_id").cloned());

            match transaction_id {
                Some(transaction_id) => {
                    let outcome =
                        transactions::apply_payment_failed(pool, &event.id, &transaction_id)?;
                    log_apply(&event.id, &transaction_id, &outcome);
                }
                None => {
                    warn!(
                        event_id = %event.id,
                        payment_intent = %payment_intent,
                        "No owning session found for failed payment"
                    );
                }
            }
        }

        other => {
            info!(event_type = other, "Unhandled event type");
        }
    }

    Ok(())
}

fn log_apply(event_id: &str, transaction_id: &str, outcome: &WebhookApply) {
    match outcome {
        WebhookApply::Applied => {}
        WebhookApply::DuplicateEvent => {
            info!(event_id, transaction_id, "Duplicate event dropped")
        }
        WebhookApply::NotFound => {
            warn!(event_id, transaction_id, "Event references unknown transaction")
        }
        WebhookApply::Ignored => {
            info!(event_id, transaction_id, "Event ignored for current transaction state")
        }
    }
}

/// Register the Telegram session store as shareable app data.
pub fn session_store_data(store: Arc<dyn SessionStore>) -> web::Data<dyn SessionStore> {
    web::Data::from(store)
}
