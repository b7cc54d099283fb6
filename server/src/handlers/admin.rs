//! Admin endpoints: approval queue, dispute resolution, refunds.
//!
//! This surface carries no approver check of its own; it is expected to be
//! deployed behind network isolation. The bot-side approval path is the one
//! that enforces the approver list.

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;
use tracing::error;

use crate::db::DbPool;
use crate::models::dispute::Dispute;
use crate::models::listing::{Listing, ListingResponse};
use crate::models::transaction::Transaction;
use crate::services::approval::{self, DecisionOutcome};
use crate::services::payments::StripeClient;
use crate::services::transactions::{self, RefundOutcome, ResolveOutcome};

/// `GET /api/admin/listings/pending` — the approval queue.
#[get("/listings/pending")]
pub async fn pending_listings(pool: web::Data<DbPool>) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(e) => {
            error!("Database connection error: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Database connection failed"
            }));
        }
    };

    match Listing::pending_with_sellers(&mut conn) {
        Ok(rows) => {
            let listings: Vec<ListingResponse> = rows
                .into_iter()
                .map(|(listing, username, display_name)| {
                    ListingResponse::from_listing(listing, username, display_name)
                })
                .collect();
            HttpResponse::Ok().json(listings)
        }
        Err(e) => {
            error!("Failed to fetch pending listings: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to fetch pending listings"
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub approved: bool,
}

/// `POST /api/admin/listings/{id}/verify` — approve or reject a pending
/// listing. Shares the decision path with the bot buttons.
#[post("/listings/{id}/verify")]
pub async fn verify_listing(
    pool: web::Data<DbPool>,
    path: web::Path<String>,
    body: web::Json<VerifyRequest>,
) -> impl Responder {
    let listing_id = path.into_inner();

    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(e) => {
            error!("Database connection error: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Database connection failed"
            }));
        }
    };

    match approval::apply_verdict(&mut conn, &listing_id, body.approved) {
        Ok(DecisionOutcome::Approved(_)) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Listing approved"
        })),
        Ok(DecisionOutcome::Rejected(_)) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Listing rejected"
        })),
        Ok(DecisionOutcome::NotFound) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Listing not found"
        })),
        Ok(DecisionOutcome::AlreadyDecided) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Listing has already been decided"
        })),
        Ok(DecisionOutcome::Unauthorized) => HttpResponse::Forbidden().json(serde_json::json!({
            "error": "Unauthorized"
        })),
        Err(e) => {
            error!("Failed to verify listing: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to verify listing"
            }))
        }
    }
}

/// `GET /api/admin/disputes` — open disputes with transaction context.
#[get("/disputes")]
pub async fn open_disputes(pool: web::Data<DbPool>) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(e) => {
            error!("Database connection error: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Database connection failed"
            }));
        }
    };

    let disputes = match Dispute::list_open(&mut conn) {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to fetch disputes: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to fetch disputes"
            }));
        }
    };

    let mut enriched = Vec::with_capacity(disputes.len());
    for dispute in disputes {
        let transaction = Transaction::find_by_id(&mut conn, &dispute.transaction_id)
            .ok()
            .flatten();
        let listing_title = transaction
            .as_ref()
            .and_then(|t| t.listing_id.as_deref())
            .and_then(|id| Listing::find_by_id(&mut conn, id).ok().flatten())
            .map(|l| l.title);

        enriched.push(serde_json::json!({
            "id": dispute.id,
            "transaction_id": dispute.transaction_id,
            "opener_id": dispute.opener_id,
            "status": dispute.status,
            "resolution": dispute.resolution,
            "created_at": dispute.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "listing_id": transaction.as_ref().and_then(|t| t.listing_id.clone()),
            "listing_title": listing_title,
            "amount_cents": transaction.as_ref().map(|t| t.amount_cents),
        }));
    }

    HttpResponse::Ok().json(enriched)
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolution: String,
    pub refund_buyer: bool,
}

/// `POST /api/admin/disputes/{id}/resolve`
#[post("/disputes/{id}/resolve")]
pub async fn resolve_dispute(
    pool: web::Data<DbPool>,
    path: web::Path<String>,
    body: web::Json<ResolveRequest>,
) -> impl Responder {
    let dispute_id = path.into_inner();

    match transactions::resolve_dispute(&pool, &dispute_id, &body.resolution, body.refund_buyer) {
        Ok(ResolveOutcome::Resolved) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Dispute resolved successfully"
        })),
        Ok(ResolveOutcome::NotFound) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Dispute not found"
        })),
        Ok(ResolveOutcome::AlreadyClosed) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Dispute is already closed"
        })),
        Err(e) => {
            error!("Failed to resolve dispute: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to resolve dispute"
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub reason: String,
}

/// `POST /api/admin/transactions/{id}/refund`
#[post("/transactions/{id}/refund")]
pub async fn refund_transaction(
    pool: web::Data<DbPool>,
    stripe: web::Data<StripeClient>,
    path: web::Path<String>,
    body: web::Json<RefundRequest>,
) -> impl Responder {
    let transaction_id = path.into_inner();

    match transactions::refund(&pool, &stripe, &transaction_id, &body.reason).await {
        Ok(RefundOutcome::Refunded) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Refund processed successfully"
        })),
        Ok(RefundOutcome::NotFound) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Transaction not found"
        })),
        Ok(RefundOutcome::NotRefundable) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Transaction cannot be refunded"
        })),
        Err(e) => {
            error!("Failed to process refund: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to process refund"
            }))
        }
    }
}
