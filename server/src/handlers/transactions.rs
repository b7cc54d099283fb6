//! Transaction endpoints: purchase initiation, delivery confirmation,
//! disputes, seller-confirmed sales, and seller contact lookup.

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;
use tracing::error;

use crate::db::DbPool;
use crate::services::payments::StripeClient;
use crate::services::transactions::{
    self, ConfirmOutcome, DisputeOutcome, OfflineSaleOutcome, PurchaseOutcome,
};

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub listing_id: String,
    pub buyer_telegram_id: i64,
}

/// `POST /api/transactions` — create a transaction and checkout session.
#[post("")]
pub async fn create_transaction(
    pool: web::Data<DbPool>,
    stripe: web::Data<StripeClient>,
    body: web::Json<CreateTransactionRequest>,
) -> impl Responder {
    match transactions::initiate_purchase(
        &pool,
        &stripe,
        &body.listing_id,
        body.buyer_telegram_id,
    )
    .await
    {
        Ok(PurchaseOutcome::Created {
            transaction_id,
            checkout_url,
        }) => HttpResponse::Ok().json(serde_json::json!({
            "transaction_id": transaction_id,
            "checkout_url": checkout_url
        })),
        Ok(PurchaseOutcome::ListingNotFound) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Listing not found"
        })),
        Ok(PurchaseOutcome::ListingNotAvailable) => {
            HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Listing is not available"
            }))
        }
        Err(e) => {
            error!("Failed to create transaction: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to create transaction"
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub by_telegram_id: i64,
}

/// `POST /api/transactions/{id}/confirm` — buyer confirms delivery.
#[post("/{id}/confirm")]
pub async fn confirm_delivery(
    pool: web::Data<DbPool>,
    stripe: web::Data<StripeClient>,
    path: web::Path<String>,
    body: web::Json<ConfirmRequest>,
) -> impl Responder {
    let transaction_id = path.into_inner();

    match transactions::confirm_delivery(&pool, &stripe, &transaction_id, body.by_telegram_id)
        .await
    {
        Ok(ConfirmOutcome::Completed) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Transaction completed successfully"
        })),
        Ok(ConfirmOutcome::NotFound) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Transaction not found"
        })),
        Ok(ConfirmOutcome::NotPaid) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Transaction not paid"
        })),
        Err(e) => {
            error!("Failed to confirm delivery: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to confirm delivery"
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DisputeRequest {
    pub opener_telegram_id: i64,
    pub reason: Option<String>,
}

/// `POST /api/transactions/{id}/dispute` — buyer or seller opens a dispute.
#[post("/{id}/dispute")]
pub async fn open_dispute(
    pool: web::Data<DbPool>,
    path: web::Path<String>,
    body: web::Json<DisputeRequest>,
) -> impl Responder {
    let transaction_id = path.into_inner();
    let body = body.into_inner();

    match transactions::open_dispute(&pool, &transaction_id, body.opener_telegram_id, body.reason)
    {
        Ok(DisputeOutcome::Opened(_)) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Dispute opened successfully"
        })),
        Ok(DisputeOutcome::NotFound) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Transaction not found"
        })),
        Ok(DisputeOutcome::NotDisputable) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Only paid transactions can be disputed"
        })),
        Err(e) => {
            error!("Failed to open dispute: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to open dispute"
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SoldRequest {
    pub seller_telegram_id: i64,
}

/// `POST /api/transactions/{id}/sold` — seller-confirmed off-platform sale.
/// `{id}` is the listing id.
#[post("/{id}/sold")]
pub async fn mark_sold(
    pool: web::Data<DbPool>,
    path: web::Path<String>,
    body: web::Json<SoldRequest>,
) -> impl Responder {
    let listing_id = path.into_inner();

    match transactions::mark_listing_sold(&pool, &listing_id, body.seller_telegram_id) {
        Ok(OfflineSaleOutcome::Sold) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Listing marked as sold"
        })),
        Ok(OfflineSaleOutcome::NotFound) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Listing not found"
        })),
        Ok(OfflineSaleOutcome::NotActive) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Only active listings can be marked sold"
        })),
        Err(e) => {
            error!("Failed to mark listing sold: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to mark listing sold"
            }))
        }
    }
}

/// `GET /api/transactions/{id}/contact` — seller contact for an active
/// listing. `{id}` is the listing id, as sent by the bot client.
#[get("/{id}/contact")]
pub async fn contact_info(pool: web::Data<DbPool>, path: web::Path<String>) -> impl Responder {
    let listing_id = path.into_inner();

    match transactions::contact_info(&pool, &listing_id) {
        Ok(Some(info)) => HttpResponse::Ok().json(info),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Listing not found"
        })),
        Err(e) => {
            error!("Failed to fetch contact info: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to fetch contact info"
            }))
        }
    }
}
