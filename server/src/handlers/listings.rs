//! Public listing endpoints.

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;
use tracing::{error, warn};

use crate::db::DbPool;
use crate::models::listing::{
    DeliveryType, Listing, ListingFilter, ListingResponse, NewListing,
};
use crate::models::user::{TelegramProfile, User};
use crate::services::approval;

#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    pub seller_telegram_id: i64,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub price_cents: i32,
    pub delivery_type: String,
    pub proof_file_path: Option<String>,
}

/// `POST /api/listings`
///
/// Create a listing on behalf of a seller identified by Telegram id; the
/// seller row is created on the fly for first-time API clients. The new
/// listing enters the same approval queue as bot-created ones.
#[post("")]
pub async fn create_listing(
    pool: web::Data<DbPool>,
    body: web::Json<CreateListingRequest>,
) -> impl Responder {
    let body = body.into_inner();

    let delivery_type = match DeliveryType::parse(&body.delivery_type) {
        Some(d) => d,
        None => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "delivery_type must be one of: instant, email, link, manual"
            }));
        }
    };

    if body.price_cents <= 0 {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "price_cents must be positive"
        }));
    }

    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(e) => {
            error!("Database connection error: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Database connection failed"
            }));
        }
    };

    let seller = match User::find_or_create(
        &mut conn,
        body.seller_telegram_id,
        TelegramProfile {
            username: body.username.clone(),
            display_name: body.display_name.clone(),
            ..Default::default()
        },
    ) {
        Ok(u) => u,
        Err(e) => {
            error!("Failed to resolve seller: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to create listing"
            }));
        }
    };

    let mut new_listing = NewListing::new(
        seller.id.clone(),
        body.title,
        body.description,
        body.category,
        body.price_cents,
        delivery_type,
    );
    new_listing.proof_telegram_file_path = body.proof_file_path;

    let listing = match Listing::create(&mut conn, new_listing) {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to create listing: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to create listing"
            }));
        }
    };

    // Approval routing is best-effort; the listing is created regardless.
    if let Err(e) = approval::submit_for_approval(&mut conn, &listing, &seller) {
        warn!(listing_id = %listing.id, error = %e, "Failed to queue approval requests");
    }

    let username = seller.username.clone();
    let display_name = seller.display_name.clone();
    HttpResponse::Created().json(ListingResponse::from_listing(listing, username, display_name))
}

#[derive(Debug, Deserialize)]
pub struct ListingQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<i32>,
    pub max_price: Option<i32>,
    pub q: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// `GET /api/listings` — paginated filtered search, defaulting to `active`.
#[get("")]
pub async fn list_listings(
    pool: web::Data<DbPool>,
    query: web::Query<ListingQuery>,
) -> impl Responder {
    let query = query.into_inner();

    let filter = ListingFilter {
        status: query.status,
        category: query.category,
        min_price: query.min_price,
        max_price: query.max_price,
        query: query.q,
        page: query.page.unwrap_or(1),
        limit: query.limit.unwrap_or(20),
    };

    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(e) => {
            error!("Database connection error: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Database connection failed"
            }));
        }
    };

    match Listing::search(&mut conn, &filter) {
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
            error!("Failed to fetch listings: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to fetch listings"
            }))
        }
    }
}

/// `GET /api/listings/{id}` — single listing with sensitive fields stripped.
#[get("/{id}")]
pub async fn get_listing(pool: web::Data<DbPool>, path: web::Path<String>) -> impl Responder {
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

    let listing = match Listing::find_by_id(&mut conn, &listing_id) {
        Ok(Some(l)) => l,
        Ok(None) => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "Listing not found"
            }));
        }
        Err(e) => {
            error!("Failed to fetch listing: {}", e);
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to fetch listing"
            }));
        }
    };

    let seller = match User::find_by_id(&mut conn, &listing.seller_id) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to fetch seller: {}", e);
            None
        }
    };

    let (username, display_name) = seller
        .map(|s| (s.username, s.display_name))
        .unwrap_or((None, None));

    HttpResponse::Ok().json(ListingResponse::from_listing(listing, username, display_name))
}
