//! SubShare server: REST API, Telegram webhook, and the notification worker
//! in one process.

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use teloxide::Bot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use subshare_server::bot::state::{MemorySessionStore, SessionStore};
use subshare_server::config::AppConfig;
use subshare_server::db;
use subshare_server::handlers::{admin, health, listings, transactions, webhooks};
use subshare_server::services::notifier::OutboxWorker;
use subshare_server::services::payments::StripeClient;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    let pool = db::create_pool(&config.database_url)?;
    db::run_migrations(&pool)?;

    let bot = Bot::new(config.bot_token.clone());

    let stripe = match StripeClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Stripe not configured; payment operations will fail");
            StripeClient::new(String::new())
        }
    };

    let session_store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let session_store_data = webhooks::session_store_data(session_store);

    // Notification delivery runs independently of request handling.
    let worker = OutboxWorker::new(bot.clone(), pool.clone(), config.outbox_poll_secs);
    tokio::spawn(worker.start());

    let bind_addr = (config.host.clone(), config.port);
    info!(host = %config.host, port = config.port, "Starting SubShare server");

    let pool_data = web::Data::new(pool);
    let bot_data = web::Data::new(bot);
    let stripe_data = web::Data::new(stripe);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(pool_data.clone())
            .app_data(bot_data.clone())
            .app_data(stripe_data.clone())
            .app_data(session_store_data.clone())
            .service(
                web::scope("/api/listings")
                    .service(listings::create_listing)
                    .service(listings::list_listings)
                    .service(listings::get_listing),
            )
            .service(
                web::scope("/api/transactions")
                    .service(transactions::create_transaction)
                    .service(transactions::confirm_delivery)
                    .service(transactions::open_dispute)
                    .service(transactions::mark_sold)
                    .service(transactions::contact_info),
            )
            .service(
                web::scope("/api/admin")
                    .service(admin::pending_listings)
                    .service(admin::verify_listing)
                    .service(admin::open_disputes)
                    .service(admin::resolve_dispute)
                    .service(admin::refund_transaction),
            )
            .service(
                web::scope("/webhooks")
                    .service(webhooks::telegram_webhook)
                    .service(webhooks::stripe_webhook),
            )
            .service(health::health_check)
    })
    .bind(bind_addr)
    .context("Failed to bind HTTP server")?
    .run()
    .await
    .context("HTTP server terminated")?;

    Ok(())
}
