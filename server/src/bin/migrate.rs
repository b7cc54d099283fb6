//! Standalone migration runner.
//!
//! Applies any pending embedded migrations to the configured database and
//! exits. The server runs migrations at startup too; this binary exists for
//! operators who want to migrate out-of-band.

use anyhow::{Context, Result};

use subshare_server::db;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    println!("Applying migrations to {database_url}");

    let pool = db::create_pool(&database_url)?;
    db::run_migrations(&pool)?;

    println!("Migrations up to date");
    Ok(())
}
