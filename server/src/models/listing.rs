//! Listing model and lifecycle.
//!
//! Statuses move only forward along `pending_approval -> {active, rejected}`
//! and `active -> {sold, removed}`. Every transition is a single conditional
//! UPDATE so concurrent callers cannot race a check-then-write sequence; the
//! affected-row count tells the caller whether the transition was legal.

use anyhow::Result;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::listings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    PendingApproval,
    Active,
    Sold,
    Removed,
    Rejected,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::PendingApproval => "pending_approval",
            ListingStatus::Active => "active",
            ListingStatus::Sold => "sold",
            ListingStatus::Removed => "removed",
            ListingStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_approval" => Some(ListingStatus::PendingApproval),
            "active" => Some(ListingStatus::Active),
            "sold" => Some(ListingStatus::Sold),
            "removed" => Some(ListingStatus::Removed),
            "rejected" => Some(ListingStatus::Rejected),
            _ => None,
        }
    }
}

/// Canonical delivery vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Instant,
    Email,
    Link,
    Manual,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryType::Instant => "instant",
            DeliveryType::Email => "email",
            DeliveryType::Link => "link",
            DeliveryType::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "instant" => Some(DeliveryType::Instant),
            "email" => Some(DeliveryType::Email),
            "link" => Some(DeliveryType::Link),
            "manual" => Some(DeliveryType::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = listings)]
pub struct Listing {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price_cents: i32,
    pub currency: String,
    pub delivery_type: String,
    pub proof_telegram_file_path: Option<String>,
    pub code_encrypted: Option<Vec<u8>>,
    pub valid_from: Option<NaiveDateTime>,
    pub valid_until: Option<NaiveDateTime>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = listings)]
pub struct NewListing {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price_cents: i32,
    pub currency: String,
    pub delivery_type: String,
    pub proof_telegram_file_path: Option<String>,
    pub valid_until: Option<NaiveDateTime>,
    pub status: String,
}

impl NewListing {
    pub fn new(
        seller_id: String,
        title: String,
        description: String,
        category: String,
        price_cents: i32,
        delivery_type: DeliveryType,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            seller_id,
            title,
            description,
            category,
            price_cents,
            currency: "usd".to_string(),
            delivery_type: delivery_type.as_str().to_string(),
            proof_telegram_file_path: None,
            valid_until: None,
            status: ListingStatus::PendingApproval.as_str().to_string(),
        }
    }
}

/// Partial field update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = listings)]
pub struct ListingChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i32>,
}

/// Search filters for the public listing index.
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub status: Option<String>,
    pub category: Option<String>,
    /// Whole dollars, inclusive.
    pub min_price: Option<i32>,
    pub max_price: Option<i32>,
    pub query: Option<String>,
    pub page: i64,
    pub limit: i64,
}

/// API shape for a listing; the encrypted code blob never leaves the server.
#[derive(Debug, Clone, Serialize)]
pub struct ListingResponse {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price_cents: i32,
    pub currency: String,
    pub delivery_type: String,
    pub proof_telegram_file_path: Option<String>,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

impl ListingResponse {
    pub fn from_listing(
        listing: Listing,
        username: Option<String>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            id: listing.id,
            seller_id: listing.seller_id,
            title: listing.title,
            description: listing.description,
            category: listing.category,
            price_cents: listing.price_cents,
            currency: listing.currency,
            delivery_type: listing.delivery_type,
            proof_telegram_file_path: listing.proof_telegram_file_path,
            valid_from: listing.valid_from.map(fmt_ts),
            valid_until: listing.valid_until.map(fmt_ts),
            status: listing.status,
            created_at: fmt_ts(listing.created_at),
            updated_at: fmt_ts(listing.updated_at),
            username,
            display_name,
        }
    }
}

impl Listing {
    pub fn create(conn: &mut SqliteConnection, new_listing: NewListing) -> Result<Listing> {
        use crate::schema::listings::dsl;

        diesel::insert_into(dsl::listings)
            .values(&new_listing)
            .execute(conn)?;

        let listing = dsl::listings.find(&new_listing.id).first::<Listing>(conn)?;
        Ok(listing)
    }

    pub fn find_by_id(conn: &mut SqliteConnection, listing_id: &str) -> Result<Option<Listing>> {
        use crate::schema::listings::dsl;

        let listing = dsl::listings
            .find(listing_id)
            .first::<Listing>(conn)
            .optional()?;
        Ok(listing)
    }

    pub fn find_by_seller(conn: &mut SqliteConnection, seller_id: &str) -> Result<Vec<Listing>> {
        use crate::schema::listings::dsl;

        let results = dsl::listings
            .filter(dsl::seller_id.eq(seller_id))
            .order(dsl::created_at.desc())
            .load::<Listing>(conn)?;
        Ok(results)
    }

    /// Return the listing only when it is owned by the given seller.
    ///
    /// A listing that does not exist and a listing owned by someone else
    /// both come back as `None`; callers must not distinguish the two.
    pub fn verify_ownership(
        conn: &mut SqliteConnection,
        listing_id: &str,
        seller_id: &str,
    ) -> Result<Option<Listing>> {
        use crate::schema::listings::dsl;

        let listing = dsl::listings
            .filter(dsl::id.eq(listing_id))
            .filter(dsl::seller_id.eq(seller_id))
            .first::<Listing>(conn)
            .optional()?;
        Ok(listing)
    }

    /// Atomically move a listing from one of `from` to `to`.
    ///
    /// Returns false when the listing was not in an expected status (or does
    /// not exist), in which case nothing was written.
    pub fn transition_status(
        conn: &mut SqliteConnection,
        listing_id: &str,
        from: &[ListingStatus],
        to: ListingStatus,
    ) -> Result<bool> {
        use crate::schema::listings::dsl;

        let from_strs: Vec<&str> = from.iter().map(|s| s.as_str()).collect();

        let updated = diesel::update(
            dsl::listings
                .filter(dsl::id.eq(listing_id))
                .filter(dsl::status.eq_any(&from_strs)),
        )
        .set((
            dsl::status.eq(to.as_str()),
            dsl::updated_at.eq(chrono::Utc::now().naive_utc()),
        ))
        .execute(conn)?;

        Ok(updated > 0)
    }

    /// Merge the provided fields; unspecified fields stay as they are.
    /// Last write wins, matching the single-writer assumption of the bot UI.
    pub fn update_fields(
        conn: &mut SqliteConnection,
        listing_id: &str,
        changes: ListingChanges,
    ) -> Result<()> {
        use crate::schema::listings::dsl;

        diesel::update(dsl::listings.find(listing_id))
            .set((changes, dsl::updated_at.eq(chrono::Utc::now().naive_utc())))
            .execute(conn)?;
        Ok(())
    }

    /// Set or clear the proof-of-ownership file reference.
    pub fn set_proof_file(
        conn: &mut SqliteConnection,
        listing_id: &str,
        file_path: Option<&str>,
    ) -> Result<()> {
        use crate::schema::listings::dsl;

        diesel::update(dsl::listings.find(listing_id))
            .set((
                dsl::proof_telegram_file_path.eq(file_path),
                dsl::updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        Ok(())
    }

    /// Paginated, filtered public search joined with seller identity.
    pub fn search(
        conn: &mut SqliteConnection,
        filter: &ListingFilter,
    ) -> Result<Vec<(Listing, Option<String>, Option<String>)>> {
        use crate::schema::{listings, users};

        let status = filter.status.clone().unwrap_or_else(|| "active".to_string());

        let mut query = listings::table
            .inner_join(users::table)
            .select((
                listings::all_columns,
                users::username,
                users::display_name,
            ))
            .into_boxed()
            .filter(listings::status.eq(status));

        if let Some(category) = &filter.category {
            query = query.filter(listings::category.eq(category.clone()));
        }
        if let Some(min) = filter.min_price {
            query = query.filter(listings::price_cents.ge(min * 100));
        }
        if let Some(max) = filter.max_price {
            query = query.filter(listings::price_cents.le(max * 100));
        }
        if let Some(q) = &filter.query {
            let pattern = format!("%{}%", q);
            query = query.filter(
                listings::title
                    .like(pattern.clone())
                    .or(listings::description.like(pattern)),
            );
        }

        let page = filter.page.max(1);
        let limit = filter.limit.clamp(1, 100);
        let offset = (page - 1) * limit;

        let rows = query
            .order(listings::created_at.desc())
            .limit(limit)
            .offset(offset)
            .load::<(Listing, Option<String>, Option<String>)>(conn)?;

        Ok(rows)
    }

    /// Admin review queue: pending listings joined with seller identity.
    pub fn pending_with_sellers(
        conn: &mut SqliteConnection,
    ) -> Result<Vec<(Listing, Option<String>, Option<String>)>> {
        use crate::schema::{listings, users};

        let rows = listings::table
            .inner_join(users::table)
            .filter(listings::status.eq(ListingStatus::PendingApproval.as_str()))
            .order(listings::created_at.desc())
            .select((
                listings::all_columns,
                users::username,
                users::display_name,
            ))
            .load::<(Listing, Option<String>, Option<String>)>(conn)?;

        Ok(rows)
    }

    /// Latest active listings for the bot's browse view.
    pub fn active_latest(conn: &mut SqliteConnection, limit: i64) -> Result<Vec<Listing>> {
        use crate::schema::listings::dsl;

        let results = dsl::listings
            .filter(dsl::status.eq(ListingStatus::Active.as_str()))
            .order(dsl::created_at.desc())
            .limit(limit)
            .load::<Listing>(conn)?;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::scratch_pool;
    use crate::models::user::{TelegramProfile, User};

    fn seed_seller(conn: &mut SqliteConnection, telegram_id: i64) -> User {
        User::find_or_create(
            conn,
            telegram_id,
            TelegramProfile {
                username: Some(format!("seller{}", telegram_id)),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn seed_listing(conn: &mut SqliteConnection, seller_id: &str, title: &str) -> Listing {
        Listing::create(
            conn,
            NewListing::new(
                seller_id.to_string(),
                title.to_string(),
                "Daily signals".to_string(),
                "streaming".to_string(),
                1500,
                DeliveryType::Instant,
            ),
        )
        .unwrap()
    }

    #[test]
    fn create_starts_pending_approval() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();
        let seller = seed_seller(&mut conn, 1);

        let listing = seed_listing(&mut conn, &seller.id, "Netflix slot");
        assert_eq!(listing.status, "pending_approval");
        assert_eq!(listing.price_cents, 1500);
        assert_eq!(listing.currency, "usd");
    }

    #[test]
    fn transition_follows_only_directed_edges() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();
        let seller = seed_seller(&mut conn, 2);
        let listing = seed_listing(&mut conn, &seller.id, "Spotify family");

        // pending_approval -> sold is not an edge
        let moved = Listing::transition_status(
            &mut conn,
            &listing.id,
            &[ListingStatus::Active],
            ListingStatus::Sold,
        )
        .unwrap();
        assert!(!moved);

        // pending_approval -> active
        assert!(Listing::transition_status(
            &mut conn,
            &listing.id,
            &[ListingStatus::PendingApproval],
            ListingStatus::Active,
        )
        .unwrap());

        // active -> sold
        assert!(Listing::transition_status(
            &mut conn,
            &listing.id,
            &[ListingStatus::Active],
            ListingStatus::Sold,
        )
        .unwrap());

        // sold is terminal: no way back to active
        let moved = Listing::transition_status(
            &mut conn,
            &listing.id,
            &[ListingStatus::PendingApproval],
            ListingStatus::Active,
        )
        .unwrap();
        assert!(!moved);

        let reloaded = Listing::find_by_id(&mut conn, &listing.id).unwrap().unwrap();
        assert_eq!(reloaded.status, "sold");
    }

    #[test]
    fn ownership_check_hides_other_sellers_listings() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();
        let owner = seed_seller(&mut conn, 3);
        let other = seed_seller(&mut conn, 4);
        let listing = seed_listing(&mut conn, &owner.id, "Disney+");

        assert!(Listing::verify_ownership(&mut conn, &listing.id, &owner.id)
            .unwrap()
            .is_some());

        // Someone else's listing and a missing listing are indistinguishable
        let not_owner = Listing::verify_ownership(&mut conn, &listing.id, &other.id).unwrap();
        let missing = Listing::verify_ownership(&mut conn, "no-such-id", &other.id).unwrap();
        assert!(not_owner.is_none());
        assert!(missing.is_none());
    }

    #[test]
    fn update_merges_fields_and_advances_updated_at() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();
        let seller = seed_seller(&mut conn, 5);
        let listing = seed_listing(&mut conn, &seller.id, "Old title");

        Listing::update_fields(
            &mut conn,
            &listing.id,
            ListingChanges {
                title: Some("New title".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        let reloaded = Listing::find_by_id(&mut conn, &listing.id).unwrap().unwrap();
        assert_eq!(reloaded.title, "New title");
        assert_eq!(reloaded.description, listing.description);
        assert_eq!(reloaded.price_cents, listing.price_cents);
        assert!(reloaded.updated_at >= listing.updated_at);
    }

    #[test]
    fn search_filters_by_price_and_text() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();
        let seller = seed_seller(&mut conn, 6);

        let cheap = seed_listing(&mut conn, &seller.id, "Budget plan");
        let pricey = seed_listing(&mut conn, &seller.id, "Premium plan");
        for id in [&cheap.id, &pricey.id] {
            Listing::transition_status(
                &mut conn,
                id,
                &[ListingStatus::PendingApproval],
                ListingStatus::Active,
            )
            .unwrap();
        }
        Listing::update_fields(
            &mut conn,
            &pricey.id,
            ListingChanges {
                price_cents: Some(9900),
                ..Default::default()
            },
        )
        .unwrap();

        // default status filter is active
        let all = Listing::search(&mut conn, &ListingFilter {
            page: 1,
            limit: 20,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(all.len(), 2);

        let under_50 = Listing::search(&mut conn, &ListingFilter {
            max_price: Some(50),
            page: 1,
            limit: 20,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(under_50.len(), 1);
        assert_eq!(under_50[0].0.id, cheap.id);

        let premium = Listing::search(&mut conn, &ListingFilter {
            query: Some("Premium".to_string()),
            page: 1,
            limit: 20,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(premium.len(), 1);
        assert_eq!(premium[0].0.id, pricey.id);
        // seller identity rides along
        assert_eq!(premium[0].1.as_deref(), Some("seller6"));
    }

    #[test]
    fn proof_file_can_be_set_and_cleared() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();
        let seller = seed_seller(&mut conn, 7);
        let listing = seed_listing(&mut conn, &seller.id, "HBO");

        Listing::set_proof_file(&mut conn, &listing.id, Some("photos/file_9.jpg")).unwrap();
        let with_proof = Listing::find_by_id(&mut conn, &listing.id).unwrap().unwrap();
        assert_eq!(
            with_proof.proof_telegram_file_path.as_deref(),
            Some("photos/file_9.jpg")
        );

        Listing::set_proof_file(&mut conn, &listing.id, None).unwrap();
        let cleared = Listing::find_by_id(&mut conn, &listing.id).unwrap().unwrap();
        assert!(cleared.proof_telegram_file_path.is_none());
    }
}
