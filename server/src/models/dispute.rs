//! Dispute model.
//!
//! A dispute references a transaction and the party who opened it. The
//! `resolution` field carries the opener's reason until an admin overwrites
//! it with the final ruling.

use anyhow::Result;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::disputes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Resolved,
    Rejected,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::Resolved => "resolved",
            DisputeStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = disputes)]
pub struct Dispute {
    pub id: String,
    pub transaction_id: String,
    pub opener_id: String,
    pub status: String,
    pub resolution: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = disputes)]
pub struct NewDispute {
    pub id: String,
    pub transaction_id: String,
    pub opener_id: String,
    pub status: String,
    pub resolution: Option<String>,
}

impl NewDispute {
    pub fn open(transaction_id: String, opener_id: String, reason: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            transaction_id,
            opener_id,
            status: DisputeStatus::Open.as_str().to_string(),
            resolution: reason,
        }
    }
}

impl Dispute {
    pub fn create(conn: &mut SqliteConnection, new_dispute: NewDispute) -> Result<Dispute> {
        use crate::schema::disputes::dsl;

        diesel::insert_into(dsl::disputes)
            .values(&new_dispute)
            .execute(conn)?;

        let dispute = dsl::disputes.find(&new_dispute.id).first::<Dispute>(conn)?;
        Ok(dispute)
    }

    pub fn find_by_id(conn: &mut SqliteConnection, dispute_id: &str) -> Result<Option<Dispute>> {
        use crate::schema::disputes::dsl;

        let dispute = dsl::disputes
            .find(dispute_id)
            .first::<Dispute>(conn)
            .optional()?;
        Ok(dispute)
    }

    pub fn list_open(conn: &mut SqliteConnection) -> Result<Vec<Dispute>> {
        use crate::schema::disputes::dsl;

        let results = dsl::disputes
            .filter(dsl::status.eq(DisputeStatus::Open.as_str()))
            .order(dsl::created_at.desc())
            .load::<Dispute>(conn)?;
        Ok(results)
    }

    /// Close an open dispute with the admin's resolution text.
    /// Returns false when the dispute was already closed.
    pub fn resolve(
        conn: &mut SqliteConnection,
        dispute_id: &str,
        resolution: &str,
    ) -> Result<bool> {
        use crate::schema::disputes::dsl;

        let updated = diesel::update(
            dsl::disputes
                .filter(dsl::id.eq(dispute_id))
                .filter(dsl::status.eq(DisputeStatus::Open.as_str())),
        )
        .set((
            dsl::status.eq(DisputeStatus::Resolved.as_str()),
            dsl::resolution.eq(resolution),
            dsl::updated_at.eq(chrono::Utc::now().naive_utc()),
        ))
        .execute(conn)?;

        Ok(updated > 0)
    }
}
