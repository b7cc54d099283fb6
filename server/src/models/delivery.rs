//! Delivery records.
//!
//! One row per confirmed delivery. The file reference and encrypted payload
//! columns exist for sellers that hand off material through the bot; most
//! deliveries only carry the confirmation timestamp.

use anyhow::Result;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::deliveries;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = deliveries)]
pub struct Delivery {
    pub id: String,
    pub transaction_id: String,
    pub delivered_at: Option<NaiveDateTime>,
    pub delivery_telegram_file_path: Option<String>,
    pub delivery_data_encrypted: Option<Vec<u8>>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = deliveries)]
pub struct NewDelivery {
    pub id: String,
    pub transaction_id: String,
    pub delivered_at: Option<NaiveDateTime>,
    pub delivery_telegram_file_path: Option<String>,
}

impl Delivery {
    /// Record that the buyer confirmed delivery of a transaction.
    pub fn record_confirmed(conn: &mut SqliteConnection, transaction_id: &str) -> Result<Delivery> {
        use crate::schema::deliveries::dsl;

        let new_delivery = NewDelivery {
            id: uuid::Uuid::new_v4().to_string(),
            transaction_id: transaction_id.to_string(),
            delivered_at: Some(chrono::Utc::now().naive_utc()),
            delivery_telegram_file_path: None,
        };

        diesel::insert_into(dsl::deliveries)
            .values(&new_delivery)
            .execute(conn)?;

        let delivery = dsl::deliveries.find(&new_delivery.id).first::<Delivery>(conn)?;
        Ok(delivery)
    }

    pub fn find_by_transaction(
        conn: &mut SqliteConnection,
        transaction_id: &str,
    ) -> Result<Vec<Delivery>> {
        use crate::schema::deliveries::dsl;

        let results = dsl::deliveries
            .filter(dsl::transaction_id.eq(transaction_id))
            .load::<Delivery>(conn)?;
        Ok(results)
    }
}
