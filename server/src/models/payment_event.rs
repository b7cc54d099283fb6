//! Processed payment-provider events.
//!
//! Stripe retries webhook deliveries, and the same event can arrive more
//! than once. Each event id is claimed here before any transaction state is
//! mutated; a second delivery of the same id finds the row already present
//! and is dropped.

use anyhow::Result;
use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::processed_payment_events;

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = processed_payment_events)]
pub struct ProcessedPaymentEvent {
    pub event_id: String,
    pub processed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = processed_payment_events)]
struct NewProcessedPaymentEvent<'a> {
    event_id: &'a str,
}

impl ProcessedPaymentEvent {
    /// Claim an event id. Returns true when this is the first delivery.
    pub fn claim(conn: &mut SqliteConnection, event_id: &str) -> Result<bool> {
        use crate::schema::processed_payment_events::dsl;

        let inserted = diesel::insert_into(dsl::processed_payment_events)
            .values(&NewProcessedPaymentEvent { event_id })
            .on_conflict_do_nothing()
            .execute(conn)?;

        Ok(inserted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::scratch_pool;

    #[test]
    fn first_claim_wins_replay_is_dropped() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();

        assert!(ProcessedPaymentEvent::claim(&mut conn, "evt_123").unwrap());
        assert!(!ProcessedPaymentEvent::claim(&mut conn, "evt_123").unwrap());
        assert!(ProcessedPaymentEvent::claim(&mut conn, "evt_456").unwrap());
    }
}
