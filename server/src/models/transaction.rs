//! Transaction model.
//!
//! Payment-backed path: `pending_payment -> paid -> completed`, with side
//! branches `disputed`, `refunded`, `payment_failed`. Escrow sub-state tracks
//! whether the buyer's funds are held, released to the seller, or refunded.
//! All transitions are conditional UPDATEs keyed on the expected status.

use anyhow::Result;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::transactions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    PendingPayment,
    Paid,
    Completed,
    Disputed,
    Refunded,
    PaymentFailed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::PendingPayment => "pending_payment",
            TransactionStatus::Paid => "paid",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Disputed => "disputed",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::PaymentFailed => "payment_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Held,
    Released,
    Refunded,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Held => "held",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = transactions)]
pub struct Transaction {
    pub id: String,
    pub listing_id: Option<String>,
    pub buyer_id: Option<String>,
    pub seller_id: Option<String>,
    pub amount_cents: i32,
    pub currency: String,
    pub status: String,
    pub escrow_status: Option<String>,
    pub stripe_session_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = transactions)]
pub struct NewTransaction {
    pub id: String,
    pub listing_id: Option<String>,
    pub buyer_id: Option<String>,
    pub seller_id: Option<String>,
    pub amount_cents: i32,
    pub currency: String,
    pub status: String,
}

impl NewTransaction {
    /// Payment-backed purchase, awaiting checkout completion.
    pub fn pending_payment(
        listing_id: String,
        buyer_id: String,
        seller_id: String,
        amount_cents: i32,
        currency: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            listing_id: Some(listing_id),
            buyer_id: Some(buyer_id),
            seller_id: Some(seller_id),
            amount_cents,
            currency,
            status: TransactionStatus::PendingPayment.as_str().to_string(),
        }
    }

    /// Seller-confirmed off-platform sale; no buyer, no payment to track.
    pub fn offline_sale(listing_id: String, seller_id: String, amount_cents: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            listing_id: Some(listing_id),
            buyer_id: None,
            seller_id: Some(seller_id),
            amount_cents,
            currency: "usd".to_string(),
            status: TransactionStatus::Completed.as_str().to_string(),
        }
    }
}

impl Transaction {
    pub fn create(conn: &mut SqliteConnection, new_tx: NewTransaction) -> Result<Transaction> {
        use crate::schema::transactions::dsl;

        diesel::insert_into(dsl::transactions)
            .values(&new_tx)
            .execute(conn)?;

        let tx = dsl::transactions.find(&new_tx.id).first::<Transaction>(conn)?;
        Ok(tx)
    }

    pub fn find_by_id(conn: &mut SqliteConnection, tx_id: &str) -> Result<Option<Transaction>> {
        use crate::schema::transactions::dsl;

        let tx = dsl::transactions
            .find(tx_id)
            .first::<Transaction>(conn)
            .optional()?;
        Ok(tx)
    }

    pub fn find_by_buyer(conn: &mut SqliteConnection, buyer_id: &str) -> Result<Vec<Transaction>> {
        use crate::schema::transactions::dsl;

        let results = dsl::transactions
            .filter(dsl::buyer_id.eq(buyer_id))
            .order(dsl::created_at.desc())
            .load::<Transaction>(conn)?;
        Ok(results)
    }

    pub fn set_session_id(
        conn: &mut SqliteConnection,
        tx_id: &str,
        session_id: &str,
    ) -> Result<()> {
        use crate::schema::transactions::dsl;

        diesel::update(dsl::transactions.find(tx_id))
            .set((
                dsl::stripe_session_id.eq(session_id),
                dsl::updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        Ok(())
    }

    /// Checkout completed: `pending_payment -> paid`, funds held.
    pub fn mark_paid(conn: &mut SqliteConnection, tx_id: &str) -> Result<bool> {
        Self::transition(
            conn,
            tx_id,
            &[TransactionStatus::PendingPayment],
            TransactionStatus::Paid,
            Some(EscrowStatus::Held),
        )
    }

    /// Buyer confirmed delivery: `paid -> completed`, funds released.
    pub fn mark_completed(conn: &mut SqliteConnection, tx_id: &str) -> Result<bool> {
        Self::transition(
            conn,
            tx_id,
            &[TransactionStatus::Paid],
            TransactionStatus::Completed,
            Some(EscrowStatus::Released),
        )
    }

    /// Either party opened a dispute on a paid transaction.
    pub fn mark_disputed(conn: &mut SqliteConnection, tx_id: &str) -> Result<bool> {
        Self::transition(
            conn,
            tx_id,
            &[TransactionStatus::Paid],
            TransactionStatus::Disputed,
            None,
        )
    }

    /// Checkout payment failed before funds were captured.
    pub fn mark_payment_failed(conn: &mut SqliteConnection, tx_id: &str) -> Result<bool> {
        Self::transition(
            conn,
            tx_id,
            &[TransactionStatus::PendingPayment],
            TransactionStatus::PaymentFailed,
            None,
        )
    }

    /// Admin refund: any held state back to the buyer.
    pub fn mark_refunded(conn: &mut SqliteConnection, tx_id: &str) -> Result<bool> {
        Self::transition(
            conn,
            tx_id,
            &[
                TransactionStatus::Paid,
                TransactionStatus::Disputed,
                TransactionStatus::Completed,
            ],
            TransactionStatus::Refunded,
            Some(EscrowStatus::Refunded),
        )
    }

    /// Dispute resolution: refund the buyer or release to the seller.
    pub fn resolve_dispute(
        conn: &mut SqliteConnection,
        tx_id: &str,
        refund_buyer: bool,
    ) -> Result<bool> {
        let (to, escrow) = if refund_buyer {
            (TransactionStatus::Refunded, EscrowStatus::Refunded)
        } else {
            (TransactionStatus::Completed, EscrowStatus::Released)
        };
        Self::transition(conn, tx_id, &[TransactionStatus::Disputed], to, Some(escrow))
    }

    fn transition(
        conn: &mut SqliteConnection,
        tx_id: &str,
        from: &[TransactionStatus],
        to: TransactionStatus,
        escrow: Option<EscrowStatus>,
    ) -> Result<bool> {
        use crate::schema::transactions::dsl;

        let from_strs: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
        let now = chrono::Utc::now().naive_utc();

        let filter = dsl::transactions
            .filter(dsl::id.eq(tx_id))
            .filter(dsl::status.eq_any(&from_strs));

        let updated = match escrow {
            Some(e) => diesel::update(filter)
                .set((
                    dsl::status.eq(to.as_str()),
                    dsl::escrow_status.eq(e.as_str()),
                    dsl::updated_at.eq(now),
                ))
                .execute(conn)?,
            None => diesel::update(filter)
                .set((dsl::status.eq(to.as_str()), dsl::updated_at.eq(now)))
                .execute(conn)?,
        };

        Ok(updated > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::scratch_pool;
    use crate::models::listing::{DeliveryType, Listing, NewListing};
    use crate::models::user::{TelegramProfile, User};

    fn seed_tx(conn: &mut SqliteConnection) -> Transaction {
        let seller = User::find_or_create(conn, 10, TelegramProfile::default()).unwrap();
        let buyer = User::find_or_create(conn, 11, TelegramProfile::default()).unwrap();
        let listing = Listing::create(
            conn,
            NewListing::new(
                seller.id.clone(),
                "Pass".into(),
                "".into(),
                "events".into(),
                2500,
                DeliveryType::Manual,
            ),
        )
        .unwrap();

        Transaction::create(
            conn,
            NewTransaction::pending_payment(listing.id, buyer.id, seller.id, 2500, "usd".into()),
        )
        .unwrap()
    }

    #[test]
    fn happy_path_pending_to_completed() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();
        let tx = seed_tx(&mut conn);

        assert_eq!(tx.status, "pending_payment");
        assert!(tx.escrow_status.is_none());

        assert!(Transaction::mark_paid(&mut conn, &tx.id).unwrap());
        let paid = Transaction::find_by_id(&mut conn, &tx.id).unwrap().unwrap();
        assert_eq!(paid.status, "paid");
        assert_eq!(paid.escrow_status.as_deref(), Some("held"));

        assert!(Transaction::mark_completed(&mut conn, &tx.id).unwrap());
        let done = Transaction::find_by_id(&mut conn, &tx.id).unwrap().unwrap();
        assert_eq!(done.status, "completed");
        assert_eq!(done.escrow_status.as_deref(), Some("released"));
    }

    #[test]
    fn paid_transition_applies_only_once() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();
        let tx = seed_tx(&mut conn);

        assert!(Transaction::mark_paid(&mut conn, &tx.id).unwrap());
        // replay of the same transition is a no-op
        assert!(!Transaction::mark_paid(&mut conn, &tx.id).unwrap());
    }

    #[test]
    fn cannot_complete_before_payment() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();
        let tx = seed_tx(&mut conn);

        assert!(!Transaction::mark_completed(&mut conn, &tx.id).unwrap());
        let unchanged = Transaction::find_by_id(&mut conn, &tx.id).unwrap().unwrap();
        assert_eq!(unchanged.status, "pending_payment");
    }

    #[test]
    fn dispute_resolution_refunds_or_releases() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();

        let tx = seed_tx(&mut conn);
        Transaction::mark_paid(&mut conn, &tx.id).unwrap();
        assert!(Transaction::mark_disputed(&mut conn, &tx.id).unwrap());

        assert!(Transaction::resolve_dispute(&mut conn, &tx.id, true).unwrap());
        let refunded = Transaction::find_by_id(&mut conn, &tx.id).unwrap().unwrap();
        assert_eq!(refunded.status, "refunded");
        assert_eq!(refunded.escrow_status.as_deref(), Some("refunded"));

        let tx2 = seed_tx(&mut conn);
        Transaction::mark_paid(&mut conn, &tx2.id).unwrap();
        Transaction::mark_disputed(&mut conn, &tx2.id).unwrap();

        assert!(Transaction::resolve_dispute(&mut conn, &tx2.id, false).unwrap());
        let released = Transaction::find_by_id(&mut conn, &tx2.id).unwrap().unwrap();
        assert_eq!(released.status, "completed");
        assert_eq!(released.escrow_status.as_deref(), Some("released"));
    }

    #[test]
    fn offline_sale_has_no_buyer() {
        let (_dir, pool) = scratch_pool();
        let mut conn = pool.get().unwrap();
        let seller = User::find_or_create(&mut conn, 12, TelegramProfile::default()).unwrap();
        let listing = Listing::create(
            &mut conn,
            NewListing::new(
                seller.id.clone(),
                "Ticket".into(),
                "".into(),
                "events".into(),
                4000,
                DeliveryType::Manual,
            ),
        )
        .unwrap();

        let tx = Transaction::create(
            &mut conn,
            NewTransaction::offline_sale(listing.id, seller.id, 4000),
        )
        .unwrap();

        assert!(tx.buyer_id.is_none());
        assert_eq!(tx.status, "completed");
    }
}
