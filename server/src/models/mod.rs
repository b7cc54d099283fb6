pub mod delivery;
pub mod dispute;
pub mod listing;
pub mod outbox;
pub mod payment_event;
pub mod transaction;
pub mod user;
