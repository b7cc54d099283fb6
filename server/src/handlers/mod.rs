pub mod admin;
pub mod health;
pub mod listings;
pub mod transactions;
pub mod webhooks;
