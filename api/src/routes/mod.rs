pub mod analytics;
pub mod bans;
pub mod health;
