pub mod bans;
pub mod health;
pub mod logs;
