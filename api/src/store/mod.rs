//! Durable state behind the defense pipeline.
//!
//! Both stores are injected as trait objects built once at startup. All
//! cross-request coordination happens inside the store (the ban table's unique key),
//! never in process memory, so any number of API replicas can share one database.

use async_trait::async_trait;
use bastion_core::bans::BanEntry;
use bastion_core::requests::{RequestCategory, RequestLogEntry, RequestRecord};
use chrono::{DateTime, Utc};

mod memory;
mod postgres;

pub use memory::{MemoryBanStore, MemoryRequestLogStore};
pub use postgres::{PgBanStore, PgRequestLogStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result of a conflict-safe ban insert. Losing the race is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanInsertOutcome {
    Inserted,
    AlreadyBanned,
}

#[async_trait]
pub trait BanStore: Send + Sync {
    /// Expiry of the active ban on `address`, if any (`banned_until > now`).
    async fn is_banned(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// The active entry for `address`, with its reason and creation time.
    async fn find_active(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BanEntry>, StoreError>;

    /// First writer wins: an active entry for the same address is left untouched.
    /// An expired entry is pruned so the address can be banned again.
    async fn insert_if_absent(&self, ban: &BanEntry) -> Result<BanInsertOutcome, StoreError>;

    /// Active bans, soonest expiry last.
    async fn active(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<BanEntry>, StoreError>;

    /// Deletes every entry whose window has closed. Returns the number removed.
    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: RequestCategory,
    pub count: i64,
}

#[async_trait]
pub trait RequestLogStore: Send + Sync {
    /// Append-only. Returns the id assigned to the row.
    async fn append(&self, record: &RequestRecord) -> Result<i64, StoreError>;

    /// Newest first.
    async fn recent(&self, limit: i64) -> Result<Vec<RequestLogEntry>, StoreError>;

    async fn category_counts(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<CategoryCount>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
