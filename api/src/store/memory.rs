use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use bastion_core::bans::BanEntry;
use bastion_core::requests::{RequestCategory, RequestLogEntry, RequestRecord};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{BanInsertOutcome, BanStore, CategoryCount, RequestLogStore, StoreError};

/// Single-process ban table. Same first-writer-wins semantics as the Postgres
/// store, with the write lock standing in for the unique key.
#[derive(Clone, Default)]
pub struct MemoryBanStore {
    bans: Arc<RwLock<HashMap<String, BanEntry>>>,
}

impl MemoryBanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored entry, expired or not.
    #[cfg(test)]
    pub async fn snapshot(&self) -> Vec<BanEntry> {
        self.bans.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl BanStore for MemoryBanStore {
    async fn is_banned(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let lock = self.bans.read().await;
        Ok(lock
            .get(address)
            .filter(|ban| ban.is_active(now))
            .map(|ban| ban.banned_until))
    }

    async fn find_active(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BanEntry>, StoreError> {
        let lock = self.bans.read().await;
        Ok(lock.get(address).filter(|ban| ban.is_active(now)).cloned())
    }

    async fn insert_if_absent(&self, ban: &BanEntry) -> Result<BanInsertOutcome, StoreError> {
        let mut lock = self.bans.write().await;
        match lock.get(&ban.address) {
            Some(existing) if existing.is_active(ban.created_at) => {
                Ok(BanInsertOutcome::AlreadyBanned)
            }
            _ => {
                lock.insert(ban.address.clone(), ban.clone());
                Ok(BanInsertOutcome::Inserted)
            }
        }
    }

    async fn active(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<BanEntry>, StoreError> {
        let lock = self.bans.read().await;
        let mut active: Vec<BanEntry> = lock
            .values()
            .filter(|ban| ban.is_active(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            b.banned_until
                .cmp(&a.banned_until)
                .then_with(|| a.address.cmp(&b.address))
        });
        active.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(active)
    }

    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut lock = self.bans.write().await;
        let before = lock.len();
        lock.retain(|_, ban| ban.is_active(now));
        Ok((before - lock.len()) as u64)
    }
}

/// Append-only in-process request log.
#[derive(Clone, Default)]
pub struct MemoryRequestLogStore {
    entries: Arc<RwLock<Vec<RequestLogEntry>>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryRequestLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in insertion order.
    #[cfg(test)]
    pub async fn snapshot(&self) -> Vec<RequestLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl RequestLogStore for MemoryRequestLogStore {
    async fn append(&self, record: &RequestRecord) -> Result<i64, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries.write().await.push(RequestLogEntry {
            id,
            record: record.clone(),
        });
        Ok(id)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<RequestLogEntry>, StoreError> {
        let lock = self.entries.read().await;
        let mut recent = lock.clone();
        recent.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        recent.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(recent)
    }

    async fn category_counts(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<CategoryCount>, StoreError> {
        let lock = self.entries.read().await;
        let mut counts: HashMap<RequestCategory, i64> = HashMap::new();
        for entry in lock.iter().filter(|entry| entry.record.created_at >= since) {
            *counts.entry(entry.record.category).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
