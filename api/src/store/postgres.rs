use async_trait::async_trait;
use bastion_core::bans::BanEntry;
use bastion_core::requests::{RequestCategory, RequestLogEntry, RequestRecord};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{BanInsertOutcome, BanStore, CategoryCount, RequestLogStore, StoreError};

#[derive(Clone)]
pub struct PgBanStore {
    pool: PgPool,
}

impl PgBanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BanRow {
    address: String,
    banned_until: DateTime<Utc>,
    reason: String,
    created_at: DateTime<Utc>,
}

impl From<BanRow> for BanEntry {
    fn from(row: BanRow) -> Self {
        BanEntry {
            address: row.address,
            banned_until: row.banned_until,
            reason: row.reason,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl BanStore for PgBanStore {
    async fn is_banned(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let banned_until = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT banned_until FROM banned_addresses WHERE address = $1 AND banned_until > $2",
        )
        .bind(address)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(banned_until)
    }

    async fn find_active(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BanEntry>, StoreError> {
        let row = sqlx::query_as::<_, BanRow>(
            r#"
            SELECT address, banned_until, reason, created_at
            FROM banned_addresses
            WHERE address = $1 AND banned_until > $2
            "#,
        )
        .bind(address)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(BanEntry::from))
    }

    async fn insert_if_absent(&self, ban: &BanEntry) -> Result<BanInsertOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM banned_addresses WHERE address = $1 AND banned_until <= $2")
            .bind(&ban.address)
            .bind(ban.created_at)
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO banned_addresses (address, banned_until, reason, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (address) DO NOTHING
            "#,
        )
        .bind(&ban.address)
        .bind(ban.banned_until)
        .bind(&ban.reason)
        .bind(ban.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(if inserted == 1 {
            BanInsertOutcome::Inserted
        } else {
            BanInsertOutcome::AlreadyBanned
        })
    }

    async fn active(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<BanEntry>, StoreError> {
        let rows = sqlx::query_as::<_, BanRow>(
            r#"
            SELECT address, banned_until, reason, created_at
            FROM banned_addresses
            WHERE banned_until > $1
            ORDER BY banned_until DESC, address
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BanEntry::from).collect())
    }

    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM banned_addresses WHERE banned_until <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgRequestLogStore {
    pool: PgPool,
}

impl PgRequestLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RequestLogRow {
    id: i64,
    address: String,
    method: String,
    path: String,
    status_code: i32,
    user_agent: String,
    category: String,
    response_time_ms: f64,
    created_at: DateTime<Utc>,
}

impl TryFrom<RequestLogRow> for RequestLogEntry {
    type Error = StoreError;

    fn try_from(row: RequestLogRow) -> Result<Self, Self::Error> {
        let category = row
            .category
            .parse::<RequestCategory>()
            .map_err(|err| StoreError::Corrupt(format!("request_logs.id={}: {err}", row.id)))?;
        let status_code = u16::try_from(row.status_code).map_err(|_| {
            StoreError::Corrupt(format!(
                "request_logs.id={}: status_code {} out of range",
                row.id, row.status_code
            ))
        })?;

        Ok(RequestLogEntry {
            id: row.id,
            record: RequestRecord {
                address: row.address,
                method: row.method,
                path: row.path,
                status_code,
                user_agent: row.user_agent,
                category,
                response_time_ms: row.response_time_ms,
                created_at: row.created_at,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct CategoryCountRow {
    category: String,
    count: i64,
}

#[async_trait]
impl RequestLogStore for PgRequestLogStore {
    async fn append(&self, record: &RequestRecord) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO request_logs
                (address, method, path, status_code, user_agent, category, response_time_ms, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&record.address)
        .bind(&record.method)
        .bind(&record.path)
        .bind(i32::from(record.status_code))
        .bind(&record.user_agent)
        .bind(record.category.as_str())
        .bind(record.response_time_ms)
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<RequestLogEntry>, StoreError> {
        let rows = sqlx::query_as::<_, RequestLogRow>(
            r#"
            SELECT id, address, method, path, status_code, user_agent, category,
                   response_time_ms, created_at
            FROM request_logs
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RequestLogEntry::try_from).collect()
    }

    async fn category_counts(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<CategoryCount>, StoreError> {
        let rows = sqlx::query_as::<_, CategoryCountRow>(
            r#"
            SELECT category, COUNT(*) AS count
            FROM request_logs
            WHERE created_at >= $1
            GROUP BY category
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let category = row
                    .category
                    .parse::<RequestCategory>()
                    .map_err(|err| StoreError::Corrupt(err.to_string()))?;
                Ok(CategoryCount {
                    category,
                    count: row.count,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
