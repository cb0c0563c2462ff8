use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Reason recorded for bans issued by the anomaly pipeline.
pub const ANOMALY_BAN_REASON: &str = "Anomaly detected";

/// A time-boxed ban on one network address. At most one active entry exists per
/// address; the store enforces that, not the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BanEntry {
    pub address: String,
    pub banned_until: DateTime<Utc>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl BanEntry {
    /// `banned_until` saturates at the latest representable instant.
    pub fn new(
        address: impl Into<String>,
        now: DateTime<Utc>,
        duration: Duration,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            banned_until: now
                .checked_add_signed(duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            reason: reason.into(),
            created_at: now,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.banned_until > now
    }
}
