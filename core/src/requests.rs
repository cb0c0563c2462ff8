use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Binary outcome of classifying one feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Normal,
    Anomalous,
}

impl Verdict {
    /// Classifier wire convention: `-1` marks an outlier, every other value is normal.
    pub fn from_prediction(prediction: i64) -> Self {
        if prediction == -1 {
            Verdict::Anomalous
        } else {
            Verdict::Normal
        }
    }

    pub fn is_anomalous(self) -> bool {
        self == Verdict::Anomalous
    }
}

/// Category stored with every request log row.
///
/// The anomaly pipeline only ever produces `Normal` and `Anomaly`. `Warning` is
/// written by the rule-based request classifier that lives outside this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestCategory {
    Normal,
    Warning,
    Anomaly,
}

impl RequestCategory {
    pub const ALL: [RequestCategory; 3] = [
        RequestCategory::Normal,
        RequestCategory::Warning,
        RequestCategory::Anomaly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RequestCategory::Normal => "normal",
            RequestCategory::Warning => "warning",
            RequestCategory::Anomaly => "anomaly",
        }
    }
}

impl From<Verdict> for RequestCategory {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Normal => RequestCategory::Normal,
            Verdict::Anomalous => RequestCategory::Anomaly,
        }
    }
}

impl fmt::Display for RequestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown request category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for RequestCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(RequestCategory::Normal),
            "warning" => Ok(RequestCategory::Warning),
            "anomaly" => Ok(RequestCategory::Anomaly),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// One processed request. Written once at the end of the pipeline and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RequestRecord {
    /// Source network address as seen by the pipeline
    pub address: String,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    /// Empty when the client sent no User-Agent
    pub user_agent: String,
    pub category: RequestCategory,
    pub response_time_ms: f64,
    pub created_at: DateTime<Utc>,
}

/// A request record as read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RequestLogEntry {
    pub id: i64,
    #[serde(flatten)]
    pub record: RequestRecord,
}
