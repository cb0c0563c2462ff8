//! Rule-based stand-in for the remote anomaly classifier.
//!
//! Only consulted when every attempt to reach the classifier has failed. The rules
//! catch the obvious outliers and let everything else through.

use crate::features::{PATH_LENGTH_INDEX, RESPONSE_TIME_INDEX, STATUS_INDEX};
use crate::requests::Verdict;

pub const DEFAULT_MAX_RESPONSE_TIME_MS: f64 = 5_000.0;
pub const DEFAULT_MAX_REQUEST_SIZE: f64 = 10_000.0;

/// Where the rule engine finds each input inside a feature slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackLayout {
    pub response_time: usize,
    /// Feature used as a proxy for request size.
    pub request_size: usize,
    pub status_code: usize,
    /// Optional explicit error-count feature. The request feature vector has none.
    pub error_count: Option<usize>,
}

impl FallbackLayout {
    /// Minimum slice length needed to evaluate every rule.
    pub fn required_len(&self) -> usize {
        [
            Some(self.response_time),
            Some(self.request_size),
            Some(self.status_code),
            self.error_count,
        ]
        .into_iter()
        .flatten()
        .max()
        .map_or(0, |idx| idx + 1)
    }
}

impl Default for FallbackLayout {
    fn default() -> Self {
        Self {
            response_time: RESPONSE_TIME_INDEX,
            request_size: PATH_LENGTH_INDEX,
            status_code: STATUS_INDEX,
            error_count: None,
        }
    }
}

/// Tunable thresholds for the fallback verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackRules {
    pub max_response_time_ms: f64,
    pub max_request_size: f64,
    pub layout: FallbackLayout,
}

impl Default for FallbackRules {
    fn default() -> Self {
        Self {
            max_response_time_ms: DEFAULT_MAX_RESPONSE_TIME_MS,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            layout: FallbackLayout::default(),
        }
    }
}

impl FallbackRules {
    /// Any single rule firing makes the request anomalous. Input shorter than the
    /// layout requires fails open to `Normal`.
    pub fn classify(&self, features: &[f64]) -> Verdict {
        let layout = &self.layout;
        if features.len() < layout.required_len() {
            return Verdict::Normal;
        }

        if features[layout.response_time] > self.max_response_time_ms {
            return Verdict::Anomalous;
        }
        if features[layout.request_size] > self.max_request_size {
            return Verdict::Anomalous;
        }
        if let Some(error_idx) = layout.error_count
            && features[error_idx] > 0.0
            && features[layout.status_code] >= 400.0
        {
            return Verdict::Anomalous;
        }

        Verdict::Normal
    }
}
