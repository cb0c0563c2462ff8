use std::time::Duration;

use bastion_core::fallback::{
    DEFAULT_MAX_REQUEST_SIZE, DEFAULT_MAX_RESPONSE_TIME_MS, FallbackLayout, FallbackRules,
};
use chrono::{TimeDelta, Utc};
use url::Url;

/// Upper bound for `ML_MAX_RETRIES`; backoff grows linearly with each retry.
pub const MAX_CLASSIFIER_RETRIES: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be set")]
    Missing { var: &'static str },
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl StorageBackend {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        match read_var(&lookup, "STORAGE_BACKEND").as_deref() {
            None | Some("postgres") => Ok(Self::Postgres),
            Some("memory") => Ok(Self::Memory),
            Some(other) => Err(ConfigError::Invalid {
                var: "STORAGE_BACKEND",
                value: other.to_string(),
                reason: "expected 'postgres' or 'memory'".to_string(),
            }),
        }
    }
}

/// Settings for the remote anomaly classifier and its local fallback.
#[derive(Clone, Debug)]
pub struct ClassifierConfig {
    pub base_url: Url,
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Attempt `n` waits `n * retry_delay` before sending.
    pub retry_delay: Duration,
    pub fallback_enabled: bool,
    pub fallback_rules: FallbackRules,
}

impl ClassifierConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = &lookup;
        let base_url =
            read_var(lookup, "ML_SERVICE_URL").unwrap_or_else(|| "http://localhost:5000".into());
        let base_url = Url::parse(&base_url).map_err(|err| ConfigError::Invalid {
            var: "ML_SERVICE_URL",
            value: base_url.clone(),
            reason: err.to_string(),
        })?;

        let timeout_secs: u64 = parse_var(lookup, "ML_TIMEOUT_SECS", 30)?;
        if timeout_secs == 0 {
            return Err(invalid("ML_TIMEOUT_SECS", timeout_secs, "must be positive"));
        }
        let max_retries: u32 = parse_var(lookup, "ML_MAX_RETRIES", 3)?;
        if max_retries > MAX_CLASSIFIER_RETRIES {
            return Err(invalid(
                "ML_MAX_RETRIES",
                max_retries,
                &format!("must be at most {MAX_CLASSIFIER_RETRIES}"),
            ));
        }

        Ok(Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
            retry_delay: Duration::from_millis(parse_var(lookup, "ML_RETRY_DELAY_MS", 1_000)?),
            fallback_enabled: parse_flag(lookup, "ML_FALLBACK_MODE", true)?,
            fallback_rules: FallbackRules {
                max_response_time_ms: parse_var(
                    lookup,
                    "FALLBACK_MAX_RESPONSE_TIME_MS",
                    DEFAULT_MAX_RESPONSE_TIME_MS,
                )?,
                max_request_size: parse_var(
                    lookup,
                    "FALLBACK_MAX_REQUEST_SIZE",
                    DEFAULT_MAX_REQUEST_SIZE,
                )?,
                layout: FallbackLayout::default(),
            },
        })
    }
}

/// Settings for the request defense pipeline itself.
#[derive(Clone, Debug)]
pub struct DefenseConfig {
    pub ban_duration: chrono::Duration,
    /// Honour the first hop of `X-Forwarded-For` (only behind a trusted proxy).
    pub trust_forwarded_for: bool,
    /// `None` disables the expired-ban reaper.
    pub reap_interval: Option<Duration>,
}

impl DefenseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = &lookup;
        let ban_secs: i64 = parse_var(lookup, "BAN_DURATION_SECS", 3_600)?;
        if ban_secs <= 0 {
            return Err(invalid("BAN_DURATION_SECS", ban_secs, "must be positive"));
        }
        // The ban end must stay representable as a timestamp.
        let ban_duration = TimeDelta::try_seconds(ban_secs)
            .filter(|duration| Utc::now().checked_add_signed(*duration).is_some())
            .ok_or_else(|| invalid("BAN_DURATION_SECS", ban_secs, "too large"))?;
        let reap_secs: u64 = parse_var(lookup, "BAN_REAP_INTERVAL_SECS", 300)?;

        Ok(Self {
            ban_duration,
            trust_forwarded_for: parse_flag(lookup, "TRUST_FORWARDED_FOR", false)?,
            reap_interval: (reap_secs > 0).then(|| Duration::from_secs(reap_secs)),
        })
    }
}

impl Default for DefenseConfig {
    fn default() -> Self {
        Self {
            ban_duration: chrono::Duration::hours(1),
            trust_forwarded_for: false,
            reap_interval: Some(Duration::from_secs(300)),
        }
    }
}

pub fn database_url() -> Result<String, ConfigError> {
    read_var(&env_lookup, "DATABASE_URL").ok_or(ConfigError::Missing {
        var: "DATABASE_URL",
    })
}

pub fn port() -> Result<u16, ConfigError> {
    parse_var(&env_lookup, "PORT", 3000)
}

fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

fn invalid(var: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn read_var(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Option<String> {
    lookup(var)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match read_var(lookup, var) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: err.to_string(),
        }),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match read_var(lookup, var) {
        None => Ok(default),
        Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
            var,
            value: raw,
            reason: "expected true or false".to_string(),
        }),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
