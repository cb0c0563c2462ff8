use std::time::Duration;

use bastion_core::features::FeatureVector;
use bastion_core::requests::Verdict;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ClassifierConfig;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("no feature vectors supplied")]
    NoFeatures,
    #[error("anomaly classifier unavailable after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },
    #[error("anomaly classifier unhealthy: {0}")]
    Unhealthy(String),
    #[error("failed to build classifier HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Why a single attempt failed. Logged, never returned to callers.
#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("classifier returned status {0}")]
    Status(StatusCode),
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    features: &'a [FeatureVector],
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    prediction: Vec<i64>,
}

/// HTTP client for the external anomaly classifier.
///
/// Every attempt is bounded by the configured timeout, attempts are spaced by a
/// linearly growing delay, and once they are exhausted the local fallback rules
/// answer instead (unless fallback is switched off).
#[derive(Clone)]
pub struct ClassifierClient {
    http: reqwest::Client,
    predict_url: Url,
    health_url: Url,
    config: ClassifierConfig,
}

impl ClassifierClient {
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            // Internal service; never route it through an egress proxy.
            .no_proxy()
            .build()?;
        let predict_url = endpoint(&config.base_url, "analyze/request");
        let health_url = endpoint(&config.base_url, "health");

        Ok(Self {
            http,
            predict_url,
            health_url,
            config,
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub async fn classify(&self, features: &FeatureVector) -> Result<Verdict, ClassifierError> {
        let verdicts = self.classify_batch(std::slice::from_ref(features)).await?;
        // classify_batch yields exactly one verdict per input vector
        Ok(verdicts.into_iter().next().unwrap_or(Verdict::Normal))
    }

    pub async fn classify_batch(
        &self,
        vectors: &[FeatureVector],
    ) -> Result<Vec<Verdict>, ClassifierError> {
        if vectors.is_empty() {
            return Err(ClassifierError::NoFeatures);
        }

        let body = PredictRequest { features: vectors };
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut last_error: Option<AttemptError> = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }

            match self.attempt(&body, vectors.len()).await {
                Ok(verdicts) => return Ok(verdicts),
                Err(err) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        error = %err,
                        "anomaly classifier attempt failed"
                    );
                    last_error = Some(err);
                }
            }
        }

        let last_error = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());

        if self.config.fallback_enabled {
            tracing::warn!(
                attempts = max_attempts,
                last_error = %last_error,
                "anomaly classifier unreachable; using fallback rules"
            );
            let rules = &self.config.fallback_rules;
            return Ok(vectors
                .iter()
                .map(|vector| rules.classify(vector.as_slice()))
                .collect());
        }

        Err(ClassifierError::Unavailable {
            attempts: max_attempts,
            last_error,
        })
    }

    /// `GET {base}/health` with a short timeout.
    pub async fn health(&self) -> Result<(), ClassifierError> {
        let response = self
            .http
            .get(self.health_url.clone())
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|err| ClassifierError::Unhealthy(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ClassifierError::Unhealthy(format!(
                "health check returned status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Delay before attempt `attempt` (0-based): `attempt * retry_delay`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.config.retry_delay.saturating_mul(attempt)
    }

    async fn attempt(
        &self,
        body: &PredictRequest<'_>,
        expected: usize,
    ) -> Result<Vec<Verdict>, AttemptError> {
        let response = self
            .http
            .post(self.predict_url.clone())
            .json(body)
            .send()
            .await
            .map_err(AttemptError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status));
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|err| AttemptError::Malformed(err.to_string()))?;

        if parsed.prediction.len() < expected {
            return Err(AttemptError::Malformed(format!(
                "expected {expected} predictions, got {}",
                parsed.prediction.len()
            )));
        }

        Ok(parsed
            .prediction
            .into_iter()
            .take(expected)
            .map(Verdict::from_prediction)
            .collect())
    }
}

fn endpoint(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!("{}/{path}", base.path().trim_end_matches('/'));
    url.set_path(&joined);
    url
}
