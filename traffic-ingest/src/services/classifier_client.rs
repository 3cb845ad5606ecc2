//! Classification service client
//!
//! Calls `POST {base_url}/classify` with a stored event and expects
//! `{"result": {"classification", "score", "model_version"}}` back.
//! Every other status or body shape is reported as an error; a `result`
//! object without a label is returned as-is and left to the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use traffic_common::EventRecord;

pub const DEFAULT_CLASSIFIER_URL: &str = "http://127.0.0.1:8001";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
const USER_AGENT: &str = concat!("smart-traffic-ingest/", env!("CARGO_PKG_VERSION"));

/// Classification client errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Connection refused, DNS failure, reset, ...
    #[error("Network error: {0}")]
    Network(String),

    /// No response within the client timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Classification service returned a non-success status
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Response body was not a classification envelope
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Response envelope from `/classify`
#[derive(Debug, Clone, Deserialize)]
struct ClassifyEnvelope {
    result: RemoteClassification,
}

/// `result` object of a classification response
///
/// All fields are optional on the wire; only `classification` matters to
/// enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteClassification {
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub model_version: Option<String>,
}

impl RemoteClassification {
    /// Usable label, if the service provided one
    pub fn label(&self) -> Option<&str> {
        self.classification
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
    }
}

/// Anything that can classify a stored event
///
/// The enrichment worker depends on this trait rather than on
/// [`ClassifierClient`] so tests can substitute in-process fakes.
#[async_trait]
pub trait ClassificationService: Send + Sync {
    async fn classify(&self, event: &EventRecord) -> Result<RemoteClassification, ClassifierError>;
}

/// HTTP client for the classification service
#[derive(Debug, Clone)]
pub struct ClassifierClient {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ClassifierClient {
    /// Create a client with its own connection pool and request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClassifierError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http_client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn map_send_error(&self, e: reqwest::Error) -> ClassifierError {
        if e.is_timeout() {
            ClassifierError::Timeout(self.timeout)
        } else {
            ClassifierError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl ClassificationService for ClassifierClient {
    async fn classify(&self, event: &EventRecord) -> Result<RemoteClassification, ClassifierError> {
        let url = format!("{}/classify", self.base_url);

        tracing::debug!(event_id = event.id, url = %url, "Requesting classification");

        let response = self
            .http_client
            .post(&url)
            .json(event)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api(status.as_u16(), error_text));
        }

        let body = response.bytes().await.map_err(|e| self.map_send_error(e))?;
        let envelope: ClassifyEnvelope =
            serde_json::from_slice(&body).map_err(|e| ClassifierError::Parse(e.to_string()))?;

        Ok(envelope.result)
    }
}
