//! Classification service client
//!
//! Defines the client trait and wire types for the remote classifier that
//! sorts new TODO lines into groups. Two implementations:
//! - `HttpClassifier`: POSTs JSON to the configured endpoint (production)
//! - `MockClassifier`: returns a preconfigured reply (testing)
//!
//! The classifier is a black box: its reply is handed to reconciliation
//! as-is, which copes with whatever shape comes back.

use crate::config::Settings;
use crate::harvest::GroupedDocument;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Request body sent to the classification endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyRequest {
    /// `"classify"` or `"test"`
    pub action: String,
    /// The lines to classify, newline-separated
    pub content: String,
    /// Current groups of the output document (group → lines)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_groups: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl ClassifyRequest {
    /// A classification request for `lines`.
    pub fn classify<S: AsRef<str>>(
        lines: &[S],
        existing: Option<&GroupedDocument>,
        credential: impl Into<String>,
    ) -> Self {
        let content = lines
            .iter()
            .map(|l| l.as_ref())
            .collect::<Vec<_>>()
            .join("\n");
        let existing_groups = existing.filter(|d| !d.is_empty()).map(|document| {
            document
                .groups()
                .iter()
                .filter(|g| !g.lines.is_empty())
                .map(|g| (g.name.clone(), Value::from(g.lines.clone())))
                .collect::<Map<_, _>>()
        });
        Self {
            action: "classify".to_string(),
            content,
            existing_groups,
            credential: Some(credential.into()),
        }
    }

    /// A connectivity probe.
    pub fn probe() -> Self {
        Self {
            action: "test".to_string(),
            content: "ping".to_string(),
            existing_groups: None,
            credential: None,
        }
    }
}

/// Successful response body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyResponse {
    #[serde(default)]
    classified_content: Option<String>,
}

/// Errors from classification calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("classification request failed: {0}")]
    Transport(String),
    #[error("classification service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("classification response parse error: {0}")]
    Parse(String),
}

/// Client trait for the classification service.
///
/// Abstracts over transport so the harvester does not depend on how the
/// service is reached.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify the request's content.
    ///
    /// Returns the raw classified text; a reply without content yields an
    /// empty string.
    async fn classify(&self, request: &ClassifyRequest) -> Result<String, ClassifyError>;

    /// Check that the service is reachable.
    async fn probe(&self) -> Result<(), ClassifyError>;
}

/// HTTP client for the classification endpoint.
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ClassifyError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ClassifyError> {
        Self::new(settings.classification_endpoint.trim())
    }

    async fn post(&self, request: &ClassifyRequest) -> Result<ClassifyResponse, ClassifyError> {
        debug!(endpoint = %self.endpoint, action = %request.action, "calling classifier");

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ClassifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(ClassifyResponse::default());
        }
        serde_json::from_str(&body).map_err(|e| ClassifyError::Parse(e.to_string()))
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, request: &ClassifyRequest) -> Result<String, ClassifyError> {
        let response = self.post(request).await?;
        Ok(response.classified_content.unwrap_or_default())
    }

    async fn probe(&self) -> Result<(), ClassifyError> {
        self.post(&ClassifyRequest::probe()).await.map(|_| ())
    }
}

/// Mock classifier for testing. Returns a preconfigured reply.
pub struct MockClassifier {
    reply: Result<String, ClassifyError>,
    requests: Mutex<Vec<ClassifyRequest>>,
}

impl MockClassifier {
    /// A classifier that answers every request with `content`.
    pub fn responding(content: impl Into<String>) -> Self {
        Self {
            reply: Ok(content.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A classifier whose every call fails with `error`.
    pub fn failing(error: ClassifyError) -> Self {
        Self {
            reply: Err(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ClassifyRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, request: &ClassifyRequest) -> Result<String, ClassifyError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        self.reply.clone()
    }

    async fn probe(&self) -> Result<(), ClassifyError> {
        self.reply.clone().map(|_| ())
    }
}
