//! REST client for the generation backend's HTTP endpoints.
//!
//! Wraps the backend wire contract (asset upload, workflow submission,
//! status query, result retrieval) using [`reqwest`]. Every operation is a
//! single remote round-trip; classification of failures into retryable and
//! terminal lives here, the retry decision itself does not.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

/// Timeout applied to each HTTP round-trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend-reported status of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Accepted, waiting for a GPU slot.
    Queued,
    /// Generation is underway.
    Running,
    /// Finished; the artifact can be retrieved.
    Succeeded,
    /// The backend rejected the job after accepting it.
    Failed { reason: String },
    /// The backend does not (or no longer) know the handle.
    NotFound,
}

/// Errors from the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (network, DNS, timeout) or the body
    /// could not be decoded.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The backend base URL was rejected at construction.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Whether a retry may plausibly succeed.
    ///
    /// Connection-level faults and 5xx responses are transient; 4xx
    /// responses, malformed bodies, and bad URLs are deterministic
    /// rejections that would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Request(e) => !e.is_decode(),
            TransportError::Api { status, .. } => *status >= 500,
            TransportError::InvalidUrl(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

/// Response returned by `POST /upload`.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "assetRef")]
    asset_ref: String,
}

/// Response returned by `POST /submit` after queueing a workflow.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "remoteHandle")]
    remote_handle: String,
}

/// Wire representation of `GET /status/{remoteHandle}`.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    state: WireState,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl StatusResponse {
    fn into_status(self) -> JobStatus {
        match self.state {
            WireState::Queued => JobStatus::Queued,
            WireState::Running => JobStatus::Running,
            WireState::Succeeded => JobStatus::Succeeded,
            WireState::Failed => JobStatus::Failed {
                reason: self
                    .reason
                    .unwrap_or_else(|| "unspecified backend failure".to_string()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// The four wire operations, abstracted so the worker pool can be driven
/// against an in-memory fake in tests.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send raw asset bytes; returns an opaque reference the backend can
    /// resolve later.
    async fn upload(&self, bytes: Vec<u8>) -> Result<String, TransportError>;

    /// Enqueue a generation request built from a workflow template, an
    /// uploaded asset reference, and named parameters. Returns the
    /// backend's job identifier without waiting for generation.
    async fn submit(
        &self,
        template: &serde_json::Value,
        asset_ref: &str,
        params: &serde_json::Value,
    ) -> Result<String, TransportError>;

    /// Single non-blocking state query for a submitted job.
    async fn status(&self, remote_handle: &str) -> Result<JobStatus, TransportError>;

    /// Retrieve the artifact bytes; valid only after [`Backend::status`]
    /// reports [`JobStatus::Succeeded`].
    async fn result(&self, remote_handle: &str) -> Result<Vec<u8>, TransportError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// HTTP client for a single backend endpoint.
#[derive(Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a client for the backend at `base_url` (e.g. `http://host:8188`).
    ///
    /// Fails if the URL does not parse or the underlying client cannot be
    /// built; this is the only transport failure that aborts a run before
    /// it starts.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        reqwest::Url::parse(base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the response
    /// unchanged on success, or a [`TransportError::Api`] containing the
    /// status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn upload(&self, bytes: Vec<u8>) -> Result<String, TransportError> {
        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .body(bytes)
            .send()
            .await?;

        let parsed: UploadResponse = Self::parse_response(response).await?;
        Ok(parsed.asset_ref)
    }

    async fn submit(
        &self,
        template: &serde_json::Value,
        asset_ref: &str,
        params: &serde_json::Value,
    ) -> Result<String, TransportError> {
        let body = serde_json::json!({
            "template": template,
            "assetRef": asset_ref,
            "params": params,
        });

        let response = self
            .client
            .post(format!("{}/submit", self.base_url))
            .json(&body)
            .send()
            .await?;

        let parsed: SubmitResponse = Self::parse_response(response).await?;
        Ok(parsed.remote_handle)
    }

    async fn status(&self, remote_handle: &str) -> Result<JobStatus, TransportError> {
        let response = self
            .client
            .get(format!("{}/status/{}", self.base_url, remote_handle))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(JobStatus::NotFound);
        }

        let parsed: StatusResponse = Self::parse_response(response).await?;
        Ok(parsed.into_status())
    }

    async fn result(&self, remote_handle: &str) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .get(format!("{}/result/{}", self.base_url, remote_handle))
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // -- error classification -------------------------------------------------

    #[test]
    fn server_errors_are_retryable() {
        let err = TransportError::Api {
            status: 503,
            body: "overloaded".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn client_errors_are_terminal() {
        let err = TransportError::Api {
            status: 415,
            body: "unsupported media type".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn invalid_url_is_terminal() {
        assert!(!TransportError::InvalidUrl("nope".to_string()).is_retryable());
    }

    // -- construction ---------------------------------------------------------

    #[test]
    fn new_rejects_unparsable_url() {
        let err = HttpBackend::new("not a url").unwrap_err();
        assert_matches!(err, TransportError::InvalidUrl(_));
    }

    #[test]
    fn new_strips_trailing_slash() {
        let backend = HttpBackend::new("http://localhost:8188/").unwrap();
        assert_eq!(backend.base_url, "http://localhost:8188");
    }

    // -- status mapping -------------------------------------------------------

    #[test]
    fn status_response_maps_states() {
        let queued = StatusResponse {
            state: WireState::Queued,
            reason: None,
        };
        assert_eq!(queued.into_status(), JobStatus::Queued);

        let failed = StatusResponse {
            state: WireState::Failed,
            reason: Some("model_error".to_string()),
        };
        assert_eq!(
            failed.into_status(),
            JobStatus::Failed {
                reason: "model_error".to_string()
            }
        );
    }

    #[test]
    fn failed_without_reason_gets_placeholder() {
        let failed = StatusResponse {
            state: WireState::Failed,
            reason: None,
        };
        assert_matches!(
            failed.into_status(),
            JobStatus::Failed { reason } if reason.contains("unspecified")
        );
    }

    #[test]
    fn status_wire_format_parses() {
        let parsed: StatusResponse =
            serde_json::from_str(r#"{"state":"running"}"#).expect("valid wire body");
        assert_eq!(parsed.into_status(), JobStatus::Running);
    }
}
