//! Provider error taxonomy.
//!
//! The variants let the orchestrator distinguish "retry internally"
//! (transient network faults) from "fail the scene" without matching on
//! error message strings.

use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur talking to an external provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Caller/input fault; no network call was made
    #[error("validation failed: {0}")]
    Validation(String),

    /// Credentials missing or rejected
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Provider-side terminal failure, carrying the vendor message
    #[error("provider error: {0}")]
    Remote(String),

    /// Network fault that is safe to retry at the poll layer; never
    /// surfaced as a pipeline failure on its own
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Deadline exceeded while the job was still non-terminal
    #[error("timed out after {elapsed_secs}s waiting for job completion")]
    Timeout { elapsed_secs: u64 },

    /// Operation aborted through the cancellation channel
    #[error("operation cancelled")]
    Cancelled,

    /// Expected artifact or record absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Local media normalization failed (frame extraction, re-encode)
    #[error("media error: {0}")]
    Media(#[from] sceneforge_media::MediaError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sceneforge_models::ValidationError> for ProviderError {
    fn from(e: sceneforge_models::ValidationError) -> Self {
        ProviderError::Validation(e.to_string())
    }
}

impl ProviderError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether the poll loop should swallow this error and retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::TransientNetwork(_))
    }

    /// Classify a reqwest failure: connectivity and server-side faults
    /// are transient, client-side auth failures are not.
    pub fn from_http(context: &str, e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return Self::from_status(context, status, e.to_string());
        }
        ProviderError::TransientNetwork(format!("{}: {}", context, e))
    }

    /// Classify an HTTP status from a provider response.
    pub fn from_status(context: &str, status: reqwest::StatusCode, body: String) -> Self {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            ProviderError::Auth(format!("{}: HTTP {}: {}", context, status, body))
        } else if status == reqwest::StatusCode::NOT_FOUND {
            ProviderError::NotFound(format!("{}: HTTP 404: {}", context, body))
        } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ProviderError::TransientNetwork(format!("{}: HTTP {}: {}", context, status, body))
        } else {
            ProviderError::Remote(format!("{}: HTTP {}: {}", context, status, body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::TransientNetwork("x".into()).is_transient());
        assert!(!ProviderError::Remote("x".into()).is_transient());
        assert!(!ProviderError::Timeout { elapsed_secs: 10 }.is_transient());
    }

    #[test]
    fn test_status_classification() {
        let auth = ProviderError::from_status(
            "kling submit",
            reqwest::StatusCode::UNAUTHORIZED,
            "bad key".into(),
        );
        assert!(matches!(auth, ProviderError::Auth(_)));

        let rate = ProviderError::from_status(
            "kling poll",
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "slow down".into(),
        );
        assert!(rate.is_transient());

        let remote = ProviderError::from_status(
            "sora submit",
            reqwest::StatusCode::BAD_REQUEST,
            "bad prompt".into(),
        );
        assert!(matches!(remote, ProviderError::Remote(_)));
    }
}
