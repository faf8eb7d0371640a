//! Generation job handles.
//!
//! A `JobHandle` is the transient, orchestrator-owned view of one in-flight
//! generation request. It is never persisted beyond the current process and
//! never shared across scenes.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique, orchestrator-assigned identifier for a job submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID, prefixed by the provider name.
    pub fn new(provider: ProviderKind) -> Self {
        Self(format!("{}_job_{}", provider.as_str(), Uuid::new_v4()))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported generation providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google Veo (Vertex AI long-running operations)
    Veo,
    /// Kling AI
    Kling,
    /// OpenAI Sora
    Sora,
    /// Replicate-hosted Wan models
    Replicate,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Veo => "veo",
            ProviderKind::Kling => "kling",
            ProviderKind::Sora => "sora",
            ProviderKind::Replicate => "replicate",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "veo" => Ok(ProviderKind::Veo),
            "kling" => Ok(ProviderKind::Kling),
            "sora" => Ok(ProviderKind::Sora),
            "replicate" => Ok(ProviderKind::Replicate),
            other => Err(format!(
                "unknown provider '{}' (expected veo, kling, sora or replicate)",
                other
            )),
        }
    }
}

/// Job state as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted by the provider, not yet observed processing
    #[default]
    Submitted,
    /// Provider reports the job as running
    Processing,
    /// Artifact is ready for download
    Completed,
    /// Provider reported a terminal failure
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Submitted => "submitted",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Where a completed artifact can be fetched from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OutputLocator {
    /// Direct HTTP(S) download URL
    Url { url: String },
    /// GCS location whose final object name must be discovered by listing
    /// the prefix (nested `operation_id/sample_0.mp4` layout)
    GcsPrefix { bucket: String, prefix: String },
    /// Artifact bytes carried inline in the provider response, base64
    /// encoded (small outputs when no storage bucket is configured)
    Inline { bytes_base64: String },
}

/// Handle for one in-flight (or finished) generation request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobHandle {
    /// Orchestrator-assigned id, unique per submission
    pub job_id: JobId,

    /// Provider-side opaque token (task id, operation name, prediction id)
    pub task_id: String,

    /// Provider that owns the job
    pub provider: ProviderKind,

    /// Last observed state
    pub state: JobState,

    /// Submission timestamp
    pub submitted_at: DateTime<Utc>,

    /// Artifact location, present once `state == Completed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputLocator>,

    /// Provider failure message, present once `state == Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobHandle {
    /// New handle for a freshly submitted job.
    pub fn submitted(provider: ProviderKind, task_id: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(provider),
            task_id: task_id.into(),
            provider,
            state: JobState::Submitted,
            submitted_at: Utc::now(),
            output: None,
            error: None,
        }
    }

    /// Mark the handle as still processing.
    pub fn processing(mut self) -> Self {
        self.state = JobState::Processing;
        self
    }

    /// Mark the handle completed with an artifact locator.
    pub fn completed(mut self, output: OutputLocator) -> Self {
        self.state = JobState::Completed;
        self.output = Some(output);
        self
    }

    /// Mark the handle failed with the provider's message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.state = JobState::Failed;
        self.error = Some(error.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_carries_provider_prefix() {
        let id = JobId::new(ProviderKind::Kling);
        assert!(id.as_str().starts_with("kling_job_"));
    }

    #[test]
    fn test_handle_transitions() {
        let handle = JobHandle::submitted(ProviderKind::Sora, "video_abc");
        assert_eq!(handle.state, JobState::Submitted);
        assert!(!handle.is_terminal());

        let done = handle.completed(OutputLocator::Url {
            url: "https://cdn.example/clip.mp4".into(),
        });
        assert!(done.is_terminal());
        assert!(done.output.is_some());
        assert!(done.error.is_none());
    }

    #[test]
    fn test_failed_handle_keeps_message() {
        let handle = JobHandle::submitted(ProviderKind::Veo, "op/123")
            .failed("content policy violation");
        assert_eq!(handle.state, JobState::Failed);
        assert_eq!(handle.error.as_deref(), Some("content policy violation"));
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("Veo".parse::<ProviderKind>().unwrap(), ProviderKind::Veo);
        assert!("pika".parse::<ProviderKind>().is_err());
    }
}
