//! Persisted per-scene state.
//!
//! One `SceneState` document is stored per scene directory and must always
//! be a valid, parseable snapshot: writers go through the store's atomic
//! save, and every mutation is scoped to a single field (status, one file
//! role, the generation record).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Well-known logical file roles recorded in scene state.
///
/// Each role is written by exactly one pipeline stage; re-runs of that
/// stage overwrite the same role.
pub mod roles {
    /// Raw artifact downloaded from the generation provider
    pub const RAW_VIDEO: &str = "raw_video";
    /// Intermediate ProRes transcode of the raw artifact
    pub const PRORES_VIDEO: &str = "prores_video";
    /// Synthesized dialogue audio
    pub const AUDIO: &str = "audio";
    /// Lip-synced video
    pub const SYNCED_VIDEO: &str = "synced_video";
    /// Final ProRes deliverable
    pub const FINAL_PRORES: &str = "final_prores";
}

/// Scene processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    /// Scene directory and record exist, nothing processed yet
    #[default]
    Created,
    /// Generation job submitted / awaited
    GeneratingVideo,
    /// Artifact download and intermediate transcode
    Processing,
    /// Speech synthesis for dialogue
    GeneratingAudio,
    /// Lip-sync in progress
    LipSyncing,
    /// All stages finished
    Completed,
    /// A stage failed; see the propagated error
    Failed,
    /// No record exists on disk (synthesized by load, never persisted)
    Unknown,
}

impl SceneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneStatus::Created => "created",
            SceneStatus::GeneratingVideo => "generating_video",
            SceneStatus::Processing => "processing",
            SceneStatus::GeneratingAudio => "generating_audio",
            SceneStatus::LipSyncing => "lip_syncing",
            SceneStatus::Completed => "completed",
            SceneStatus::Failed => "failed",
            SceneStatus::Unknown => "unknown",
        }
    }

    /// Terminal statuses require an explicit new pipeline invocation to
    /// leave; no automatic transition occurs out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SceneStatus::Completed | SceneStatus::Failed)
    }
}

impl std::fmt::Display for SceneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted pointer from a logical role to a local file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileReference {
    /// Local filesystem path; the file exists by the time this is recorded
    pub path: String,

    /// Stage-specific metadata (codec, duration, provider, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl FileReference {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Parameters actually used for the most recent generation attempt.
///
/// Written before submission so an inspected scene always shows what was
/// attempted, even if submission subsequently failed. A retry overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationRecord {
    /// Provider name (veo, kling, sora, replicate)
    pub provider: String,
    /// Model identifier within the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// The exact prompt text sent
    pub prompt: String,
    /// Input image reference, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_image: Option<String>,
    /// Input video reference, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_video: Option<String>,
    /// Dialogue text driving speech/lip-sync, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialogue: Option<String>,
    /// Submission timestamp
    pub generated_at: DateTime<Utc>,
}

/// Post-hoc AI description of the generated video.
///
/// Written by an external analysis collaborator, independent of pipeline
/// status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoAnalysis {
    /// Full description
    pub description: String,
    /// Brief one-line description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    /// Searchable tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Model/service that produced the analysis
    pub analyzed_by: String,
    /// Analysis timestamp
    pub analyzed_at: DateTime<Utc>,
}

/// The persisted per-scene record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SceneState {
    /// Scene identifier, primary key
    pub scene_id: String,

    /// Current pipeline status
    #[serde(default)]
    pub status: SceneStatus,

    /// Logical role -> file reference
    #[serde(default)]
    pub files: BTreeMap<String, FileReference>,

    /// Most recent generation attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationRecord>,

    /// Post-hoc video analysis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_analysis: Option<VideoAnalysis>,

    /// Record creation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Last mutation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SceneState {
    /// Fresh record for a newly created scene.
    pub fn new(scene_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            scene_id: scene_id.into(),
            status: SceneStatus::Created,
            files: BTreeMap::new(),
            generation: None,
            video_analysis: None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Synthetic record for a scene with no document on disk.
    pub fn unknown(scene_id: impl Into<String>) -> Self {
        Self {
            scene_id: scene_id.into(),
            status: SceneStatus::Unknown,
            files: BTreeMap::new(),
            generation: None,
            video_analysis: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Set the status and bump the update timestamp.
    pub fn set_status(&mut self, status: SceneStatus) {
        self.status = status;
        self.updated_at = Some(Utc::now());
    }

    /// Insert or overwrite one file role.
    pub fn set_file(&mut self, role: impl Into<String>, reference: FileReference) {
        self.files.insert(role.into(), reference);
        self.updated_at = Some(Utc::now());
    }

    /// Look up a recorded file path by role.
    pub fn file_path(&self, role: &str) -> Option<&str> {
        self.files.get(role).map(|r| r.path.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_created_and_empty() {
        let state = SceneState::new("scene_01");
        assert_eq!(state.status, SceneStatus::Created);
        assert!(state.files.is_empty());
        assert!(state.generation.is_none());
        assert!(state.created_at.is_some());
    }

    #[test]
    fn test_unknown_state_has_no_timestamps() {
        let state = SceneState::unknown("ghost");
        assert_eq!(state.status, SceneStatus::Unknown);
        assert!(state.created_at.is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(SceneStatus::Completed.is_terminal());
        assert!(SceneStatus::Failed.is_terminal());
        assert!(!SceneStatus::GeneratingVideo.is_terminal());
        assert!(!SceneStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_file_roundtrip() {
        let mut state = SceneState::new("scene_01");
        state.set_file(
            roles::RAW_VIDEO,
            FileReference::new("/tmp/scene_01_raw.mp4")
                .with_metadata("provider", serde_json::json!("veo")),
        );
        assert_eq!(state.file_path(roles::RAW_VIDEO), Some("/tmp/scene_01_raw.mp4"));
        assert_eq!(state.file_path(roles::AUDIO), None);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SceneStatus::GeneratingVideo).unwrap();
        assert_eq!(json, "\"generating_video\"");
    }
}
