//! Shared data models for the sceneforge pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Scene specifications and prompt composition
//! - Persisted per-scene state (status, file references, generation record)
//! - Generation job handles and provider request variants
//! - Scene id sequencing utilities

pub mod job;
pub mod request;
pub mod scene;
pub mod state;
pub mod utils;

// Re-export common types
pub use job::{JobHandle, JobId, JobState, OutputLocator, ProviderKind};
pub use request::{
    AspectRatio, GenerationRequest, KlingMode, KlingRequest, MediaInput, ReplicateRequest,
    SoraRequest, ValidationError, VeoRequest,
};
pub use scene::{ScenePrompt, SceneSpec};
pub use state::{roles, FileReference, GenerationRecord, SceneState, SceneStatus, VideoAnalysis};
pub use utils::{increment_scene_id, sequence_ids};
