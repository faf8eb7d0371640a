//! Scene orchestration: the per-scene state machine and batch runner.
//!
//! [`ScenePipeline`] drives one scene from `created` to `completed`
//! (or `failed`), persisting every status transition and file reference
//! through the scene store before moving on. [`BatchRunner`] runs a list
//! of scenes with per-scene failure isolation and optional bounded
//! parallelism.

pub mod batch;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod steps;

pub use batch::{BatchError, BatchOptions, BatchRunner};
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{ScenePipeline, SceneResult};
pub use steps::TranscodeStep;
