//! FFmpeg CLI wrapper and artifact handling for the sceneforge pipeline.
//!
//! Covers the synchronous media collaborators of the orchestrator:
//! transcoding raw artifacts into deliverable formats, probing video
//! metadata, extracting reference frames, and streaming artifact
//! downloads. All outputs follow a temp-then-rename discipline so a
//! failed operation never leaves a partial file claimed as success.

pub mod command;
pub mod download;
pub mod error;
pub mod frames;
pub mod probe;
pub mod transcode;

pub use command::{FfmpegCommand, FfmpegRunner};
pub use download::{download_to_file, DEFAULT_DOWNLOAD_TIMEOUT};
pub use error::{MediaError, MediaResult};
pub use frames::{extract_first_frame, extract_last_frame};
pub use probe::{probe_video, VideoInfo};
pub use transcode::{ProResProfile, TranscodeProfile, Transcoder};
