//! Media step seam.
//!
//! The orchestrator talks to transcoding through this trait so tests can
//! substitute a stub that fabricates output files instead of spawning
//! FFmpeg.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::watch;

use sceneforge_media::{MediaResult, TranscodeProfile, Transcoder};

/// One transcode invocation: input path in, output path out, or an error
/// carrying the tool's diagnostic. Implementations must not leave a
/// partial output claimed as success.
#[async_trait]
pub trait TranscodeStep: Send + Sync {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        profile: TranscodeProfile,
        cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<PathBuf>;
}

#[async_trait]
impl TranscodeStep for Transcoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        profile: TranscodeProfile,
        cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<PathBuf> {
        self.transcode_with_cancel(input, output, profile, cancel).await
    }
}
