//! Transcoding raw artifacts into deliverable formats.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tokio::sync::watch;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Apple ProRes quality profile, as understood by `prores_ks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProResProfile {
    Proxy,
    Lt,
    #[default]
    Standard422,
    Hq422,
}

impl ProResProfile {
    /// Numeric profile index passed to `-profile:v`.
    pub fn index(&self) -> u8 {
        match self {
            ProResProfile::Proxy => 0,
            ProResProfile::Lt => 1,
            ProResProfile::Standard422 => 2,
            ProResProfile::Hq422 => 3,
        }
    }
}

/// Target format for a transcode step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeProfile {
    /// Apple ProRes 422 in a QuickTime container, PCM audio. The editing
    /// deliverable format.
    ProRes(ProResProfile),
    /// H.264/AAC mezzanine, as required by providers that only accept
    /// H.264 input video.
    H264,
}

impl TranscodeProfile {
    /// Conventional file extension for the container.
    pub fn extension(&self) -> &'static str {
        match self {
            TranscodeProfile::ProRes(_) => "mov",
            TranscodeProfile::H264 => "mp4",
        }
    }
}

/// Synchronous transcode collaborator wrapping the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct Transcoder {
    /// ProRes profile used for deliverables
    profile: ProResProfile,
    /// Per-operation timeout, distinct from job-polling deadlines
    timeout: Duration,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self {
            profile: ProResProfile::default(),
            timeout: Duration::from_secs(900),
        }
    }
}

impl Transcoder {
    pub fn new(profile: ProResProfile, timeout: Duration) -> Self {
        Self { profile, timeout }
    }

    /// Transcode `input` to `output` in the requested format.
    ///
    /// FFmpeg writes to a sibling temp path which is renamed into place
    /// only on success, so a failed run never leaves a partial output
    /// claimed as done. Returns the output path.
    pub async fn transcode(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        profile: TranscodeProfile,
    ) -> MediaResult<PathBuf> {
        self.transcode_with_cancel(input, output, profile, None).await
    }

    /// As [`transcode`](Self::transcode), optionally abortable through a
    /// cancellation channel.
    pub async fn transcode_with_cancel(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        profile: TranscodeProfile,
        cancel_rx: Option<watch::Receiver<bool>>,
    ) -> MediaResult<PathBuf> {
        let input = input.as_ref();
        let output = output.as_ref();

        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp_output = temp_sibling(output);

        info!(
            input = %input.display(),
            output = %output.display(),
            profile = ?profile,
            "Transcoding"
        );

        let cmd = match profile {
            TranscodeProfile::ProRes(prores) => FfmpegCommand::new(input, &tmp_output)
                .video_codec("prores_ks")
                .output_args(["-profile:v", &prores.index().to_string()])
                .output_args(["-vendor", "apl0"])
                .pixel_format("yuv422p10le")
                .audio_codec("pcm_s16le")
                .output_args(["-ar", "48000", "-ac", "2"]),
            TranscodeProfile::H264 => FfmpegCommand::new(input, &tmp_output)
                .video_codec("libx264")
                .output_args(["-preset", "medium", "-crf", "23"])
                .pixel_format("yuv420p")
                .audio_codec("aac")
                .output_args(["-b:a", "192k", "-ar", "48000", "-ac", "2"]),
        };

        let mut runner = FfmpegRunner::new().with_timeout(self.timeout);
        if let Some(rx) = cancel_rx {
            runner = runner.with_cancel(rx);
        }

        if let Err(e) = runner.run(&cmd).await {
            let _ = fs::remove_file(&tmp_output).await;
            return Err(e);
        }

        fs::rename(&tmp_output, output).await?;
        info!(output = %output.display(), "Transcode complete");
        Ok(output.to_path_buf())
    }

    /// Transcode to the configured ProRes deliverable profile.
    pub async fn to_prores(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> MediaResult<PathBuf> {
        self.transcode(input, output, TranscodeProfile::ProRes(self.profile))
            .await
    }

    /// Transcode to the H.264 mezzanine format.
    pub async fn to_h264(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> MediaResult<PathBuf> {
        self.transcode(input, output, TranscodeProfile::H264).await
    }
}

/// Temp path next to `output` (same filesystem, so the final rename is
/// atomic).
fn temp_sibling(output: &Path) -> PathBuf {
    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!(".{}.part", file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prores_profile_indices() {
        assert_eq!(ProResProfile::Proxy.index(), 0);
        assert_eq!(ProResProfile::Standard422.index(), 2);
        assert_eq!(ProResProfile::Hq422.index(), 3);
    }

    #[test]
    fn test_profile_extensions() {
        assert_eq!(TranscodeProfile::ProRes(ProResProfile::Standard422).extension(), "mov");
        assert_eq!(TranscodeProfile::H264.extension(), "mp4");
    }

    #[test]
    fn test_temp_sibling_stays_in_directory() {
        let tmp = temp_sibling(Path::new("/a/b/scene_01_prores.mov"));
        assert_eq!(tmp.parent(), Some(Path::new("/a/b")));
        assert_eq!(
            tmp.file_name().unwrap().to_str().unwrap(),
            ".scene_01_prores.mov.part"
        );
    }

    #[tokio::test]
    async fn test_missing_input_fails_fast() {
        let t = Transcoder::default();
        let err = t
            .to_prores("/nonexistent/input.mp4", "/tmp/out.mov")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
