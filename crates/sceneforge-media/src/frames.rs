//! Reference frame extraction.
//!
//! Providers that only accept image input get a frame pulled from the
//! source video: the first frame when the image seeds a fresh generation,
//! the last frame when continuing an existing clip.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Extract the first frame of `video` to `dest` (JPEG).
pub async fn extract_first_frame(
    video: impl AsRef<Path>,
    dest: impl AsRef<Path>,
) -> MediaResult<PathBuf> {
    let video = video.as_ref();
    let dest = dest.as_ref();

    ensure_input(video).await?;
    prepare_dest(dest).await?;

    let cmd = FfmpegCommand::new(video, dest)
        .single_frame()
        .output_args(["-f", "image2"]);
    FfmpegRunner::new().run(&cmd).await?;

    info!(video = %video.display(), frame = %dest.display(), "Extracted first frame");
    Ok(dest.to_path_buf())
}

/// Extract the last decodable frame of `video` to `dest` (JPEG).
///
/// Seeks 0.1s from the end of the stream; falls back to the first frame
/// when the tail seek produces nothing (some fragmented files).
pub async fn extract_last_frame(
    video: impl AsRef<Path>,
    dest: impl AsRef<Path>,
) -> MediaResult<PathBuf> {
    let video = video.as_ref();
    let dest = dest.as_ref();

    ensure_input(video).await?;
    prepare_dest(dest).await?;

    let cmd = FfmpegCommand::new(video, dest)
        .seek_from_end(-0.1)
        .single_frame()
        .output_args(["-f", "image2", "-update", "1"]);

    match FfmpegRunner::new().run(&cmd).await {
        Ok(()) if dest.exists() => {
            info!(video = %video.display(), frame = %dest.display(), "Extracted last frame");
            Ok(dest.to_path_buf())
        }
        Ok(()) | Err(_) => {
            tracing::warn!(
                video = %video.display(),
                "Last frame extraction failed, falling back to first frame"
            );
            extract_first_frame(video, dest).await
        }
    }
}

async fn ensure_input(video: &Path) -> MediaResult<()> {
    if !video.exists() {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }
    Ok(())
}

async fn prepare_dest(dest: &Path) -> MediaResult<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_video_rejected() {
        let err = extract_first_frame("/nonexistent.mp4", "/tmp/frame.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
