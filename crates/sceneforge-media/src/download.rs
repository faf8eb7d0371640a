//! Streaming artifact download.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{MediaError, MediaResult};

/// Default per-download timeout, distinct from job-polling deadlines.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Stream `url` to `dest`, creating parent directories.
///
/// The body is streamed to a sibling temp file and renamed into place on
/// success; an interrupted download leaves no partial file at `dest`.
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    dest: impl AsRef<Path>,
    timeout: Duration,
) -> MediaResult<PathBuf> {
    let dest = dest.as_ref();

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    info!(url = %url, dest = %dest.display(), "Downloading artifact");

    let result = tokio::time::timeout(timeout, stream_body(client, url, dest)).await;
    match result {
        Ok(Ok(bytes)) => {
            info!(dest = %dest.display(), bytes = bytes, "Download complete");
            Ok(dest.to_path_buf())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            let _ = fs::remove_file(temp_path(dest)).await;
            Err(MediaError::Timeout(timeout.as_secs()))
        }
    }
}

async fn stream_body(client: &reqwest::Client, url: &str, dest: &Path) -> MediaResult<u64> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| MediaError::download_failed(format!("request to {} failed: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(MediaError::download_failed(format!(
            "{} returned HTTP {}",
            url,
            response.status()
        )));
    }

    let tmp = temp_path(dest);
    let mut file = fs::File::create(&tmp).await?;
    let mut stream = response.bytes_stream();
    let mut total = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&tmp).await;
                return Err(MediaError::download_failed(format!(
                    "stream from {} interrupted: {}",
                    url, e
                )));
            }
        };
        file.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }

    file.flush().await?;
    drop(file);

    fs::rename(&tmp, dest).await?;
    Ok(total)
}

fn temp_path(dest: &Path) -> PathBuf {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    dest.with_file_name(format!(".{}.part", file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_is_sibling() {
        let tmp = temp_path(Path::new("/scenes/s1/s1_raw.mp4"));
        assert_eq!(tmp, Path::new("/scenes/s1/.s1_raw.mp4.part"));
    }
}
