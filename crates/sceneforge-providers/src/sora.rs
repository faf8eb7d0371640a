//! Sora adapter.
//!
//! Sora accepts text or a single reference image. Video input is handled
//! by extracting the source's first frame and submitting image-to-video.
//! The finished clip is served from an authenticated `/content` endpoint,
//! so the client carries its bearer token as a default header and reuses
//! the shared streaming download for the artifact.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use tracing::info;

use sceneforge_media::{
    download_to_file, extract_first_frame, MediaError, DEFAULT_DOWNLOAD_TIMEOUT,
};
use sceneforge_models::{
    AspectRatio, GenerationRequest, JobHandle, MediaInput, OutputLocator, ProviderKind,
    SoraRequest,
};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::GenerationProvider;

/// Sora API key and endpoint.
#[derive(Debug, Clone)]
pub struct SoraConfig {
    pub api_key: String,
    pub base_url: String,
}

impl SoraConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
        }
    }
}

/// Sora generation client.
pub struct SoraClient {
    config: SoraConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct SoraVideo {
    id: String,
    #[serde(default)]
    status: String,
    error: Option<SoraError>,
}

#[derive(Deserialize)]
struct SoraError {
    #[serde(default)]
    message: String,
}

impl SoraClient {
    pub fn new(config: SoraConfig) -> ProviderResult<Self> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| ProviderError::auth("sora api key contains invalid characters"))?;
        headers.insert(AUTHORIZATION, value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::TransientNetwork(e.to_string()))?;

        Ok(Self { config, http })
    }

    /// Pixel dimensions for the configured resolution and aspect.
    fn size(resolution: &str, aspect: AspectRatio) -> String {
        let (long, short) = match resolution {
            "1080p" => (1792u32, 1024u32),
            _ => (1280, 720),
        };
        match aspect {
            AspectRatio::Portrait => format!("{}x{}", short, long),
            AspectRatio::Square => format!("{}x{}", short, short),
            AspectRatio::Widescreen => format!("{}x{}", long, short),
        }
    }

    /// Resolve the reference image for the submission, extracting the
    /// first frame when the scene continues from a video.
    async fn reference_image(&self, request: &SoraRequest) -> ProviderResult<Option<PathBuf>> {
        if let Some(video) = &request.input_video {
            let path = match video {
                MediaInput::LocalFile(p) => PathBuf::from(p),
                other => {
                    return Err(ProviderError::validation(format!(
                        "sora video input must be a local file, got {}",
                        other.as_str()
                    )))
                }
            };
            let frame = frame_sibling(&path);
            extract_first_frame(&path, &frame).await?;
            return Ok(Some(frame));
        }

        match &request.input_image {
            None => Ok(None),
            Some(MediaInput::LocalFile(p)) => Ok(Some(PathBuf::from(p))),
            Some(MediaInput::Url(url)) => {
                // The API wants an upload, not a URL; pull it down first
                let local = std::env::temp_dir().join(format!(
                    "sora_ref_{}.jpg",
                    chrono::Utc::now().timestamp_millis()
                ));
                download_to_file(&self.http, url, &local, DEFAULT_DOWNLOAD_TIMEOUT).await?;
                Ok(Some(local))
            }
            Some(MediaInput::GcsUri(uri)) => Err(ProviderError::validation(format!(
                "sora cannot read GCS URIs: {}",
                uri
            ))),
        }
    }

    async fn submit_sora(&self, request: &SoraRequest) -> ProviderResult<JobHandle> {
        let mut form = reqwest::multipart::Form::new()
            .text("model", request.model.clone())
            .text("prompt", request.prompt.clone())
            .text("seconds", request.duration_secs.to_string())
            .text(
                "size",
                Self::size(&request.resolution, request.aspect_ratio),
            );

        if let Some(image) = self.reference_image(request).await? {
            let bytes = tokio::fs::read(&image)
                .await
                .map_err(|_| MediaError::FileNotFound(image.clone()))?;
            let file_name = image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "reference.jpg".to_string());
            form = form.part(
                "input_reference",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        }

        let response = self
            .http
            .post(format!("{}/v1/videos", self.config.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::from_http("sora submit", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("sora submit", status, text));
        }

        let video: SoraVideo = response
            .json()
            .await
            .map_err(|e| ProviderError::from_http("sora submit", e))?;

        info!(video_id = %video.id, model = %request.model, "Submitted Sora generation");
        Ok(JobHandle::submitted(ProviderKind::Sora, video.id))
    }
}

fn frame_sibling(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    video.with_file_name(format!("{}_first_frame.jpg", stem))
}

#[async_trait]
impl GenerationProvider for SoraClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Sora
    }

    fn min_poll_interval(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn submit(&self, request: &GenerationRequest) -> ProviderResult<JobHandle> {
        match request {
            GenerationRequest::Sora(r) => self.submit_sora(r).await,
            other => Err(ProviderError::validation(format!(
                "sora client received a {} request",
                other.provider()
            ))),
        }
    }

    async fn poll(&self, handle: &JobHandle) -> ProviderResult<JobHandle> {
        let url = format!("{}/v1/videos/{}", self.config.base_url, handle.task_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::from_http("sora poll", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("sora poll", status, text));
        }

        let video: SoraVideo = response
            .json()
            .await
            .map_err(|e| ProviderError::from_http("sora poll", e))?;

        match video.status.as_str() {
            "completed" => {
                let content_url = format!(
                    "{}/v1/videos/{}/content",
                    self.config.base_url, handle.task_id
                );
                Ok(handle.clone().completed(OutputLocator::Url { url: content_url }))
            }
            "failed" => {
                let msg = video
                    .error
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "sora generation failed".to_string());
                Ok(handle.clone().failed(msg))
            }
            _ => Ok(handle.clone().processing()),
        }
    }

    async fn fetch_artifact(&self, handle: &JobHandle, dest: &Path) -> ProviderResult<PathBuf> {
        match &handle.output {
            Some(OutputLocator::Url { url }) => {
                let path =
                    download_to_file(&self.http, url, dest, DEFAULT_DOWNLOAD_TIMEOUT).await?;
                Ok(path)
            }
            _ => Err(ProviderError::not_found(format!(
                "job {} has no downloadable output",
                handle.job_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_mapping() {
        assert_eq!(SoraClient::size("720p", AspectRatio::Widescreen), "1280x720");
        assert_eq!(SoraClient::size("720p", AspectRatio::Portrait), "720x1280");
        assert_eq!(SoraClient::size("1080p", AspectRatio::Widescreen), "1792x1024");
    }

    #[test]
    fn test_frame_sibling_path() {
        let frame = frame_sibling(Path::new("/scenes/s1/s1_raw.mp4"));
        assert_eq!(frame, Path::new("/scenes/s1/s1_raw_first_frame.jpg"));
    }
}
