//! Replicate adapter for Wan video models.
//!
//! Submission runs in sync mode (`Prefer: wait`): the response usually
//! carries a terminal prediction, so `submit` can hand back a handle the
//! poll loop exits on immediately. Long renders that outlive the sync
//! window fall back to normal polling.
//!
//! Continuation from a previous clip works by pulling the source video's
//! last frame and submitting it to an image-to-video model.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use tracing::info;

use sceneforge_media::{download_to_file, extract_last_frame, DEFAULT_DOWNLOAD_TIMEOUT};
use sceneforge_models::{
    GenerationRequest, JobHandle, MediaInput, OutputLocator, ProviderKind, ReplicateRequest,
};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::GenerationProvider;

/// Replicate API token and endpoint.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_token: String,
    pub base_url: String,
}

impl ReplicateConfig {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: "https://api.replicate.com".to_string(),
        }
    }
}

/// Replicate prediction client for Wan models.
pub struct ReplicateClient {
    config: ReplicateConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
pub(crate) struct Prediction {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) status: String,
    pub(crate) output: Option<serde_json::Value>,
    pub(crate) error: Option<serde_json::Value>,
}

impl Prediction {
    /// Output URL; the models return either a bare string or a one
    /// element array.
    pub(crate) fn output_url(&self) -> Option<String> {
        match &self.output {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .find_map(|v| v.as_str().map(|s| s.to_string())),
            _ => None,
        }
    }

    pub(crate) fn error_message(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "replicate prediction failed".to_string(),
        }
    }
}

impl ReplicateClient {
    pub fn new(config: ReplicateConfig) -> ProviderResult<Self> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {}", config.api_token))
            .map_err(|_| ProviderError::auth("replicate token contains invalid characters"))?;
        headers.insert(AUTHORIZATION, value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::TransientNetwork(e.to_string()))?;

        Ok(Self { config, http })
    }

    /// Image payload for the prediction input: URLs pass through, local
    /// files become data URIs.
    async fn image_payload(image: &MediaInput) -> ProviderResult<String> {
        match image {
            MediaInput::Url(url) => Ok(url.clone()),
            MediaInput::GcsUri(uri) => Err(ProviderError::validation(format!(
                "replicate cannot read GCS URIs: {}",
                uri
            ))),
            MediaInput::LocalFile(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    ProviderError::validation(format!("cannot read image {}: {}", path, e))
                })?;
                let mime = if path.ends_with(".png") { "image/png" } else { "image/jpeg" };
                Ok(format!("data:{};base64,{}", mime, BASE64.encode(bytes)))
            }
        }
    }

    async fn prediction_input(
        &self,
        request: &ReplicateRequest,
    ) -> ProviderResult<serde_json::Value> {
        let mut input = serde_json::json!({
            "prompt": request.effective_prompt(),
            "num_frames": request.num_frames,
            "frames_per_second": request.fps,
            "resolution": request.resolution,
            "aspect_ratio": request.aspect_ratio.as_str(),
            "sample_shift": request.sample_shift,
        });
        if let Some(seed) = request.seed {
            input["seed"] = serde_json::json!(seed);
        }

        // Continuation: seed i2v with the last frame of the source clip
        let image = if let Some(video) = &request.input_video {
            let source = match video {
                MediaInput::LocalFile(p) => PathBuf::from(p),
                other => {
                    return Err(ProviderError::validation(format!(
                        "replicate video input must be a local file, got {}",
                        other.as_str()
                    )))
                }
            };
            let frame = last_frame_sibling(&source);
            extract_last_frame(&source, &frame).await?;
            Some(MediaInput::LocalFile(frame.to_string_lossy().into_owned()))
        } else {
            request.input_image.clone()
        };

        if let Some(image) = image {
            input["image"] = serde_json::json!(Self::image_payload(&image).await?);
        }
        Ok(input)
    }

    async fn submit_replicate(&self, request: &ReplicateRequest) -> ProviderResult<JobHandle> {
        let input = self.prediction_input(request).await?;
        let url = format!(
            "{}/v1/models/{}/predictions",
            self.config.base_url,
            request.model_id()
        );

        let response = self
            .http
            .post(&url)
            .header("Prefer", "wait")
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await
            .map_err(|e| ProviderError::from_http("replicate submit", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("replicate submit", status, text));
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| ProviderError::from_http("replicate submit", e))?;

        info!(
            prediction_id = %prediction.id,
            model = %request.model,
            status = %prediction.status,
            "Submitted Replicate prediction"
        );
        Ok(handle_from_prediction(
            JobHandle::submitted(ProviderKind::Replicate, prediction.id.clone()),
            prediction,
        ))
    }
}

pub(crate) fn handle_from_prediction(handle: JobHandle, prediction: Prediction) -> JobHandle {
    match prediction.status.as_str() {
        "succeeded" => match prediction.output_url() {
            Some(url) => handle.completed(OutputLocator::Url { url }),
            None => handle.failed("prediction succeeded but returned no output url"),
        },
        "failed" | "canceled" => {
            let msg = prediction.error_message();
            handle.failed(msg)
        }
        _ => handle.processing(),
    }
}

fn last_frame_sibling(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    video.with_file_name(format!("{}_last_frame.jpg", stem))
}

#[async_trait]
impl GenerationProvider for ReplicateClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Replicate
    }

    fn min_poll_interval(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn submit(&self, request: &GenerationRequest) -> ProviderResult<JobHandle> {
        match request {
            GenerationRequest::Replicate(r) => self.submit_replicate(r).await,
            other => Err(ProviderError::validation(format!(
                "replicate client received a {} request",
                other.provider()
            ))),
        }
    }

    async fn poll(&self, handle: &JobHandle) -> ProviderResult<JobHandle> {
        let url = format!("{}/v1/predictions/{}", self.config.base_url, handle.task_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::from_http("replicate poll", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("replicate poll", status, text));
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| ProviderError::from_http("replicate poll", e))?;
        Ok(handle_from_prediction(handle.clone(), prediction))
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
    use sceneforge_models::JobState;

    fn prediction(status: &str, output: Option<serde_json::Value>) -> Prediction {
        Prediction {
            id: "p1".into(),
            status: status.into(),
            output,
            error: None,
        }
    }

    #[test]
    fn test_sync_submit_maps_terminal_states() {
        let base = JobHandle::submitted(ProviderKind::Replicate, "p1");
        let done = handle_from_prediction(
            base.clone(),
            prediction("succeeded", Some(serde_json::json!("https://r.delivery/x.mp4"))),
        );
        assert_eq!(done.state, JobState::Completed);

        let arr = handle_from_prediction(
            base.clone(),
            prediction("succeeded", Some(serde_json::json!(["https://r.delivery/x.mp4"]))),
        );
        assert!(matches!(
            arr.output,
            Some(OutputLocator::Url { ref url }) if url == "https://r.delivery/x.mp4"
        ));

        let running = handle_from_prediction(base.clone(), prediction("processing", None));
        assert_eq!(running.state, JobState::Processing);

        let failed = handle_from_prediction(base, prediction("failed", None));
        assert_eq!(failed.state, JobState::Failed);
    }

    #[test]
    fn test_succeeded_without_output_is_failure() {
        let base = JobHandle::submitted(ProviderKind::Replicate, "p1");
        let h = handle_from_prediction(base, prediction("succeeded", None));
        assert_eq!(h.state, JobState::Failed);
    }

    #[test]
    fn test_last_frame_sibling() {
        let frame = last_frame_sibling(Path::new("/scenes/s1/s1_raw.mp4"));
        assert_eq!(frame, Path::new("/scenes/s1/s1_raw_last_frame.jpg"));
    }
}
