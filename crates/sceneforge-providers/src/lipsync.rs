//! Lip-sync via Replicate-hosted models.
//!
//! Lip-sync is a prediction like any other Replicate job, but with two
//! local media inputs (the generated clip and the synthesized dialogue
//! audio) inlined as data URIs. Predictions run for minutes, so the job
//! goes through the shared [`await_completion`] loop rather than sync
//! mode.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tokio::sync::watch;
use tracing::info;

use sceneforge_media::{download_to_file, DEFAULT_DOWNLOAD_TIMEOUT};
use sceneforge_models::{GenerationRequest, JobHandle, OutputLocator, ProviderKind};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{await_completion, GenerationProvider, PollSettings};
use crate::replicate::{handle_from_prediction, Prediction, ReplicateConfig};

/// A lip-sync backend: re-render a clip so the mouth matches the audio.
#[async_trait]
pub trait LipSyncer: Send + Sync {
    async fn lip_sync(
        &self,
        video: &Path,
        audio: &Path,
        dest: &Path,
        timeout: Duration,
        cancel: Option<watch::Receiver<bool>>,
    ) -> ProviderResult<PathBuf>;
}

/// Replicate-hosted lip-sync model client.
pub struct ReplicateLipSync {
    config: ReplicateConfig,
    model: String,
    http: reqwest::Client,
}

impl ReplicateLipSync {
    pub const DEFAULT_MODEL: &'static str = "bytedance/latentsync";

    pub fn new(config: ReplicateConfig) -> ProviderResult<Self> {
        Self::with_model(config, Self::DEFAULT_MODEL)
    }

    pub fn with_model(config: ReplicateConfig, model: impl Into<String>) -> ProviderResult<Self> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {}", config.api_token))
            .map_err(|_| ProviderError::auth("replicate token contains invalid characters"))?;
        headers.insert(AUTHORIZATION, value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::TransientNetwork(e.to_string()))?;

        Ok(Self {
            config,
            model: model.into(),
            http,
        })
    }

    async fn data_uri(path: &Path, mime: &str) -> ProviderResult<String> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ProviderError::validation(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(format!("data:{};base64,{}", mime, BASE64.encode(bytes)))
    }

    async fn submit_prediction(&self, video: &Path, audio: &Path) -> ProviderResult<JobHandle> {
        let input = serde_json::json!({
            "video": Self::data_uri(video, "video/mp4").await?,
            "audio": Self::data_uri(audio, "audio/mpeg").await?,
        });

        let url = format!(
            "{}/v1/models/{}/predictions",
            self.config.base_url, self.model
        );
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await
            .map_err(|e| ProviderError::from_http("lipsync submit", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("lipsync submit", status, text));
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| ProviderError::from_http("lipsync submit", e))?;

        info!(prediction_id = %prediction.id, model = %self.model, "Submitted lip-sync prediction");
        Ok(handle_from_prediction(
            JobHandle::submitted(ProviderKind::Replicate, prediction.id.clone()),
            prediction,
        ))
    }
}

#[async_trait]
impl GenerationProvider for ReplicateLipSync {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Replicate
    }

    fn min_poll_interval(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn submit(&self, _request: &GenerationRequest) -> ProviderResult<JobHandle> {
        Err(ProviderError::validation(
            "lip-sync jobs are submitted through LipSyncer::lip_sync",
        ))
    }

    async fn poll(&self, handle: &JobHandle) -> ProviderResult<JobHandle> {
        let url = format!("{}/v1/predictions/{}", self.config.base_url, handle.task_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::from_http("lipsync poll", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("lipsync poll", status, text));
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| ProviderError::from_http("lipsync poll", e))?;
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

#[async_trait]
impl LipSyncer for ReplicateLipSync {
    async fn lip_sync(
        &self,
        video: &Path,
        audio: &Path,
        dest: &Path,
        timeout: Duration,
        cancel: Option<watch::Receiver<bool>>,
    ) -> ProviderResult<PathBuf> {
        for input in [video, audio] {
            if !input.exists() {
                return Err(ProviderError::validation(format!(
                    "lip-sync input missing: {}",
                    input.display()
                )));
            }
        }

        let handle = self.submit_prediction(video, audio).await?;
        let settings = PollSettings::new(timeout, self.min_poll_interval());
        let done = await_completion(self, handle, settings, cancel).await?;
        self.fetch_artifact(&done, dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_inputs_rejected_before_any_request() {
        let lipsync =
            ReplicateLipSync::new(ReplicateConfig::new("token")).unwrap();
        let err = lipsync
            .lip_sync(
                Path::new("/nonexistent/clip.mp4"),
                Path::new("/nonexistent/audio.mp3"),
                Path::new("/tmp/out.mp4"),
                Duration::from_secs(1),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_generic_submit_is_rejected() {
        let lipsync =
            ReplicateLipSync::new(ReplicateConfig::new("token")).unwrap();
        let request = GenerationRequest::Replicate(
            sceneforge_models::ReplicateRequest::new(
                "wan-2.2-t2v-fast",
                "prompt",
                5,
                16,
                "480p",
                sceneforge_models::AspectRatio::Widescreen,
                None,
                None,
                None,
            )
            .unwrap(),
        );
        let err = lipsync.submit(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }
}
