//! Kling adapter.
//!
//! Kling authenticates with short-lived HS256 JWTs minted from an
//! access-key/secret-key pair. Tokens live 30 minutes; the client caches
//! one and re-mints when it is within a minute of expiry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use sceneforge_media::{download_to_file, DEFAULT_DOWNLOAD_TIMEOUT};
use sceneforge_models::{
    GenerationRequest, JobHandle, KlingRequest, MediaInput, OutputLocator, ProviderKind,
};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::GenerationProvider;

const TOKEN_TTL_SECS: i64 = 1800;
const TOKEN_REUSE_BUFFER_SECS: i64 = 60;

/// Kling API credentials and endpoint.
#[derive(Debug, Clone)]
pub struct KlingConfig {
    pub access_key: String,
    pub secret_key: String,
    pub base_url: String,
}

impl KlingConfig {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            base_url: "https://api.klingai.com".to_string(),
        }
    }
}

#[derive(Serialize)]
struct KlingClaims {
    iss: String,
    exp: i64,
    nbf: i64,
}

struct CachedToken {
    token: String,
    expires_at: i64,
}

/// Kling generation client.
pub struct KlingClient {
    config: KlingConfig,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct KlingEnvelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct KlingTask {
    task_id: String,
    #[serde(default)]
    task_status: String,
    #[serde(default)]
    task_status_msg: String,
    task_result: Option<KlingTaskResult>,
}

#[derive(Deserialize)]
struct KlingTaskResult {
    #[serde(default)]
    videos: Vec<KlingVideo>,
}

#[derive(Deserialize)]
struct KlingVideo {
    url: String,
}

impl KlingClient {
    pub fn new(config: KlingConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    /// Current bearer token, minting a fresh one when the cached token is
    /// within the reuse buffer of expiry.
    async fn bearer_token(&self) -> ProviderResult<String> {
        let now = Utc::now().timestamp();
        let mut guard = self.token.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.expires_at - now > TOKEN_REUSE_BUFFER_SECS {
                return Ok(cached.token.clone());
            }
        }

        let expires_at = now + TOKEN_TTL_SECS;
        let claims = KlingClaims {
            iss: self.config.access_key.clone(),
            exp: expires_at,
            nbf: now - 5,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.secret_key.as_bytes()),
        )
        .map_err(|e| ProviderError::auth(format!("failed to sign Kling JWT: {}", e)))?;

        debug!(expires_at, "Minted Kling API token");
        *guard = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }

    /// Resolve an image reference to what the API accepts: URLs pass
    /// through, local files are inlined as base64.
    async fn image_payload(&self, image: &MediaInput) -> ProviderResult<String> {
        match image {
            MediaInput::Url(url) => Ok(url.clone()),
            MediaInput::GcsUri(uri) => Err(ProviderError::validation(format!(
                "kling cannot read GCS URIs directly: {}",
                uri
            ))),
            MediaInput::LocalFile(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    ProviderError::validation(format!("cannot read image {}: {}", path, e))
                })?;
                Ok(BASE64.encode(bytes))
            }
        }
    }

    fn endpoint(&self, request: &KlingRequest) -> String {
        if request.input_image.is_some() {
            format!("{}/v1/videos/image2video", self.config.base_url)
        } else {
            format!("{}/v1/videos/text2video", self.config.base_url)
        }
    }

    async fn submit_kling(&self, request: &KlingRequest) -> ProviderResult<JobHandle> {
        let token = self.bearer_token().await?;

        let mut body = serde_json::json!({
            "model_name": request.model,
            "mode": request.mode.as_str(),
            "prompt": request.prompt,
            "duration": request.duration_secs.to_string(),
            "aspect_ratio": request.aspect_ratio.as_str(),
            "cfg_scale": request.cfg_scale,
        });
        if let Some(negative) = &request.negative_prompt {
            body["negative_prompt"] = serde_json::json!(negative);
        }
        if let Some(image) = &request.input_image {
            body["image"] = serde_json::json!(self.image_payload(image).await?);
        }
        if let Some(end_image) = &request.end_image {
            body["image_tail"] = serde_json::json!(self.image_payload(end_image).await?);
        }

        let response = self
            .http
            .post(self.endpoint(request))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_http("kling submit", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("kling submit", status, text));
        }

        let envelope: KlingEnvelope<KlingTask> = response
            .json()
            .await
            .map_err(|e| ProviderError::from_http("kling submit", e))?;
        if envelope.code != 0 {
            return Err(ProviderError::remote(format!(
                "kling rejected submission (code {}): {}",
                envelope.code, envelope.message
            )));
        }
        let task = envelope
            .data
            .ok_or_else(|| ProviderError::remote("kling submit response missing data"))?;

        info!(task_id = %task.task_id, model = %request.model, "Submitted Kling generation");
        Ok(JobHandle::submitted(ProviderKind::Kling, task.task_id))
    }
}

#[async_trait]
impl GenerationProvider for KlingClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Kling
    }

    fn min_poll_interval(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn submit(&self, request: &GenerationRequest) -> ProviderResult<JobHandle> {
        match request {
            GenerationRequest::Kling(r) => self.submit_kling(r).await,
            other => Err(ProviderError::validation(format!(
                "kling client received a {} request",
                other.provider()
            ))),
        }
    }

    async fn poll(&self, handle: &JobHandle) -> ProviderResult<JobHandle> {
        let token = self.bearer_token().await?;
        let url = format!(
            "{}/v1/videos/text2video/{}",
            self.config.base_url, handle.task_id
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ProviderError::from_http("kling poll", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("kling poll", status, text));
        }

        let envelope: KlingEnvelope<KlingTask> = response
            .json()
            .await
            .map_err(|e| ProviderError::from_http("kling poll", e))?;
        if envelope.code != 0 {
            return Err(ProviderError::remote(format!(
                "kling poll failed (code {}): {}",
                envelope.code, envelope.message
            )));
        }
        let task = envelope
            .data
            .ok_or_else(|| ProviderError::remote("kling poll response missing data"))?;

        match task.task_status.as_str() {
            "succeed" => {
                let url = task
                    .task_result
                    .and_then(|r| r.videos.into_iter().next())
                    .map(|v| v.url)
                    .ok_or_else(|| {
                        ProviderError::remote("kling task succeeded but returned no video url")
                    })?;
                Ok(handle.clone().completed(OutputLocator::Url { url }))
            }
            "failed" => {
                let msg = if task.task_status_msg.is_empty() {
                    "kling task failed".to_string()
                } else {
                    task.task_status_msg
                };
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
