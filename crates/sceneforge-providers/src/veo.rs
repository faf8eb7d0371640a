//! Veo adapter (Vertex AI long-running operations).
//!
//! Veo jobs run as Vertex AI long-running predict operations. With an
//! output bucket configured, results land under a GCS storage prefix as
//! `{prefix}/{operation_id}/sample_0.mp4`, so artifact fetch lists the
//! prefix through the GCS JSON API rather than assuming a fixed object
//! name. Without a bucket the operation response carries the video bytes
//! inline, base64 encoded. Local video input must be H.264; anything
//! else is re-encoded to an H.264 mezzanine before upload.
//!
//! The access token is supplied through config (e.g. from
//! `gcloud auth print-access-token`); credential refresh is the
//! caller's concern.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use tracing::{debug, info, warn};

use sceneforge_media::{download_to_file, probe_video, Transcoder, DEFAULT_DOWNLOAD_TIMEOUT};
use sceneforge_models::{
    GenerationRequest, JobHandle, MediaInput, OutputLocator, ProviderKind, VeoRequest,
};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::GenerationProvider;

/// Vertex AI project, model and credentials for Veo.
#[derive(Debug, Clone)]
pub struct VeoConfig {
    pub project_id: String,
    pub location: String,
    pub model: String,
    /// Bucket receiving generated clips; direct byte responses are used
    /// when unset
    pub output_bucket: Option<String>,
    /// OAuth2 bearer token for Vertex AI and GCS
    pub access_token: String,
}

impl VeoConfig {
    pub fn new(
        project_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            location: "us-central1".to_string(),
            model: "veo-3.0-generate-preview".to_string(),
            output_bucket: None,
            access_token: access_token.into(),
        }
    }

    fn model_endpoint(&self, verb: &str) -> String {
        format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{proj}/locations/{loc}/publishers/google/models/{model}:{verb}",
            loc = self.location,
            proj = self.project_id,
            model = self.model,
            verb = verb,
        )
    }

    fn storage_prefix(&self) -> Option<(String, String)> {
        self.output_bucket
            .as_ref()
            .map(|bucket| (bucket.clone(), "veo_outputs".to_string()))
    }
}

/// Veo generation client.
pub struct VeoClient {
    config: VeoConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
    response: Option<OperationResponse>,
}

#[derive(Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct OperationResponse {
    #[serde(default)]
    videos: Vec<OperationVideo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationVideo {
    gcs_uri: Option<String>,
    /// Inline video bytes, returned when no `storageUri` was requested
    bytes_base64_encoded: Option<String>,
}

#[derive(Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectEntry>,
}

#[derive(Deserialize)]
struct ObjectEntry {
    name: String,
}

impl VeoClient {
    pub fn new(config: VeoConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Image instance payload: GCS URIs pass through, local files are
    /// inlined as base64.
    async fn image_instance(image: &MediaInput) -> ProviderResult<serde_json::Value> {
        match image {
            MediaInput::GcsUri(uri) => Ok(serde_json::json!({ "gcsUri": uri })),
            MediaInput::Url(url) => Err(ProviderError::validation(format!(
                "veo image input must be a local file or gs:// URI, got {}",
                url
            ))),
            MediaInput::LocalFile(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    ProviderError::validation(format!("cannot read image {}: {}", path, e))
                })?;
                let mime = if path.ends_with(".png") { "image/png" } else { "image/jpeg" };
                Ok(serde_json::json!({
                    "bytesBase64Encoded": BASE64.encode(bytes),
                    "mimeType": mime,
                }))
            }
        }
    }

    /// Video instance payload. Veo only accepts H.264 input, so other
    /// codecs get re-encoded to a mezzanine file first.
    async fn video_instance(video: &MediaInput) -> ProviderResult<serde_json::Value> {
        match video {
            MediaInput::GcsUri(uri) => Ok(serde_json::json!({ "gcsUri": uri })),
            MediaInput::Url(url) => Err(ProviderError::validation(format!(
                "veo video input must be a local file or gs:// URI, got {}",
                url
            ))),
            MediaInput::LocalFile(path) => {
                let source = PathBuf::from(path);
                let info = probe_video(&source).await?;
                let upload = if info.is_h264() {
                    source
                } else {
                    warn!(
                        video = %source.display(),
                        codec = %info.codec,
                        "Re-encoding non-H.264 input for Veo"
                    );
                    let mezzanine = source.with_extension("h264.mp4");
                    Transcoder::default().to_h264(&source, &mezzanine).await?
                };
                let bytes = tokio::fs::read(&upload).await?;
                Ok(serde_json::json!({
                    "bytesBase64Encoded": BASE64.encode(bytes),
                    "mimeType": "video/mp4",
                }))
            }
        }
    }

    async fn submit_veo(&self, request: &VeoRequest) -> ProviderResult<JobHandle> {
        let mut instance = serde_json::json!({ "prompt": request.prompt });
        if let Some(image) = &request.input_image {
            instance["image"] = Self::image_instance(image).await?;
        }
        if let Some(video) = &request.input_video {
            instance["video"] = Self::video_instance(video).await?;
        }

        let mut parameters = serde_json::json!({
            "durationSeconds": request.duration_secs,
            "aspectRatio": request.aspect_ratio.as_str(),
            "sampleCount": request.sample_count,
            "enhancePrompt": request.enhance_prompt,
        });
        if let Some((bucket, prefix)) = self.config.storage_prefix() {
            parameters["storageUri"] = serde_json::json!(format!("gs://{}/{}", bucket, prefix));
        }

        let body = serde_json::json!({
            "instances": [instance],
            "parameters": parameters,
        });

        let response = self
            .http
            .post(self.config.model_endpoint("predictLongRunning"))
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_http("veo submit", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("veo submit", status, text));
        }

        let operation: Operation = response
            .json()
            .await
            .map_err(|e| ProviderError::from_http("veo submit", e))?;

        info!(operation = %operation.name, model = %self.config.model, "Submitted Veo generation");
        Ok(JobHandle::submitted(ProviderKind::Veo, operation.name))
    }

    /// Locator for a finished operation. Prefers the explicit GCS URI in
    /// the response, then inline bytes (the bucketless small-video path),
    /// then the conventional `{prefix}/{operation_id}` output layout.
    fn completed_locator(&self, operation: &Operation) -> ProviderResult<OutputLocator> {
        if let Some(video) = operation.response.as_ref().and_then(|r| r.videos.first()) {
            if let Some(uri) = &video.gcs_uri {
                return parse_gcs_uri(uri);
            }
            if let Some(bytes_base64) = &video.bytes_base64_encoded {
                return Ok(OutputLocator::Inline {
                    bytes_base64: bytes_base64.clone(),
                });
            }
        }

        let (bucket, prefix) = self.config.storage_prefix().ok_or_else(|| {
            ProviderError::remote("veo operation finished without a GCS URI and no output bucket is configured")
        })?;
        let operation_id = operation
            .name
            .rsplit('/')
            .next()
            .unwrap_or(&operation.name)
            .to_string();
        Ok(OutputLocator::GcsPrefix {
            bucket,
            prefix: format!("{}/{}", prefix, operation_id),
        })
    }

    /// First `.mp4` object under `prefix`, via the GCS JSON API.
    async fn find_artifact_object(&self, bucket: &str, prefix: &str) -> ProviderResult<String> {
        let url = format!("https://storage.googleapis.com/storage/v1/b/{}/o", bucket);
        let response = self
            .http
            .get(&url)
            .query(&[("prefix", prefix)])
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| ProviderError::from_http("gcs list", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("gcs list", status, text));
        }

        let list: ObjectList = response
            .json()
            .await
            .map_err(|e| ProviderError::from_http("gcs list", e))?;

        debug!(bucket, prefix, objects = list.items.len(), "Listed GCS output prefix");
        list.items
            .into_iter()
            .map(|o| o.name)
            .find(|name| name.ends_with(".mp4"))
            .ok_or_else(|| {
                ProviderError::not_found(format!("no .mp4 under gs://{}/{}", bucket, prefix))
            })
    }
}

/// Decode inline response bytes to `dest`, temp-then-rename so a failed
/// write never leaves a claimed-but-partial file.
async fn write_inline_artifact(bytes_base64: &str, dest: &Path) -> ProviderResult<PathBuf> {
    let bytes = BASE64
        .decode(bytes_base64)
        .map_err(|e| ProviderError::remote(format!("veo returned invalid base64 video: {}", e)))?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    let tmp = dest.with_file_name(format!(".{}.part", file_name));
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, dest).await?;

    info!(dest = %dest.display(), bytes = bytes.len(), "Wrote inline Veo video");
    Ok(dest.to_path_buf())
}

/// Split `gs://bucket/object` into a prefix locator.
fn parse_gcs_uri(uri: &str) -> ProviderResult<OutputLocator> {
    let rest = uri
        .strip_prefix("gs://")
        .ok_or_else(|| ProviderError::remote(format!("veo returned a non-GCS URI: {}", uri)))?;
    let (bucket, object) = rest.split_once('/').ok_or_else(|| {
        ProviderError::remote(format!("veo returned a GCS URI without an object: {}", uri))
    })?;
    Ok(OutputLocator::GcsPrefix {
        bucket: bucket.to_string(),
        prefix: object.to_string(),
    })
}

#[async_trait]
impl GenerationProvider for VeoClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Veo
    }

    fn min_poll_interval(&self) -> Duration {
        Duration::from_secs(20)
    }

    async fn submit(&self, request: &GenerationRequest) -> ProviderResult<JobHandle> {
        match request {
            GenerationRequest::Veo(r) => self.submit_veo(r).await,
            other => Err(ProviderError::validation(format!(
                "veo client received a {} request",
                other.provider()
            ))),
        }
    }

    async fn poll(&self, handle: &JobHandle) -> ProviderResult<JobHandle> {
        let body = serde_json::json!({ "operationName": handle.task_id });
        let response = self
            .http
            .post(self.config.model_endpoint("fetchPredictOperation"))
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_http("veo poll", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("veo poll", status, text));
        }

        let operation: Operation = response
            .json()
            .await
            .map_err(|e| ProviderError::from_http("veo poll", e))?;

        if !operation.done {
            return Ok(handle.clone().processing());
        }
        if let Some(error) = operation.error {
            let msg = if error.message.is_empty() {
                "veo operation failed".to_string()
            } else {
                error.message
            };
            return Ok(handle.clone().failed(msg));
        }
        let locator = self.completed_locator(&operation)?;
        Ok(handle.clone().completed(locator))
    }

    async fn fetch_artifact(&self, handle: &JobHandle, dest: &Path) -> ProviderResult<PathBuf> {
        let (bucket, prefix) = match &handle.output {
            Some(OutputLocator::GcsPrefix { bucket, prefix }) => (bucket, prefix),
            Some(OutputLocator::Url { url }) => {
                let path =
                    download_to_file(&self.http, url, dest, DEFAULT_DOWNLOAD_TIMEOUT).await?;
                return Ok(path);
            }
            Some(OutputLocator::Inline { bytes_base64 }) => {
                return write_inline_artifact(bytes_base64, dest).await;
            }
            None => {
                return Err(ProviderError::not_found(format!(
                    "job {} has no downloadable output",
                    handle.job_id
                )))
            }
        };

        let object = self.find_artifact_object(bucket, prefix).await?;
        // Path-style endpoint keeps slashes in object names intact
        let url = format!("https://storage.googleapis.com/{}/{}", bucket, object);
        let client = authed_client(&self.config.access_token)?;
        let path = download_to_file(&client, &url, dest, DEFAULT_DOWNLOAD_TIMEOUT).await?;
        Ok(path)
    }
}

fn authed_client(token: &str) -> ProviderResult<reqwest::Client> {
    use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| ProviderError::auth("access token contains invalid characters"))?;
    headers.insert(AUTHORIZATION, value);
    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .map_err(|e| ProviderError::TransientNetwork(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_endpoint() {
        let config = VeoConfig::new("proj-1", "token");
        let url = config.model_endpoint("predictLongRunning");
        assert_eq!(
            url,
            "https://us-central1-aiplatform.googleapis.com/v1/projects/proj-1/locations/us-central1/publishers/google/models/veo-3.0-generate-preview:predictLongRunning"
        );
    }

    #[test]
    fn test_parse_gcs_uri() {
        let locator = parse_gcs_uri("gs://clips/veo_outputs/123/sample_0.mp4").unwrap();
        assert_eq!(
            locator,
            OutputLocator::GcsPrefix {
                bucket: "clips".into(),
                prefix: "veo_outputs/123/sample_0.mp4".into(),
            }
        );
        assert!(parse_gcs_uri("https://x/y.mp4").is_err());
        assert!(parse_gcs_uri("gs://bucket-only").is_err());
    }

    #[test]
    fn test_completed_locator_falls_back_to_operation_prefix() {
        let mut config = VeoConfig::new("proj-1", "token");
        config.output_bucket = Some("clips".into());
        let client = VeoClient::new(config);

        let operation = Operation {
            name: "projects/p/locations/l/operations/op-42".into(),
            done: true,
            error: None,
            response: Some(OperationResponse { videos: vec![] }),
        };
        let locator = client.completed_locator(&operation).unwrap();
        assert_eq!(
            locator,
            OutputLocator::GcsPrefix {
                bucket: "clips".into(),
                prefix: "veo_outputs/op-42".into(),
            }
        );
    }

    #[test]
    fn test_completed_inline_bytes_without_bucket() {
        let client = VeoClient::new(VeoConfig::new("proj-1", "token"));
        let operation = Operation {
            name: "operations/op-7".into(),
            done: true,
            error: None,
            response: Some(OperationResponse {
                videos: vec![OperationVideo {
                    gcs_uri: None,
                    bytes_base64_encoded: Some("AAAA".into()),
                }],
            }),
        };
        assert_eq!(
            client.completed_locator(&operation).unwrap(),
            OutputLocator::Inline {
                bytes_base64: "AAAA".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_inline_bytes_writes_decoded_video() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("scene_01").join("scene_01_raw.mp4");

        let client = VeoClient::new(VeoConfig::new("proj-1", "token"));
        let handle = JobHandle::submitted(ProviderKind::Veo, "operations/op-7").completed(
            OutputLocator::Inline {
                bytes_base64: BASE64.encode(b"not really mp4"),
            },
        );

        let path = client.fetch_artifact(&handle, &dest).await.unwrap();
        assert_eq!(path, dest);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"not really mp4");
    }

    #[tokio::test]
    async fn test_fetch_invalid_base64_is_remote_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.mp4");

        let client = VeoClient::new(VeoConfig::new("proj-1", "token"));
        let handle = JobHandle::submitted(ProviderKind::Veo, "operations/op-8").completed(
            OutputLocator::Inline {
                bytes_base64: "not base64!!".into(),
            },
        );

        assert!(matches!(
            client.fetch_artifact(&handle, &dest).await,
            Err(ProviderError::Remote(_))
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_completed_without_bucket_or_uri_is_remote_error() {
        let client = VeoClient::new(VeoConfig::new("proj-1", "token"));
        let operation = Operation {
            name: "operations/op-1".into(),
            done: true,
            error: None,
            response: None,
        };
        assert!(matches!(
            client.completed_locator(&operation),
            Err(ProviderError::Remote(_))
        ));
    }
}
