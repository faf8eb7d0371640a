//! Text-to-speech synthesis.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{ProviderError, ProviderResult};

/// A synchronous text-to-speech backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` to an audio file at `dest`. `voice` overrides
    /// the configured default voice.
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        dest: &Path,
    ) -> ProviderResult<PathBuf>;
}

/// ElevenLabs credentials and voice defaults.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub api_key: String,
    pub default_voice: String,
    pub model_id: String,
    pub base_url: String,
}

impl SpeechConfig {
    pub fn new(api_key: impl Into<String>, default_voice: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            default_voice: default_voice.into(),
            model_id: "eleven_multilingual_v2".to_string(),
            base_url: "https://api.elevenlabs.io".to_string(),
        }
    }
}

/// ElevenLabs text-to-speech client.
pub struct ElevenLabsSpeech {
    config: SpeechConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ElevenLabsError {
    detail: Option<serde_json::Value>,
}

impl ElevenLabsSpeech {
    pub fn new(config: SpeechConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSpeech {
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        dest: &Path,
    ) -> ProviderResult<PathBuf> {
        if text.trim().is_empty() {
            return Err(ProviderError::validation("dialogue text must not be empty"));
        }

        let voice = voice.unwrap_or(&self.config.default_voice);
        let url = format!("{}/v1/text-to-speech/{}", self.config.base_url, voice);

        let body = serde_json::json!({
            "text": text,
            "model_id": self.config.model_id,
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.75,
            },
        });

        let response = self
            .http
            .post(&url)
            .header("xi-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_http("elevenlabs synthesize", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ElevenLabsError>(&text)
                .ok()
                .and_then(|e| e.detail)
                .map(|d| d.to_string())
                .unwrap_or(text);
            return Err(ProviderError::from_status("elevenlabs synthesize", status, detail));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_http("elevenlabs synthesize", e))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = temp_sibling(dest);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&audio).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, dest).await?;

        info!(
            voice = %voice,
            chars = text.chars().count(),
            dest = %dest.display(),
            "Synthesized speech"
        );
        Ok(dest.to_path_buf())
    }
}

fn temp_sibling(dest: &Path) -> PathBuf {
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    dest.with_file_name(format!(".{}.part", file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blank_text_rejected_before_any_request() {
        let speech = ElevenLabsSpeech::new(SpeechConfig::new("key", "voice-1"));
        let err = speech
            .synthesize("   ", None, Path::new("/tmp/out.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }
}
