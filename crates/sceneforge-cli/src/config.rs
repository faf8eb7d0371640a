//! Environment-resolved configuration.
//!
//! Credentials and provider selection come from the environment (or a
//! `.env` file via dotenvy); everything is resolved here, once, into the
//! explicit config structs the library crates take. Library code never
//! reads the environment itself.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use sceneforge_models::ProviderKind;
use sceneforge_providers::{
    kling::{KlingClient, KlingConfig},
    replicate::{ReplicateClient, ReplicateConfig},
    sora::{SoraClient, SoraConfig},
    veo::{VeoClient, VeoConfig},
    ElevenLabsSpeech, GenerationDefaults, GenerationProvider, LipSyncer, PollSettings,
    ReplicateLipSync, SpeechConfig, SpeechSynthesizer,
};

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| anyhow!("environment variable {} is not set", name))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_secs(name: &str, default: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

/// Provider selection: explicit flag wins over `SCENEFORGE_PROVIDER`.
pub fn resolve_provider(flag: Option<&str>) -> Result<ProviderKind> {
    let name = match flag {
        Some(name) => name.to_string(),
        None => env_or("SCENEFORGE_PROVIDER", "kling"),
    };
    name.parse::<ProviderKind>()
        .map_err(|e| anyhow!(e))
        .context("invalid provider selection")
}

/// Generation defaults, with env overrides for model/resolution choices.
pub fn generation_defaults() -> GenerationDefaults {
    let mut defaults = GenerationDefaults::default();
    if let Ok(model) = std::env::var("KLING_MODEL") {
        defaults.kling_model = model;
    }
    if let Ok(model) = std::env::var("SORA_MODEL") {
        defaults.sora_model = model;
    }
    if let Ok(model) = std::env::var("REPLICATE_MODEL") {
        defaults.replicate_model = model;
    }
    defaults
}

/// Poll policy for generation jobs.
pub fn poll_settings() -> PollSettings {
    PollSettings::new(
        env_secs("GENERATION_TIMEOUT_SECS", 600),
        env_secs("POLL_INTERVAL_SECS", 10),
    )
}

pub fn lip_sync_timeout() -> Duration {
    env_secs("LIPSYNC_TIMEOUT_SECS", 600)
}

/// Construct the selected generation backend from its credentials.
pub fn build_generation_provider(kind: ProviderKind) -> Result<Arc<dyn GenerationProvider>> {
    match kind {
        ProviderKind::Kling => {
            let config = KlingConfig::new(
                require_env("KLING_ACCESS_KEY")?,
                require_env("KLING_SECRET_KEY")?,
            );
            Ok(Arc::new(KlingClient::new(config)))
        }
        ProviderKind::Sora => {
            let config = SoraConfig::new(require_env("OPENAI_API_KEY")?);
            Ok(Arc::new(SoraClient::new(config)?))
        }
        ProviderKind::Replicate => {
            let config = ReplicateConfig::new(require_env("REPLICATE_API_TOKEN")?);
            Ok(Arc::new(ReplicateClient::new(config)?))
        }
        ProviderKind::Veo => {
            let mut config = VeoConfig::new(
                require_env("GOOGLE_CLOUD_PROJECT")?,
                require_env("GOOGLE_ACCESS_TOKEN")?,
            );
            if let Ok(location) = std::env::var("GOOGLE_CLOUD_LOCATION") {
                config.location = location;
            }
            if let Ok(model) = std::env::var("VEO_MODEL") {
                config.model = model;
            }
            config.output_bucket = std::env::var("VEO_OUTPUT_BUCKET").ok();
            Ok(Arc::new(VeoClient::new(config)))
        }
    }
}

pub fn build_speech() -> Result<Arc<dyn SpeechSynthesizer>> {
    let config = SpeechConfig::new(
        require_env("ELEVENLABS_API_KEY")?,
        env_or("ELEVENLABS_VOICE_ID", "21m00Tcm4TlvDq8ikWAM"),
    );
    Ok(Arc::new(ElevenLabsSpeech::new(config)))
}

pub fn build_lipsync() -> Result<Arc<dyn LipSyncer>> {
    let config = ReplicateConfig::new(require_env("REPLICATE_API_TOKEN")?);
    let lipsync = match std::env::var("LIPSYNC_MODEL") {
        Ok(model) => ReplicateLipSync::with_model(config, model)?,
        Err(_) => ReplicateLipSync::new(config)?,
    };
    Ok(Arc::new(lipsync))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_flag_wins() {
        assert_eq!(resolve_provider(Some("sora")).unwrap(), ProviderKind::Sora);
        assert!(resolve_provider(Some("pika")).is_err());
    }
}
