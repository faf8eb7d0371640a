//! Pipeline configuration.
//!
//! All knobs are resolved once by the caller (the binary reads env/flags)
//! and passed in; the pipeline itself never consults the environment.

use std::time::Duration;

use sceneforge_media::ProResProfile;
use sceneforge_models::ProviderKind;
use sceneforge_providers::{GenerationDefaults, PollSettings};

/// Settings for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Generation backend for this run
    pub provider: ProviderKind,

    /// Defaults applied where the scene spec is silent
    pub defaults: GenerationDefaults,

    /// Deadline and interval for the generation poll loop
    pub poll: PollSettings,

    /// Voice selector for speech synthesis; the synthesizer's default
    /// voice when unset
    pub voice: Option<String>,

    /// Skip lip-sync even for scenes with dialogue
    pub skip_lipsync: bool,

    /// Overall deadline for the lip-sync job, independent of the
    /// generation poll deadline
    pub lip_sync_timeout: Duration,

    /// ProRes profile for deliverables
    pub prores_profile: ProResProfile,
}

impl PipelineConfig {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            defaults: GenerationDefaults::default(),
            poll: PollSettings::default(),
            voice: None,
            skip_lipsync: false,
            lip_sync_timeout: Duration::from_secs(600),
            prores_profile: ProResProfile::default(),
        }
    }
}
