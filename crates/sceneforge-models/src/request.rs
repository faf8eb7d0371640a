//! Provider request variants.
//!
//! One variant per generation backend, with provider-specific constraints
//! validated inside the variant constructor so a bad request fails fast,
//! before any network call is made.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::ProviderKind;

/// Validation failure for a generation request. No side effect has
/// occurred when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("scene_id must not be blank")]
    BlankSceneId,

    #[error("{provider} does not support duration {requested}s (supported: {supported})")]
    UnsupportedDuration {
        provider: ProviderKind,
        requested: u32,
        supported: String,
    },

    #[error("{provider} does not support local video input: {path}")]
    LocalVideoUnsupported { provider: ProviderKind, path: String },

    #[error("unknown {provider} model '{model}'")]
    UnknownModel { provider: ProviderKind, model: String },

    #[error("cfg_scale must be within 0.0..=1.0, got {0}")]
    CfgScaleOutOfRange(f32),
}

/// Classified reference media input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum MediaInput {
    /// Local filesystem path
    LocalFile(String),
    /// HTTP(S) URL
    Url(String),
    /// `gs://bucket/object` URI
    GcsUri(String),
}

impl MediaInput {
    /// Classify a user-supplied reference string.
    pub fn parse(s: &str) -> Self {
        if s.starts_with("gs://") {
            MediaInput::GcsUri(s.to_string())
        } else if s.starts_with("http://") || s.starts_with("https://") {
            MediaInput::Url(s.to_string())
        } else {
            MediaInput::LocalFile(s.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MediaInput::LocalFile(s) | MediaInput::Url(s) | MediaInput::GcsUri(s) => s,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, MediaInput::LocalFile(_))
    }
}

/// Target aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AspectRatio {
    /// 16:9 landscape
    #[default]
    Widescreen,
    /// 9:16 portrait
    Portrait,
    /// 1:1 square
    Square,
}

impl AspectRatio {
    /// Wire representation shared by all providers.
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
        }
    }
}

/// Kling quality mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum KlingMode {
    #[default]
    Std,
    Pro,
}

impl KlingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            KlingMode::Std => "std",
            KlingMode::Pro => "pro",
        }
    }
}

/// Veo generation request. Durations are snapped to the supported set
/// {5, 8} rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VeoRequest {
    pub prompt: String,
    pub duration_secs: u32,
    pub aspect_ratio: AspectRatio,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_image: Option<MediaInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_video: Option<MediaInput>,
    pub enhance_prompt: bool,
    pub sample_count: u32,
}

impl VeoRequest {
    pub const SUPPORTED_DURATIONS: [u32; 2] = [5, 8];

    pub fn new(
        prompt: impl Into<String>,
        duration_secs: u32,
        aspect_ratio: AspectRatio,
        input_image: Option<MediaInput>,
        input_video: Option<MediaInput>,
    ) -> Result<Self, ValidationError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }

        Ok(Self {
            prompt,
            duration_secs: snap_duration(duration_secs, &Self::SUPPORTED_DURATIONS),
            aspect_ratio,
            input_image,
            input_video,
            enhance_prompt: true,
            sample_count: 1,
        })
    }
}

/// Kling generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KlingRequest {
    pub model: String,
    pub mode: KlingMode,
    pub prompt: String,
    pub duration_secs: u32,
    pub aspect_ratio: AspectRatio,
    pub cfg_scale: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_image: Option<MediaInput>,
    /// End frame for interpolation; forces pro mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_image: Option<MediaInput>,
}

impl KlingRequest {
    /// Known models and their maximum clip duration.
    pub const MODELS: [(&'static str, u32); 5] = [
        ("kling-v1", 5),
        ("kling-v1-5", 10),
        ("kling-v1-6", 10),
        ("kling-v2", 10),
        ("kling-v2-1", 10),
    ];

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: impl Into<String>,
        mode: KlingMode,
        prompt: impl Into<String>,
        duration_secs: u32,
        aspect_ratio: AspectRatio,
        cfg_scale: f32,
        negative_prompt: Option<String>,
        input_image: Option<MediaInput>,
        end_image: Option<MediaInput>,
        input_video: Option<MediaInput>,
    ) -> Result<Self, ValidationError> {
        let model = model.into();
        let prompt = prompt.into();

        if prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }

        let max_duration = Self::MODELS
            .iter()
            .find(|(name, _)| *name == model)
            .map(|(_, max)| *max)
            .ok_or_else(|| ValidationError::UnknownModel {
                provider: ProviderKind::Kling,
                model: model.clone(),
            })?;

        if !(duration_secs == 5 || duration_secs == 10) || duration_secs > max_duration {
            return Err(ValidationError::UnsupportedDuration {
                provider: ProviderKind::Kling,
                requested: duration_secs,
                supported: format!("5 or 10, max {} for {}", max_duration, model),
            });
        }

        if !(0.0..=1.0).contains(&cfg_scale) {
            return Err(ValidationError::CfgScaleOutOfRange(cfg_scale));
        }

        // Kling has no upload endpoint for local video sources
        if let Some(video) = &input_video {
            if video.is_local() {
                return Err(ValidationError::LocalVideoUnsupported {
                    provider: ProviderKind::Kling,
                    path: video.as_str().to_string(),
                });
            }
        }

        // End-frame interpolation is a pro-mode feature
        let mode = if end_image.is_some() { KlingMode::Pro } else { mode };

        Ok(Self {
            model,
            mode,
            prompt,
            duration_secs,
            aspect_ratio,
            cfg_scale,
            negative_prompt,
            input_image,
            end_image,
        })
    }
}

/// Sora generation request. Durations beyond the model maximum are
/// clamped; prompts beyond 500 characters are truncated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SoraRequest {
    pub model: String,
    pub prompt: String,
    pub duration_secs: u32,
    pub resolution: String,
    pub aspect_ratio: AspectRatio,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_image: Option<MediaInput>,
    /// Source video; the adapter extracts its first frame and submits
    /// image-to-video, since Sora has no native video input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_video: Option<MediaInput>,
}

impl SoraRequest {
    pub const MAX_PROMPT_CHARS: usize = 500;

    /// Known models and their maximum clip duration.
    pub const MODELS: [(&'static str, u32); 2] = [("sora-2", 20), ("sora-2-pro", 90)];

    pub fn new(
        model: impl Into<String>,
        prompt: impl Into<String>,
        duration_secs: u32,
        resolution: impl Into<String>,
        aspect_ratio: AspectRatio,
        input_image: Option<MediaInput>,
        input_video: Option<MediaInput>,
    ) -> Result<Self, ValidationError> {
        let model = model.into();
        let mut prompt = prompt.into();

        if prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }

        let max_duration = Self::MODELS
            .iter()
            .find(|(name, _)| *name == model)
            .map(|(_, max)| *max)
            .ok_or_else(|| ValidationError::UnknownModel {
                provider: ProviderKind::Sora,
                model: model.clone(),
            })?;

        if prompt.chars().count() > Self::MAX_PROMPT_CHARS {
            prompt = prompt.chars().take(Self::MAX_PROMPT_CHARS - 3).collect::<String>() + "...";
        }

        Ok(Self {
            model,
            prompt,
            duration_secs: duration_secs.min(max_duration),
            resolution: resolution.into(),
            aspect_ratio,
            input_image,
            input_video,
        })
    }
}

/// Replicate (Wan) generation request. `submit` on this provider runs in
/// sync mode and returns an already-terminal handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReplicateRequest {
    pub model: String,
    pub prompt: String,
    pub num_frames: u32,
    pub fps: u32,
    pub resolution: String,
    pub aspect_ratio: AspectRatio,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_image: Option<MediaInput>,
    /// Source video; the adapter extracts its last frame for i2v
    /// continuation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_video: Option<MediaInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub sample_shift: u32,
}

impl ReplicateRequest {
    /// Known Wan models, keyed by short name.
    pub const MODELS: [(&'static str, &'static str); 4] = [
        ("wan-2.2-t2v-fast", "wan-video/wan-2.2-t2v-fast"),
        ("wan-2.5-t2v-fast", "wan-video/wan-2.5-t2v-fast"),
        ("wan-2.2-i2v-fast", "wan-video/wan-2.2-i2v-fast"),
        ("wan-2.5-i2v-fast", "wan-video/wan-2.5-i2v-fast"),
    ];

    /// Wan models accept between 81 and 121 frames.
    pub const FRAME_RANGE: (u32, u32) = (81, 121);

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: impl Into<String>,
        prompt: impl Into<String>,
        duration_secs: u32,
        fps: u32,
        resolution: impl Into<String>,
        aspect_ratio: AspectRatio,
        input_image: Option<MediaInput>,
        input_video: Option<MediaInput>,
        seed: Option<u64>,
    ) -> Result<Self, ValidationError> {
        let mut model = model.into();
        let prompt = prompt.into();

        if prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }

        // Image (or video-derived frame) input requires an i2v model
        if (input_image.is_some() || input_video.is_some()) && model.contains("t2v") {
            model = model.replace("t2v", "i2v");
        }

        if !Self::MODELS.iter().any(|(name, _)| *name == model) {
            return Err(ValidationError::UnknownModel {
                provider: ProviderKind::Replicate,
                model,
            });
        }

        let (min_frames, max_frames) = Self::FRAME_RANGE;
        let num_frames = (duration_secs * fps).clamp(min_frames, max_frames);

        Ok(Self {
            model,
            prompt,
            num_frames,
            fps,
            resolution: resolution.into(),
            aspect_ratio,
            input_image,
            input_video,
            seed,
            sample_shift: 8,
        })
    }

    /// Full Replicate model id (`owner/name`).
    pub fn model_id(&self) -> &'static str {
        Self::MODELS
            .iter()
            .find(|(name, _)| *name == self.model)
            .map(|(_, id)| *id)
            .unwrap_or("wan-video/wan-2.2-t2v-fast")
    }

    pub fn is_image_to_video(&self) -> bool {
        self.model.contains("i2v")
    }

    /// Prompt as sent to the model. Image-to-video prompts describe motion
    /// on top of an established frame, so ones lacking any motion
    /// vocabulary get a generic motion suffix.
    pub fn effective_prompt(&self) -> String {
        const MOTION_WORDS: [&str; 8] = [
            "camera", "pan", "zoom", "dolly", "motion", "moving", "slowly", "quickly",
        ];

        if self.is_image_to_video() {
            let lower = self.prompt.to_lowercase();
            if !MOTION_WORDS.iter().any(|w| lower.contains(w)) {
                return format!("{}, cinematic motion, smooth camera movement", self.prompt);
            }
        }
        self.prompt.clone()
    }
}

/// Tagged generation request, one variant per provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "provider")]
pub enum GenerationRequest {
    Veo(VeoRequest),
    Kling(KlingRequest),
    Sora(SoraRequest),
    Replicate(ReplicateRequest),
}

impl GenerationRequest {
    pub fn provider(&self) -> ProviderKind {
        match self {
            GenerationRequest::Veo(_) => ProviderKind::Veo,
            GenerationRequest::Kling(_) => ProviderKind::Kling,
            GenerationRequest::Sora(_) => ProviderKind::Sora,
            GenerationRequest::Replicate(_) => ProviderKind::Replicate,
        }
    }

    /// The prompt text as it will be sent.
    pub fn prompt(&self) -> &str {
        match self {
            GenerationRequest::Veo(r) => &r.prompt,
            GenerationRequest::Kling(r) => &r.prompt,
            GenerationRequest::Sora(r) => &r.prompt,
            GenerationRequest::Replicate(r) => &r.prompt,
        }
    }

    /// Model identifier, where the provider distinguishes models.
    pub fn model(&self) -> Option<&str> {
        match self {
            GenerationRequest::Veo(_) => None,
            GenerationRequest::Kling(r) => Some(&r.model),
            GenerationRequest::Sora(r) => Some(&r.model),
            GenerationRequest::Replicate(r) => Some(&r.model),
        }
    }

    pub fn input_image(&self) -> Option<&MediaInput> {
        match self {
            GenerationRequest::Veo(r) => r.input_image.as_ref(),
            GenerationRequest::Kling(r) => r.input_image.as_ref(),
            GenerationRequest::Sora(r) => r.input_image.as_ref(),
            GenerationRequest::Replicate(r) => r.input_image.as_ref(),
        }
    }

    pub fn input_video(&self) -> Option<&MediaInput> {
        match self {
            GenerationRequest::Veo(r) => r.input_video.as_ref(),
            GenerationRequest::Kling(_) => None,
            GenerationRequest::Sora(r) => r.input_video.as_ref(),
            GenerationRequest::Replicate(r) => r.input_video.as_ref(),
        }
    }
}

/// Snap a requested duration to the nearest supported value.
fn snap_duration(requested: u32, supported: &[u32]) -> u32 {
    supported
        .iter()
        .copied()
        .min_by_key(|s| s.abs_diff(requested))
        .unwrap_or(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_input_classification() {
        assert!(matches!(MediaInput::parse("gs://b/o.mp4"), MediaInput::GcsUri(_)));
        assert!(matches!(MediaInput::parse("https://x/y.mp4"), MediaInput::Url(_)));
        assert!(matches!(MediaInput::parse("/tmp/y.mp4"), MediaInput::LocalFile(_)));
    }

    #[test]
    fn test_veo_duration_snapping() {
        let r = VeoRequest::new("a scene", 6, AspectRatio::Widescreen, None, None).unwrap();
        assert_eq!(r.duration_secs, 5);
        let r = VeoRequest::new("a scene", 7, AspectRatio::Widescreen, None, None).unwrap();
        assert_eq!(r.duration_secs, 8);
        let r = VeoRequest::new("a scene", 30, AspectRatio::Widescreen, None, None).unwrap();
        assert_eq!(r.duration_secs, 8);
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let err = VeoRequest::new("  ", 5, AspectRatio::Widescreen, None, None).unwrap_err();
        assert_eq!(err, ValidationError::EmptyPrompt);
    }

    #[test]
    fn test_kling_rejects_bad_duration_and_local_video() {
        let err = KlingRequest::new(
            "kling-v1-6",
            KlingMode::Std,
            "prompt",
            7,
            AspectRatio::Widescreen,
            0.5,
            None,
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedDuration { .. }));

        let err = KlingRequest::new(
            "kling-v1-6",
            KlingMode::Std,
            "prompt",
            5,
            AspectRatio::Widescreen,
            0.5,
            None,
            None,
            None,
            Some(MediaInput::parse("/tmp/in.mp4")),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::LocalVideoUnsupported { .. }));
    }

    #[test]
    fn test_kling_v1_duration_cap() {
        let err = KlingRequest::new(
            "kling-v1",
            KlingMode::Std,
            "prompt",
            10,
            AspectRatio::Widescreen,
            0.5,
            None,
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedDuration { .. }));
    }

    #[test]
    fn test_kling_end_image_forces_pro() {
        let r = KlingRequest::new(
            "kling-v1-6",
            KlingMode::Std,
            "prompt",
            5,
            AspectRatio::Widescreen,
            0.5,
            None,
            Some(MediaInput::parse("/tmp/first.jpg")),
            Some(MediaInput::parse("/tmp/last.jpg")),
            None,
        )
        .unwrap();
        assert_eq!(r.mode, KlingMode::Pro);
    }

    #[test]
    fn test_sora_clamps_and_truncates() {
        let long_prompt = "x".repeat(700);
        let r = SoraRequest::new(
            "sora-2",
            long_prompt,
            45,
            "720p",
            AspectRatio::Widescreen,
            None,
            None,
        )
        .unwrap();
        assert_eq!(r.duration_secs, 20);
        assert_eq!(r.prompt.chars().count(), SoraRequest::MAX_PROMPT_CHARS);
        assert!(r.prompt.ends_with("..."));
    }

    #[test]
    fn test_replicate_frame_count_and_model_switch() {
        let r = ReplicateRequest::new(
            "wan-2.2-t2v-fast",
            "a city street",
            5,
            16,
            "480p",
            AspectRatio::Widescreen,
            Some(MediaInput::parse("/tmp/frame.jpg")),
            None,
            None,
        )
        .unwrap();
        assert_eq!(r.model, "wan-2.2-i2v-fast");
        assert_eq!(r.num_frames, 81); // 5 * 16 = 80, clamped up
        assert!(r.is_image_to_video());
    }

    #[test]
    fn test_replicate_motion_suffix() {
        let base = ReplicateRequest::new(
            "wan-2.2-i2v-fast",
            "a quiet forest",
            5,
            16,
            "480p",
            AspectRatio::Widescreen,
            Some(MediaInput::parse("/tmp/frame.jpg")),
            None,
            None,
        )
        .unwrap();
        assert!(base.effective_prompt().contains("cinematic motion"));

        let with_motion = ReplicateRequest::new(
            "wan-2.2-i2v-fast",
            "camera pans across a quiet forest",
            5,
            16,
            "480p",
            AspectRatio::Widescreen,
            Some(MediaInput::parse("/tmp/frame.jpg")),
            None,
            None,
        )
        .unwrap();
        assert_eq!(with_motion.effective_prompt(), with_motion.prompt);
    }
}
