//! Build a provider-specific request from a scene spec plus defaults.

use sceneforge_models::{
    AspectRatio, GenerationRequest, KlingMode, KlingRequest, MediaInput, ProviderKind,
    ReplicateRequest, SceneSpec, SoraRequest, ValidationError, VeoRequest,
};

/// Project-level generation defaults, applied wherever the scene spec is
/// silent. Resolved once per run from config/CLI flags.
#[derive(Debug, Clone)]
pub struct GenerationDefaults {
    pub duration_secs: u32,
    pub aspect_ratio: AspectRatio,
    pub kling_model: String,
    pub kling_mode: KlingMode,
    pub kling_cfg_scale: f32,
    pub sora_model: String,
    pub sora_resolution: String,
    pub replicate_model: String,
    pub replicate_resolution: String,
    pub replicate_fps: u32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            duration_secs: 5,
            aspect_ratio: AspectRatio::Widescreen,
            kling_model: "kling-v1-6".to_string(),
            kling_mode: KlingMode::Std,
            kling_cfg_scale: 0.5,
            sora_model: "sora-2".to_string(),
            sora_resolution: "720p".to_string(),
            replicate_model: "wan-2.2-t2v-fast".to_string(),
            replicate_resolution: "480p".to_string(),
            replicate_fps: 16,
        }
    }
}

/// Assemble the request for `provider` from `scene`, falling back to
/// `defaults` for everything the scene does not pin down.
pub fn build_request(
    provider: ProviderKind,
    scene: &SceneSpec,
    defaults: &GenerationDefaults,
) -> Result<GenerationRequest, ValidationError> {
    let prompt = scene.prompt.render();
    let duration = scene.duration_secs.unwrap_or(defaults.duration_secs);
    let input_image = scene.input_image.as_deref().map(MediaInput::parse);
    let input_video = scene.input_video.as_deref().map(MediaInput::parse);

    match provider {
        ProviderKind::Veo => Ok(GenerationRequest::Veo(VeoRequest::new(
            prompt,
            duration,
            defaults.aspect_ratio,
            input_image,
            input_video,
        )?)),
        ProviderKind::Kling => Ok(GenerationRequest::Kling(KlingRequest::new(
            defaults.kling_model.clone(),
            defaults.kling_mode,
            prompt,
            duration,
            defaults.aspect_ratio,
            defaults.kling_cfg_scale,
            scene.negative_prompt.clone(),
            input_image,
            None,
            input_video,
        )?)),
        ProviderKind::Sora => Ok(GenerationRequest::Sora(SoraRequest::new(
            defaults.sora_model.clone(),
            prompt,
            duration,
            defaults.sora_resolution.clone(),
            defaults.aspect_ratio,
            input_image,
            input_video,
        )?)),
        ProviderKind::Replicate => Ok(GenerationRequest::Replicate(ReplicateRequest::new(
            defaults.replicate_model.clone(),
            prompt,
            duration,
            defaults.replicate_fps,
            defaults.replicate_resolution.clone(),
            defaults.aspect_ratio,
            input_image,
            input_video,
            scene.seed,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sceneforge_models::ScenePrompt;

    fn scene(id: &str) -> SceneSpec {
        SceneSpec {
            scene_id: id.to_string(),
            prompt: ScenePrompt {
                cinematic_description: "A rain-soaked alley at night".to_string(),
                ..Default::default()
            },
            duration_secs: None,
            seed: None,
            negative_prompt: None,
            input_image: None,
            input_video: None,
        }
    }

    #[test]
    fn test_defaults_fill_gaps() {
        let req = build_request(ProviderKind::Kling, &scene("s1"), &GenerationDefaults::default())
            .unwrap();
        match req {
            GenerationRequest::Kling(k) => {
                assert_eq!(k.model, "kling-v1-6");
                assert_eq!(k.duration_secs, 5);
            }
            other => panic!("expected Kling, got {:?}", other.provider()),
        }
    }

    #[test]
    fn test_scene_duration_wins() {
        let mut s = scene("s2");
        s.duration_secs = Some(10);
        let req =
            build_request(ProviderKind::Kling, &s, &GenerationDefaults::default()).unwrap();
        match req {
            GenerationRequest::Kling(k) => assert_eq!(k.duration_secs, 10),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_input_video_routes_to_replicate_i2v() {
        let mut s = scene("s3");
        s.input_video = Some("/tmp/prev.mp4".to_string());
        let req =
            build_request(ProviderKind::Replicate, &s, &GenerationDefaults::default()).unwrap();
        match req {
            GenerationRequest::Replicate(r) => assert!(r.is_image_to_video()),
            _ => unreachable!(),
        }
    }
}
