//! Scene specification: the immutable input to one pipeline run.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::request::ValidationError;

/// Structured cinematic prompt for a single scene.
///
/// Optional fields are folded into the rendered prompt text only when
/// present, so providers always receive one flat string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScenePrompt {
    /// Main cinematic description (required)
    pub cinematic_description: String,

    /// Character consistency notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_notes: Option<String>,

    /// Camera movement direction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_movement: Option<String>,

    /// Lighting and visual style
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lighting_style: Option<String>,

    /// Emotion and facial performance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion_performance: Option<String>,

    /// Dialogue text for speech synthesis and lip-sync
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialogue_text: Option<String>,
}

impl ScenePrompt {
    /// Create a prompt from just a cinematic description.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            cinematic_description: description.into(),
            ..Self::default()
        }
    }

    /// Render the flat prompt text sent to generation providers.
    pub fn render(&self) -> String {
        let mut parts = vec![self.cinematic_description.trim().to_string()];

        if let Some(character) = non_blank(&self.character_notes) {
            parts.push(format!("Character: {}", character));
        }
        if let Some(camera) = non_blank(&self.camera_movement) {
            parts.push(format!("Camera: {}", camera));
        }
        if let Some(lighting) = non_blank(&self.lighting_style) {
            parts.push(format!("Lighting: {}", lighting));
        }
        if let Some(emotion) = non_blank(&self.emotion_performance) {
            parts.push(format!("Emotion: {}", emotion));
        }
        if let Some(dialogue) = self.dialogue() {
            parts.push(format!("Dialogue: \"{}\"", dialogue));
        }

        parts.join(". ")
    }

    /// Trimmed dialogue text, or `None` when absent or blank.
    ///
    /// This is the gate for the speech and lip-sync pipeline stages.
    pub fn dialogue(&self) -> Option<&str> {
        non_blank(&self.dialogue_text)
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Immutable specification for one scene.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SceneSpec {
    /// Scene identifier, unique within a project (e.g. `scene_01`)
    pub scene_id: String,

    /// Cinematic prompt
    pub prompt: ScenePrompt,

    /// Requested clip duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,

    /// Generation seed for reproducibility
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Negative prompt (what to avoid)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,

    /// Reference image for image-to-video (first frame)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_image: Option<String>,

    /// Reference video for extension/continuation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_video: Option<String>,
}

impl SceneSpec {
    /// Create a spec with just an id and prompt.
    pub fn new(scene_id: impl Into<String>, prompt: ScenePrompt) -> Self {
        Self {
            scene_id: scene_id.into(),
            prompt,
            duration_secs: None,
            seed: None,
            negative_prompt: None,
            input_image: None,
            input_video: None,
        }
    }

    /// Whether this scene carries dialogue and is eligible for the
    /// speech and lip-sync stages.
    pub fn has_dialogue(&self) -> bool {
        self.prompt.dialogue().is_some()
    }

    /// Reject specs that cannot name a scene directory. A blank id would
    /// collapse the metadata path onto the project root.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.scene_id.trim().is_empty() {
            return Err(ValidationError::BlankSceneId);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_description_only() {
        let prompt = ScenePrompt::new("A tank rolls through a ruined square");
        assert_eq!(prompt.render(), "A tank rolls through a ruined square");
    }

    #[test]
    fn test_render_includes_optional_sections() {
        let prompt = ScenePrompt {
            cinematic_description: "A pilot in a cockpit".into(),
            camera_movement: Some("slow dolly in".into()),
            dialogue_text: Some("All systems nominal.".into()),
            ..ScenePrompt::default()
        };
        let rendered = prompt.render();
        assert!(rendered.starts_with("A pilot in a cockpit"));
        assert!(rendered.contains("Camera: slow dolly in"));
        assert!(rendered.contains("Dialogue: \"All systems nominal.\""));
    }

    #[test]
    fn test_blank_dialogue_is_none() {
        let prompt = ScenePrompt {
            cinematic_description: "x".into(),
            dialogue_text: Some("   ".into()),
            ..ScenePrompt::default()
        };
        assert!(prompt.dialogue().is_none());

        let spec = SceneSpec::new("scene_01", prompt);
        assert!(!spec.has_dialogue());
    }

    #[test]
    fn test_blank_scene_id_is_rejected() {
        let prompt = ScenePrompt::new("x");
        assert_eq!(
            SceneSpec::new("", prompt.clone()).validate(),
            Err(ValidationError::BlankSceneId)
        );
        assert_eq!(
            SceneSpec::new("   ", prompt.clone()).validate(),
            Err(ValidationError::BlankSceneId)
        );
        assert!(SceneSpec::new("scene_01", prompt).validate().is_ok());
    }
}
