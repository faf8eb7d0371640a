//! The per-scene orchestrator state machine.
//!
//! Status flow: `created → generating_video → processing →
//! generating_audio → lip_syncing → completed`, with `failed` reachable
//! from any non-terminal state. The audio and lip-sync stages only run
//! for scenes with non-blank dialogue; when they are skipped, the
//! intermediate ProRes transcode is the final deliverable.
//!
//! Every transition and file reference is persisted before the next
//! stage starts, so a scene interrupted at any point is inspectable from
//! its metadata document alone. A retry restarts from generation; prior
//! artifacts are overwritten, not resumed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use sceneforge_media::TranscodeProfile;
use sceneforge_models::{roles, GenerationRecord, JobHandle, SceneSpec, SceneStatus};
use sceneforge_providers::{
    await_completion, build_request, GenerationProvider, LipSyncer, ProviderError,
    SpeechSynthesizer,
};
use sceneforge_store::SceneStore;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::steps::TranscodeStep;

/// Successful outcome of one scene run: where everything landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneResult {
    pub scene_id: String,
    pub scene_dir: PathBuf,
    /// Logical role -> local path, one entry per reference written
    pub files: BTreeMap<String, String>,
}

/// One-scene orchestrator. Cheap to share behind an `Arc`; holds no
/// per-run mutable state.
pub struct ScenePipeline {
    store: SceneStore,
    provider: Arc<dyn GenerationProvider>,
    speech: Arc<dyn SpeechSynthesizer>,
    lipsync: Arc<dyn LipSyncer>,
    transcoder: Arc<dyn TranscodeStep>,
    config: PipelineConfig,
    cancel: Option<watch::Receiver<bool>>,
}

impl ScenePipeline {
    pub fn new(
        store: SceneStore,
        provider: Arc<dyn GenerationProvider>,
        speech: Arc<dyn SpeechSynthesizer>,
        lipsync: Arc<dyn LipSyncer>,
        transcoder: Arc<dyn TranscodeStep>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            provider,
            speech,
            lipsync,
            transcoder,
            config,
            cancel: None,
        }
    }

    /// Attach a cancellation channel observed at every suspension point
    /// (poll waits, transcodes, lip-sync).
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn store(&self) -> &SceneStore {
        &self.store
    }

    /// Run one scene end to end.
    ///
    /// Any stage failure persists `status: failed` before the original
    /// error is returned; a failure to persist is logged but never masks
    /// the stage error. Already-written file references are left in
    /// place as a record of partial progress.
    pub async fn run(&self, spec: &SceneSpec) -> PipelineResult<SceneResult> {
        spec.validate().map_err(ProviderError::from)?;

        let scene_id = spec.scene_id.as_str();
        let scene_dir = self.store.create(scene_id).await?;

        info!(
            scene_id = %scene_id,
            provider = %self.config.provider,
            has_dialogue = spec.has_dialogue(),
            "Starting scene pipeline"
        );

        match self.execute(spec, &scene_dir).await {
            Ok(result) => {
                info!(scene_id = %scene_id, files = result.files.len(), "Scene completed");
                Ok(result)
            }
            Err(e) => {
                error!(scene_id = %scene_id, error = %e, "Scene failed");
                if let Err(persist) = self.store.update_status(scene_id, SceneStatus::Failed).await
                {
                    warn!(
                        scene_id = %scene_id,
                        error = %persist,
                        "Could not persist failed status"
                    );
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, spec: &SceneSpec, scene_dir: &Path) -> PipelineResult<SceneResult> {
        let scene_id = spec.scene_id.as_str();
        let mut files = BTreeMap::new();

        // Stage 1: generation
        self.store
            .update_status(scene_id, SceneStatus::GeneratingVideo)
            .await?;
        let request = build_request(self.config.provider, spec, &self.config.defaults)
            .map_err(ProviderError::from)?;

        // Recorded before submission so an inspected scene always shows
        // what was attempted
        self.store
            .set_generation(
                scene_id,
                GenerationRecord {
                    provider: request.provider().as_str().to_string(),
                    model: request.model().map(str::to_string),
                    prompt: request.prompt().to_string(),
                    input_image: spec.input_image.clone(),
                    input_video: spec.input_video.clone(),
                    dialogue: spec.prompt.dialogue().map(str::to_string),
                    generated_at: Utc::now(),
                },
            )
            .await?;

        let handle = self.provider.submit(&request).await?;
        let done = await_completion(
            self.provider.as_ref(),
            handle,
            self.config.poll,
            self.cancel.clone(),
        )
        .await?;

        // Stage 2: download + intermediate transcode
        self.store
            .update_status(scene_id, SceneStatus::Processing)
            .await?;
        let raw_path = scene_dir.join(format!("{}_raw.mp4", scene_id));
        self.provider.fetch_artifact(&done, &raw_path).await?;
        self.record_file(scene_id, &mut files, roles::RAW_VIDEO, &raw_path, raw_metadata(&done))
            .await?;

        let prores_path = scene_dir.join(format!("{}_prores.mov", scene_id));
        self.transcoder
            .transcode(
                &raw_path,
                &prores_path,
                TranscodeProfile::ProRes(self.config.prores_profile),
                self.cancel.clone(),
            )
            .await?;
        self.record_file(scene_id, &mut files, roles::PRORES_VIDEO, &prores_path, BTreeMap::new())
            .await?;

        // Stages 3-4: dialogue-gated audio and lip-sync
        if let Some(dialogue) = spec.prompt.dialogue() {
            self.store
                .update_status(scene_id, SceneStatus::GeneratingAudio)
                .await?;
            let audio_path = scene_dir.join(format!("{}_audio.mp3", scene_id));
            self.speech
                .synthesize(dialogue, self.config.voice.as_deref(), &audio_path)
                .await
                .map_err(PipelineError::speech)?;
            let mut audio_meta = BTreeMap::new();
            if let Some(voice) = &self.config.voice {
                audio_meta.insert("voice".to_string(), serde_json::json!(voice));
            }
            self.record_file(scene_id, &mut files, roles::AUDIO, &audio_path, audio_meta)
                .await?;

            if !self.config.skip_lipsync {
                self.store
                    .update_status(scene_id, SceneStatus::LipSyncing)
                    .await?;
                let synced_path = scene_dir.join(format!("{}_synced.mp4", scene_id));
                self.lipsync
                    .lip_sync(
                        &raw_path,
                        &audio_path,
                        &synced_path,
                        self.config.lip_sync_timeout,
                        self.cancel.clone(),
                    )
                    .await
                    .map_err(PipelineError::lip_sync)?;
                self.record_file(scene_id, &mut files, roles::SYNCED_VIDEO, &synced_path, BTreeMap::new())
                    .await?;

                let final_path = scene_dir.join(format!("{}_final.mov", scene_id));
                self.transcoder
                    .transcode(
                        &synced_path,
                        &final_path,
                        TranscodeProfile::ProRes(self.config.prores_profile),
                        self.cancel.clone(),
                    )
                    .await?;
                self.record_file(scene_id, &mut files, roles::FINAL_PRORES, &final_path, BTreeMap::new())
                    .await?;
            } else {
                self.alias_final(scene_id, &mut files, &prores_path).await?;
            }
        } else {
            self.alias_final(scene_id, &mut files, &prores_path).await?;
        }

        self.store
            .update_status(scene_id, SceneStatus::Completed)
            .await?;

        Ok(SceneResult {
            scene_id: scene_id.to_string(),
            scene_dir: scene_dir.to_path_buf(),
            files,
        })
    }

    /// Without lip-sync, the intermediate ProRes is the deliverable.
    async fn alias_final(
        &self,
        scene_id: &str,
        files: &mut BTreeMap<String, String>,
        prores_path: &Path,
    ) -> PipelineResult<()> {
        self.record_file(scene_id, files, roles::FINAL_PRORES, prores_path, BTreeMap::new())
            .await
    }

    async fn record_file(
        &self,
        scene_id: &str,
        files: &mut BTreeMap<String, String>,
        role: &str,
        path: &Path,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> PipelineResult<()> {
        let path_str = path.display().to_string();
        self.store
            .set_file_reference(scene_id, role, path_str.clone(), metadata)
            .await?;
        files.insert(role.to_string(), path_str);
        Ok(())
    }
}

fn raw_metadata(handle: &JobHandle) -> BTreeMap<String, serde_json::Value> {
    let mut meta = BTreeMap::new();
    meta.insert("provider".to_string(), serde_json::json!(handle.provider.as_str()));
    meta.insert("job_id".to_string(), serde_json::json!(handle.job_id.as_str()));
    meta.insert("task_id".to_string(), serde_json::json!(handle.task_id));
    meta
}
