//! Batch execution over an ordered list of scene specs.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use sceneforge_models::SceneSpec;

use crate::error::PipelineError;
use crate::pipeline::{ScenePipeline, SceneResult};

/// A per-scene failure, tagged with the scene it belongs to.
#[derive(Debug, Error)]
#[error("scene {scene_id}: {error}")]
pub struct BatchError {
    pub scene_id: String,
    #[source]
    pub error: PipelineError,
}

/// Batch execution knobs.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Upper bound on scenes processed concurrently. 1 (the default)
    /// preserves strictly sequential behavior.
    pub max_parallel: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { max_parallel: 1 }
    }
}

/// Runs the pipeline once per spec, isolating failures per scene.
pub struct BatchRunner {
    pipeline: Arc<ScenePipeline>,
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(pipeline: Arc<ScenePipeline>, options: BatchOptions) -> Self {
        Self { pipeline, options }
    }

    /// Run every spec. The returned vector pairs positionally with the
    /// input: one success result or one captured error per spec, in the
    /// original order. A failing scene never stops the ones after it.
    ///
    /// The store has no internal locking, so duplicate scene ids within
    /// one batch are serialized through a per-id mutex; distinct ids may
    /// run concurrently up to `max_parallel`.
    pub async fn run_all(&self, specs: &[SceneSpec]) -> Vec<Result<SceneResult, BatchError>> {
        let parallelism = self.options.max_parallel.max(1);
        info!(scenes = specs.len(), parallelism, "Starting batch run");

        let mut id_locks: HashMap<String, Arc<Mutex<()>>> = HashMap::new();
        for spec in specs {
            id_locks
                .entry(spec.scene_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())));
        }

        let results: Vec<Result<SceneResult, BatchError>> = stream::iter(specs.iter().cloned())
            .map(|spec| {
                let pipeline = self.pipeline.clone();
                let lock = id_locks[&spec.scene_id].clone();
                async move {
                    let _serialized = lock.lock().await;
                    pipeline.run(&spec).await.map_err(|error| BatchError {
                        scene_id: spec.scene_id.clone(),
                        error,
                    })
                }
            })
            .buffered(parallelism)
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(
            scenes = results.len(),
            failed,
            "Batch run finished"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::tempdir;
    use tokio::sync::watch;

    use sceneforge_media::{MediaResult, TranscodeProfile};
    use sceneforge_models::{
        GenerationRequest, JobHandle, OutputLocator, ProviderKind, ScenePrompt, SceneStatus,
    };
    use sceneforge_providers::{
        GenerationProvider, LipSyncer, PollSettings, ProviderError, ProviderResult,
        SpeechSynthesizer,
    };
    use sceneforge_store::SceneStore;

    use crate::config::PipelineConfig;
    use crate::steps::TranscodeStep;

    /// Fails any scene whose prompt contains "poison".
    struct SelectiveGeneration;

    #[async_trait]
    impl GenerationProvider for SelectiveGeneration {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Kling
        }

        fn min_poll_interval(&self) -> Duration {
            Duration::from_millis(1)
        }

        async fn submit(&self, request: &GenerationRequest) -> ProviderResult<JobHandle> {
            if request.prompt().contains("poison") {
                return Err(ProviderError::remote("content policy violation"));
            }
            Ok(
                JobHandle::submitted(ProviderKind::Kling, "task-1").completed(OutputLocator::Url {
                    url: "https://cdn.example/clip.mp4".into(),
                }),
            )
        }

        async fn poll(&self, handle: &JobHandle) -> ProviderResult<JobHandle> {
            Ok(handle.clone())
        }

        async fn fetch_artifact(&self, _handle: &JobHandle, dest: &Path) -> ProviderResult<PathBuf> {
            tokio::fs::write(dest, b"raw").await?;
            Ok(dest.to_path_buf())
        }
    }

    struct NoopSpeech;

    #[async_trait]
    impl SpeechSynthesizer for NoopSpeech {
        async fn synthesize(
            &self,
            _text: &str,
            _voice: Option<&str>,
            dest: &Path,
        ) -> ProviderResult<PathBuf> {
            tokio::fs::write(dest, b"audio").await?;
            Ok(dest.to_path_buf())
        }
    }

    struct NoopLipSync;

    #[async_trait]
    impl LipSyncer for NoopLipSync {
        async fn lip_sync(
            &self,
            _video: &Path,
            _audio: &Path,
            dest: &Path,
            _timeout: Duration,
            _cancel: Option<watch::Receiver<bool>>,
        ) -> ProviderResult<PathBuf> {
            tokio::fs::write(dest, b"synced").await?;
            Ok(dest.to_path_buf())
        }
    }

    struct CopyTranscode;

    #[async_trait]
    impl TranscodeStep for CopyTranscode {
        async fn transcode(
            &self,
            input: &Path,
            output: &Path,
            _profile: TranscodeProfile,
            _cancel: Option<watch::Receiver<bool>>,
        ) -> MediaResult<PathBuf> {
            tokio::fs::copy(input, output).await?;
            Ok(output.to_path_buf())
        }
    }

    fn spec(scene_id: &str, description: &str) -> SceneSpec {
        SceneSpec::new(scene_id, ScenePrompt::new(description))
    }

    async fn runner(max_parallel: usize) -> (tempfile::TempDir, SceneStore, BatchRunner) {
        let dir = tempdir().unwrap();
        let store = SceneStore::open(dir.path(), "batchproj").await.unwrap();

        let mut config = PipelineConfig::new(ProviderKind::Kling);
        config.poll = PollSettings::new(Duration::from_millis(50), Duration::from_millis(1));

        let pipeline = Arc::new(ScenePipeline::new(
            store.clone(),
            Arc::new(SelectiveGeneration),
            Arc::new(NoopSpeech),
            Arc::new(NoopLipSync),
            Arc::new(CopyTranscode),
            config,
        ));
        (dir, store, BatchRunner::new(pipeline, BatchOptions { max_parallel }))
    }

    #[tokio::test]
    async fn test_middle_failure_is_isolated_and_order_preserved() {
        let (_dir, store, runner) = runner(1).await;
        let specs = vec![
            spec("scene_01", "a calm harbor"),
            spec("scene_02", "poison pill"),
            spec("scene_03", "a mountain pass"),
        ];

        let results = runner.run_all(&specs).await;
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].as_ref().unwrap().scene_id, "scene_01");
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.scene_id, "scene_02");
        assert!(err.to_string().contains("content policy violation"));
        assert_eq!(results[2].as_ref().unwrap().scene_id, "scene_03");

        // The failing scene was persisted as failed, the others completed
        assert_eq!(store.load("scene_01").await.status, SceneStatus::Completed);
        assert_eq!(store.load("scene_02").await.status, SceneStatus::Failed);
        assert_eq!(store.load("scene_03").await.status, SceneStatus::Completed);
    }

    #[tokio::test]
    async fn test_parallel_run_preserves_input_order() {
        let (_dir, _store, runner) = runner(4).await;
        let specs: Vec<SceneSpec> = (1..=6)
            .map(|i| spec(&format!("scene_{:02}", i), "a quiet street"))
            .collect();

        let results = runner.run_all(&specs).await;
        let ids: Vec<_> = results
            .iter()
            .map(|r| r.as_ref().unwrap().scene_id.clone())
            .collect();
        assert_eq!(
            ids,
            vec!["scene_01", "scene_02", "scene_03", "scene_04", "scene_05", "scene_06"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_ids_both_complete() {
        let (_dir, store, runner) = runner(4).await;
        let specs = vec![
            spec("scene_01", "first take"),
            spec("scene_01", "second take"),
        ];

        let results = runner.run_all(&specs).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(store.load("scene_01").await.status, SceneStatus::Completed);
    }
}
