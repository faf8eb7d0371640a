//! Subcommand implementations.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use sceneforge_media::Transcoder;
use sceneforge_models::{ScenePrompt, SceneSpec};
use sceneforge_pipeline::{BatchOptions, BatchRunner, PipelineConfig, ScenePipeline};
use sceneforge_store::SceneStore;

use crate::cli::{BatchArgs, GenerateArgs, ProjectArgs, StatusArgs};
use crate::config;

/// Ordered batch document accepted by `sceneforge batch`.
#[derive(Debug, Deserialize)]
struct BatchDocument {
    /// Provider for the whole batch; the CLI flag overrides it
    #[serde(default)]
    provider: Option<String>,
    /// Voice for all dialogue scenes
    #[serde(default)]
    voice: Option<String>,
    scenes: Vec<SceneSpec>,
}

/// One line of the batch aggregate printed to stdout.
#[derive(Debug, Serialize)]
struct BatchEntry {
    scene_id: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<std::collections::BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn build_pipeline(
    project: &ProjectArgs,
    provider_flag: Option<&str>,
    voice: Option<String>,
    skip_lipsync: bool,
) -> Result<ScenePipeline> {
    let kind = config::resolve_provider(provider_flag)?;

    let mut pipeline_config = PipelineConfig::new(kind);
    pipeline_config.defaults = config::generation_defaults();
    pipeline_config.poll = config::poll_settings();
    pipeline_config.lip_sync_timeout = config::lip_sync_timeout();
    pipeline_config.voice = voice;
    pipeline_config.skip_lipsync = skip_lipsync;

    let store = SceneStore::open(&project.projects_root, &project.project)
        .await
        .context("failed to open scene store")?;

    Ok(ScenePipeline::new(
        store,
        config::build_generation_provider(kind)?,
        config::build_speech()?,
        config::build_lipsync()?,
        Arc::new(Transcoder::default()),
        pipeline_config,
    ))
}

pub async fn generate(args: GenerateArgs) -> Result<()> {
    let spec = SceneSpec {
        scene_id: args.scene_id.clone(),
        prompt: ScenePrompt {
            cinematic_description: args.prompt,
            character_notes: args.character,
            camera_movement: args.camera,
            lighting_style: args.lighting,
            emotion_performance: args.emotion,
            dialogue_text: args.dialogue,
        },
        duration_secs: args.duration,
        seed: args.seed,
        negative_prompt: args.negative_prompt,
        input_image: args.input_image,
        input_video: args.input_video,
    };

    let pipeline = build_pipeline(
        &args.project,
        args.provider.as_deref(),
        args.voice,
        args.skip_lipsync,
    )
    .await?;

    let result = pipeline
        .run(&spec)
        .await
        .with_context(|| format!("scene {} failed", args.scene_id))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub async fn batch(args: BatchArgs) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.config)
        .await
        .with_context(|| format!("cannot read batch config {}", args.config))?;
    let document: BatchDocument =
        serde_json::from_str(&raw).context("invalid batch config document")?;

    if document.scenes.is_empty() {
        bail!("batch config contains no scenes");
    }
    info!(scenes = document.scenes.len(), "Loaded batch config");

    let provider_flag = args.provider.as_deref().or(document.provider.as_deref());
    let pipeline = build_pipeline(
        &args.project,
        provider_flag,
        document.voice.clone(),
        args.skip_lipsync,
    )
    .await?;

    let runner = BatchRunner::new(
        Arc::new(pipeline),
        BatchOptions {
            max_parallel: args.max_parallel,
        },
    );
    let results = runner.run_all(&document.scenes).await;

    let entries: Vec<BatchEntry> = results
        .iter()
        .zip(&document.scenes)
        .map(|(result, spec)| match result {
            Ok(r) => BatchEntry {
                scene_id: r.scene_id.clone(),
                ok: true,
                files: Some(r.files.clone()),
                error: None,
            },
            Err(e) => BatchEntry {
                scene_id: spec.scene_id.clone(),
                ok: false,
                files: None,
                error: Some(e.error.to_string()),
            },
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&entries)?);

    let failed = entries.iter().filter(|e| !e.ok).count();
    if failed > 0 {
        bail!("{} of {} scenes failed", failed, entries.len());
    }
    Ok(())
}

pub async fn status(args: StatusArgs) -> Result<()> {
    let store = SceneStore::open(&args.project.projects_root, &args.project.project)
        .await
        .context("failed to open scene store")?;

    if let Some(scene_id) = &args.scene_id {
        let state = store.load(scene_id).await;
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        let overview = store.project_overview().await?;
        println!("{}", serde_json::to_string_pretty(&overview)?);
    }
    Ok(())
}
