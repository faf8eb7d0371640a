//! Command-line surface.

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "sceneforge", about = "Scene-to-deliverable video production pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a single scene end to end
    Generate(GenerateArgs),
    /// Run an ordered batch of scenes from a config document
    Batch(BatchArgs),
    /// Show per-scene status for a project
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct ProjectArgs {
    /// Root directory holding all projects
    #[arg(long, default_value = "./projects")]
    pub projects_root: String,

    /// Project name (one directory under the root)
    #[arg(long, default_value = "default")]
    pub project: String,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Scene identifier, unique within the project
    #[arg(long)]
    pub scene_id: String,

    /// Main cinematic description
    #[arg(long)]
    pub prompt: String,

    /// Character consistency notes
    #[arg(long)]
    pub character: Option<String>,

    /// Camera movement direction
    #[arg(long)]
    pub camera: Option<String>,

    /// Lighting and visual style
    #[arg(long)]
    pub lighting: Option<String>,

    /// Emotion and facial performance
    #[arg(long)]
    pub emotion: Option<String>,

    /// Dialogue text; enables speech synthesis and lip-sync
    #[arg(long)]
    pub dialogue: Option<String>,

    /// Voice selector for speech synthesis
    #[arg(long)]
    pub voice: Option<String>,

    /// Generation provider (veo, kling, sora, replicate); overrides
    /// SCENEFORGE_PROVIDER
    #[arg(long)]
    pub provider: Option<String>,

    /// Clip duration in seconds
    #[arg(long)]
    pub duration: Option<u32>,

    /// Generation seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Negative prompt
    #[arg(long)]
    pub negative_prompt: Option<String>,

    /// Reference image (local path, URL or gs:// URI)
    #[arg(long)]
    pub input_image: Option<String>,

    /// Reference video for continuation
    #[arg(long)]
    pub input_video: Option<String>,

    /// Skip lip-sync even when dialogue is present
    #[arg(long)]
    pub skip_lipsync: bool,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Path to a JSON batch document with an ordered `scenes` list
    #[arg(long)]
    pub config: String,

    /// Generation provider; overrides the document and SCENEFORGE_PROVIDER
    #[arg(long)]
    pub provider: Option<String>,

    /// Upper bound on concurrently processed scenes
    #[arg(long, default_value_t = 1)]
    pub max_parallel: usize,

    /// Skip lip-sync for every scene
    #[arg(long)]
    pub skip_lipsync: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Show one scene's full record instead of the project overview
    #[arg(long)]
    pub scene_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_parses_minimal_invocation() {
        let cli = Cli::parse_from([
            "sceneforge",
            "generate",
            "--scene-id",
            "scene_01",
            "--prompt",
            "a harbor at dusk",
        ]);
        match cli.command {
            Command::Generate(args) => {
                assert_eq!(args.scene_id, "scene_01");
                assert!(!args.skip_lipsync);
                assert_eq!(args.project.project, "default");
            }
            _ => panic!("expected generate"),
        }
    }
}
