//! Filesystem-backed scene store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use sceneforge_models::{FileReference, GenerationRecord, SceneState, SceneStatus, VideoAnalysis};

use crate::error::{StoreError, StoreResult};

const METADATA_FILE: &str = "metadata.json";
const METADATA_TMP_FILE: &str = "metadata.json.tmp";

/// Per-project scene metadata store.
///
/// Cheap to clone; holds only the resolved project directory.
#[derive(Debug, Clone)]
pub struct SceneStore {
    projects_root: PathBuf,
    project_name: String,
    project_dir: PathBuf,
}

impl SceneStore {
    /// Open (and create if needed) the store for one project.
    pub async fn open(
        projects_root: impl AsRef<Path>,
        project_name: impl Into<String>,
    ) -> StoreResult<Self> {
        let projects_root = projects_root.as_ref().to_path_buf();
        let project_name = project_name.into();
        let project_dir = projects_root.join(&project_name);

        fs::create_dir_all(&project_dir)
            .await
            .map_err(|e| StoreError::io(&project_dir, e))?;

        info!(project = %project_name, dir = %project_dir.display(), "Opened scene store");

        Ok(Self {
            projects_root,
            project_name,
            project_dir,
        })
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Directory owned by one scene.
    pub fn scene_dir(&self, scene_id: &str) -> PathBuf {
        self.project_dir.join(scene_id)
    }

    fn metadata_path(&self, scene_id: &str) -> PathBuf {
        self.scene_dir(scene_id).join(METADATA_FILE)
    }

    /// Create the scene directory and an initial record if none exists.
    ///
    /// Idempotent: calling it twice is not an error and never overwrites
    /// an existing record. Returns the scene directory.
    pub async fn create(&self, scene_id: &str) -> StoreResult<PathBuf> {
        let scene_dir = self.scene_dir(scene_id);
        fs::create_dir_all(&scene_dir)
            .await
            .map_err(|e| StoreError::io(&scene_dir, e))?;

        let metadata_path = self.metadata_path(scene_id);
        if !metadata_path.exists() {
            self.save(scene_id, &SceneState::new(scene_id)).await?;
            info!(scene_id = %scene_id, dir = %scene_dir.display(), "Created scene");
        }

        Ok(scene_dir)
    }

    /// Load the current record for a scene.
    ///
    /// Never fails: a missing or unreadable document yields a synthetic
    /// record with `status: unknown` so callers can decide how to proceed.
    pub async fn load(&self, scene_id: &str) -> SceneState {
        let path = self.metadata_path(scene_id);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return SceneState::unknown(scene_id);
            }
            Err(e) => {
                warn!(scene_id = %scene_id, path = %path.display(), error = %e,
                    "Failed to read scene metadata");
                return SceneState::unknown(scene_id);
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!(scene_id = %scene_id, path = %path.display(), error = %e,
                    "Corrupt scene metadata, treating as unknown");
                SceneState::unknown(scene_id)
            }
        }
    }

    /// Persist a full record atomically.
    ///
    /// The document is written to a sibling temp file and renamed into
    /// place, so a crash mid-write leaves the previous valid snapshot
    /// intact. Parent directories are created as needed.
    pub async fn save(&self, scene_id: &str, state: &SceneState) -> StoreResult<()> {
        let scene_dir = self.scene_dir(scene_id);
        fs::create_dir_all(&scene_dir)
            .await
            .map_err(|e| StoreError::io(&scene_dir, e))?;

        let json = serde_json::to_vec_pretty(state).map_err(|e| StoreError::Serialize {
            scene_id: scene_id.to_string(),
            source: e,
        })?;

        let tmp_path = scene_dir.join(METADATA_TMP_FILE);
        let final_path = scene_dir.join(METADATA_FILE);

        fs::write(&tmp_path, &json)
            .await
            .map_err(|e| StoreError::io(&tmp_path, e))?;

        fs::rename(&tmp_path, &final_path).await.map_err(|e| {
            // Leave no stray temp file behind on failure
            let _ = std::fs::remove_file(&tmp_path);
            StoreError::io(&final_path, e)
        })?;

        debug!(scene_id = %scene_id, "Saved scene metadata");
        Ok(())
    }

    /// Read-modify-write: set the status field only.
    pub async fn update_status(&self, scene_id: &str, status: SceneStatus) -> StoreResult<()> {
        let mut state = self.load_or_init(scene_id).await;
        state.set_status(status);
        self.save(scene_id, &state).await?;
        info!(scene_id = %scene_id, status = %status, "Updated scene status");
        Ok(())
    }

    /// Read-modify-write: insert or overwrite one file role.
    pub async fn set_file_reference(
        &self,
        scene_id: &str,
        role: &str,
        path: impl Into<String>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> StoreResult<()> {
        let path = path.into();
        let mut state = self.load_or_init(scene_id).await;
        state.set_file(role, FileReference { path: path.clone(), metadata });
        self.save(scene_id, &state).await?;
        info!(scene_id = %scene_id, role = %role, path = %path, "Recorded file reference");
        Ok(())
    }

    /// Read-modify-write: record the parameters of a generation attempt.
    pub async fn set_generation(
        &self,
        scene_id: &str,
        record: GenerationRecord,
    ) -> StoreResult<()> {
        let mut state = self.load_or_init(scene_id).await;
        state.generation = Some(record);
        state.updated_at = Some(chrono::Utc::now());
        self.save(scene_id, &state).await?;
        debug!(scene_id = %scene_id, "Recorded generation parameters");
        Ok(())
    }

    /// Read-modify-write: attach a post-hoc video analysis.
    pub async fn set_video_analysis(
        &self,
        scene_id: &str,
        analysis: VideoAnalysis,
    ) -> StoreResult<()> {
        let mut state = self.load_or_init(scene_id).await;
        state.video_analysis = Some(analysis);
        state.updated_at = Some(chrono::Utc::now());
        self.save(scene_id, &state).await?;
        debug!(scene_id = %scene_id, "Recorded video analysis");
        Ok(())
    }

    /// All scene ids under the project, sorted for determinism.
    pub async fn list_scenes(&self) -> StoreResult<Vec<String>> {
        let mut scenes = Vec::new();

        let mut entries = match fs::read_dir(&self.project_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(scenes),
            Err(e) => return Err(StoreError::io(&self.project_dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.project_dir, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| StoreError::io(entry.path(), e))?
                .is_dir();
            if is_dir {
                scenes.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        scenes.sort();
        Ok(scenes)
    }

    /// Per-scene status and recorded roles for the whole project.
    pub async fn project_overview(&self) -> StoreResult<ProjectOverview> {
        let mut scenes = BTreeMap::new();
        for scene_id in self.list_scenes().await? {
            let state = self.load(&scene_id).await;
            scenes.insert(
                scene_id,
                SceneOverview {
                    status: state.status,
                    files: state.files.keys().cloned().collect(),
                },
            );
        }

        Ok(ProjectOverview {
            projects_root: self.projects_root.display().to_string(),
            project_name: self.project_name.clone(),
            project_dir: self.project_dir.display().to_string(),
            scenes,
        })
    }

    /// Existing record, or a fresh `created` record when only the
    /// synthetic `unknown` is available.
    async fn load_or_init(&self, scene_id: &str) -> SceneState {
        let state = self.load(scene_id).await;
        if state.status == SceneStatus::Unknown {
            SceneState::new(scene_id)
        } else {
            state
        }
    }
}

/// Project-wide status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectOverview {
    pub projects_root: String,
    pub project_name: String,
    pub project_dir: String,
    pub scenes: BTreeMap<String, SceneOverview>,
}

/// One scene's status and recorded file roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneOverview {
    pub status: SceneStatus,
    pub files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn store() -> (tempfile::TempDir, SceneStore) {
        let dir = tempdir().unwrap();
        let store = SceneStore::open(dir.path(), "testproj").await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_then_load() {
        let (_dir, store) = store().await;
        let scene_dir = store.create("scene_01").await.unwrap();
        assert!(scene_dir.ends_with("testproj/scene_01"));

        let state = store.load("scene_01").await;
        assert_eq!(state.status, SceneStatus::Created);
        assert!(state.files.is_empty());
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let (_dir, store) = store().await;
        store.create("scene_01").await.unwrap();
        store
            .update_status("scene_01", SceneStatus::Processing)
            .await
            .unwrap();

        // Second create must not reset the existing record
        store.create("scene_01").await.unwrap();
        assert_eq!(store.load("scene_01").await.status, SceneStatus::Processing);
    }

    #[tokio::test]
    async fn test_load_missing_scene_is_unknown() {
        let (_dir, store) = store().await;
        let state = store.load("ghost").await;
        assert_eq!(state.status, SceneStatus::Unknown);
        assert_eq!(state.scene_id, "ghost");
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_unknown() {
        let (_dir, store) = store().await;
        store.create("scene_01").await.unwrap();
        std::fs::write(store.scene_dir("scene_01").join(METADATA_FILE), b"{not json").unwrap();

        let state = store.load("scene_01").await;
        assert_eq!(state.status, SceneStatus::Unknown);
    }

    #[tokio::test]
    async fn test_crash_between_temp_write_and_rename_preserves_snapshot() {
        let (_dir, store) = store().await;
        store.create("scene_01").await.unwrap();
        store
            .update_status("scene_01", SceneStatus::Completed)
            .await
            .unwrap();

        // Simulate a crash that left a truncated temp file behind
        std::fs::write(
            store.scene_dir("scene_01").join(METADATA_TMP_FILE),
            b"{\"scene_id\": \"scene_0",
        )
        .unwrap();

        let state = store.load("scene_01").await;
        assert_eq!(state.status, SceneStatus::Completed);
    }

    #[tokio::test]
    async fn test_update_status_preserves_other_fields() {
        let (_dir, store) = store().await;
        store.create("scene_01").await.unwrap();
        store
            .set_file_reference("scene_01", "raw_video", "/tmp/raw.mp4", BTreeMap::new())
            .await
            .unwrap();
        store
            .update_status("scene_01", SceneStatus::Processing)
            .await
            .unwrap();

        let state = store.load("scene_01").await;
        assert_eq!(state.status, SceneStatus::Processing);
        assert_eq!(state.file_path("raw_video"), Some("/tmp/raw.mp4"));
    }

    #[tokio::test]
    async fn test_file_reference_overwrite() {
        let (_dir, store) = store().await;
        store.create("scene_01").await.unwrap();
        store
            .set_file_reference("scene_01", "raw_video", "/tmp/a.mp4", BTreeMap::new())
            .await
            .unwrap();
        store
            .set_file_reference("scene_01", "raw_video", "/tmp/b.mp4", BTreeMap::new())
            .await
            .unwrap();

        let state = store.load("scene_01").await;
        assert_eq!(state.file_path("raw_video"), Some("/tmp/b.mp4"));
        assert_eq!(state.files.len(), 1);
    }

    #[tokio::test]
    async fn test_list_scenes_sorted() {
        let (_dir, store) = store().await;
        store.create("scene_03").await.unwrap();
        store.create("scene_01").await.unwrap();
        store.create("scene_02").await.unwrap();

        let scenes = store.list_scenes().await.unwrap();
        assert_eq!(scenes, vec!["scene_01", "scene_02", "scene_03"]);
    }

    #[tokio::test]
    async fn test_project_overview() {
        let (_dir, store) = store().await;
        store.create("scene_01").await.unwrap();
        store
            .set_file_reference("scene_01", "raw_video", "/tmp/raw.mp4", BTreeMap::new())
            .await
            .unwrap();

        let overview = store.project_overview().await.unwrap();
        assert_eq!(overview.project_name, "testproj");
        let scene = overview.scenes.get("scene_01").unwrap();
        assert_eq!(scene.files, vec!["raw_video"]);
    }
}
