//! Durable per-scene metadata store.
//!
//! One JSON document per scene under
//! `<projects_root>/<project>/<scene_id>/metadata.json`. Documents are
//! written atomically (temp file + rename) so a crash mid-write never
//! leaves a reader with a truncated snapshot. The store has no internal
//! locking; serializing concurrent writers per scene id is the caller's
//! responsibility.

mod error;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::{ProjectOverview, SceneOverview, SceneStore};
