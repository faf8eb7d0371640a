//! Pipeline error aggregation.

use thiserror::Error;

use sceneforge_media::MediaError;
use sceneforge_providers::ProviderError;
use sceneforge_store::StoreError;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Anything that can fail a scene. The original error text survives
/// wrapping so the caller (and the persisted failure log) see the
/// provider's own message.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("speech synthesis failed: {source}")]
    Speech { source: ProviderError },

    #[error("lip-sync failed: {source}")]
    LipSync { source: ProviderError },
}

impl PipelineError {
    pub fn speech(source: ProviderError) -> Self {
        Self::Speech { source }
    }

    pub fn lip_sync(source: ProviderError) -> Self {
        Self::LipSync { source }
    }
}
