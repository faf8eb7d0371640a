//! Provider adapters for the sceneforge pipeline.
//!
//! Every external compute backend is reached through one of three narrow
//! contracts:
//!
//! - [`GenerationProvider`]: asynchronous video generation with
//!   submit/poll/fetch semantics. Adapters exist for Veo (Vertex AI),
//!   Kling, Sora and Replicate-hosted Wan models; the Replicate adapter
//!   runs in sync mode and returns an already-terminal handle from
//!   `submit`.
//! - [`SpeechSynthesizer`]: synchronous text-to-speech.
//! - [`LipSyncer`]: prediction-style submit/poll lip-sync.
//!
//! The [`await_completion`] loop owns the polling policy: transient
//! network errors are retried until the deadline, cancellation is
//! observed between polls, and deadline exhaustion surfaces as a
//! [`ProviderError::Timeout`] distinct from provider-reported failures.

pub mod builder;
pub mod error;
pub mod kling;
pub mod lipsync;
pub mod provider;
pub mod replicate;
pub mod sora;
pub mod speech;
pub mod veo;

pub use builder::{build_request, GenerationDefaults};
pub use error::{ProviderError, ProviderResult};
pub use kling::{KlingClient, KlingConfig};
pub use lipsync::{LipSyncer, ReplicateLipSync};
pub use provider::{await_completion, GenerationProvider, PollSettings};
pub use replicate::{ReplicateClient, ReplicateConfig};
pub use sora::{SoraClient, SoraConfig};
pub use speech::{ElevenLabsSpeech, SpeechConfig, SpeechSynthesizer};
pub use veo::{VeoClient, VeoConfig};
