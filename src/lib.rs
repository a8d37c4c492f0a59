//! Audio Quest - branching audio adventures over HTTP
//!
//! This library provides the core functionality for the audio quest server:
//! - Static and generated story scenes
//! - Narration through networked or local text-to-speech, cached on disk
//! - Spoken commands matched against scene choices
//! - Per-user progress with a remote store and a local fallback
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     HTTP API                         │
//! │   Story  │  Voice  │  Audio files  │  Health        │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                      Quest                           │
//! │   Story store  │  Generator  │  TTS cache  │  STT   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Session store                       │
//! │   Remote document store  │  Local JSON files        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod quest;
pub mod session;
pub mod story;
pub mod voice;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use quest::{Advance, Quest, QuestBuilder, QuestError, SceneResponse, VoiceResponse};
pub use session::{
    ChoiceRecord, LocalProgressStore, MetricEvent, ProgressBackend, RemoteProgressStore,
    SessionStore, UserState,
};
pub use story::{Choice, Mood, Scene, StoryStore};
pub use voice::{ArtifactState, AudioArtifact, AudioDispatcher, SceneAudio};
