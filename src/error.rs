//! Error types for the audio quest server

use thiserror::Error;

/// Result type alias for audio quest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the audio quest server
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Story definition could not be loaded or is inconsistent
    #[error("story error: {0}")]
    Story(String),

    /// Scene not present in the story
    #[error("scene not found: {0}")]
    SceneNotFound(String),

    /// Choice not present in a scene
    #[error("choice {choice} not found in scene {scene}")]
    ChoiceNotFound { scene: String, choice: String },

    /// Text generation service error
    #[error("llm error: {0}")]
    Llm(String),

    /// Generated scene failed validation
    #[error("invalid scene: {0}")]
    InvalidScene(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Remote audio download error
    #[error("download error: {0}")]
    Download(String),

    /// Progress store error
    #[error("store error: {0}")]
    Store(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
