//! TOML configuration file loading
//!
//! Supports `~/.config/audio-quest/config.toml` (or `$AUDIO_QUEST_CONFIG`) as a
//! persistent config source. All fields are optional; the file is a partial
//! overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct QuestConfigFile {
    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Static story configuration
    #[serde(default)]
    pub story: StoryFileConfig,

    /// Text generation configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Speech configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Remote progress store
    #[serde(default)]
    pub store: StoreFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// HTTP port
    pub port: Option<u16>,

    /// Directory with the web client, served at `/`
    pub static_dir: Option<String>,

    /// Root for audio files and offline progress data
    pub data_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoryFileConfig {
    /// Story JSON file; the bundled sample story when unset
    pub path: Option<String>,
}

/// Text generation service configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// OpenAI-compatible base URL
    pub base_url: Option<String>,

    /// Model identifier (e.g. "gpt-4o-mini")
    pub model: Option<String>,

    /// Key for the service, if different from `api_keys.openai`
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// "openai", "elevenlabs" or "none"
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy" or an ElevenLabs voice id)
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// "whisper" or "deepgram"
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Local engine binary, or "off" to disable local synthesis
    pub local_engine: Option<String>,

    /// Voice passed to the local engine
    pub local_voice: Option<String>,

    /// Try networked TTS before the local engine
    pub prefer_online: Option<bool>,
}

/// Remote progress store configuration
#[derive(Debug, Default, Deserialize)]
pub struct StoreFileConfig {
    /// Document service base URL; progress stays local when unset
    pub url: Option<String>,

    /// Bearer token for the service
    pub token: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
    pub deepgram: Option<String>,
}

/// Load the TOML config file from `$AUDIO_QUEST_CONFIG` or the standard path
///
/// Returns `QuestConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> QuestConfigFile {
    let path = std::env::var("AUDIO_QUEST_CONFIG")
        .ok()
        .map(PathBuf::from)
        .or_else(config_file_path);

    path.map_or_else(QuestConfigFile::default, |p| load_config_file_from(&p))
}

/// Load a specific TOML config file, falling back to defaults
pub fn load_config_file_from(path: &Path) -> QuestConfigFile {
    if !path.exists() {
        return QuestConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                QuestConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            QuestConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/audio-quest/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("audio-quest").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let fc: QuestConfigFile = toml::from_str(
            r#"
            [server]
            port = 9000

            [voice]
            tts_provider = "elevenlabs"
            prefer_online = false
            "#,
        )
        .unwrap();
        assert_eq!(fc.server.port, Some(9000));
        assert_eq!(fc.voice.tts_provider.as_deref(), Some("elevenlabs"));
        assert_eq!(fc.voice.prefer_online, Some(false));
        assert!(fc.store.url.is_none());
    }

    #[test]
    fn missing_or_broken_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_config_file_from(&dir.path().join("nope.toml"));
        assert!(missing.server.port.is_none());

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[server\nport = ").unwrap();
        assert!(load_config_file_from(&broken).server.port.is_none());
    }
}
