//! Configuration management for the audio quest server

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::story::llm::{DEFAULT_LLM_MODEL, DEFAULT_LLM_URL};
use file::QuestConfigFile;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8080;

/// Default timeout for outbound service calls
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Audio quest server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Root for audio files and offline progress data
    pub data_dir: PathBuf,

    /// Story JSON file; the bundled sample story when `None`
    pub story_path: Option<PathBuf>,

    /// Text generation service
    pub llm: LlmConfig,

    /// Speech configuration
    pub voice: VoiceConfig,

    /// Remote progress store, when configured
    pub store: Option<StoreConfig>,

    /// API keys
    pub api_keys: ApiKeys,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Path to static files directory (web client)
    pub static_dir: Option<PathBuf>,
}

/// Text generation service configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Key override; `api_keys.openai` is used when unset
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
}

/// Networked TTS provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    OpenAi,
    ElevenLabs,
    /// Local engine only
    Disabled,
}

impl TtsProvider {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "elevenlabs" => Some(Self::ElevenLabs),
            "none" | "off" | "local" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// Speech recognition provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    Whisper,
    Deepgram,
}

impl SttProvider {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Some(Self::Whisper),
            "deepgram" => Some(Self::Deepgram),
            _ => None,
        }
    }
}

/// Which local speech engine to use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEngine {
    /// Probe `PATH` for espeak-ng or espeak
    Auto,
    /// A specific engine binary
    Binary(PathBuf),
    /// No local synthesis
    Disabled,
}

impl LocalEngine {
    fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "auto" => Self::Auto,
            v if ["off", "none", "false", "0"].contains(&v.to_lowercase().as_str()) => {
                Self::Disabled
            }
            v => Self::Binary(PathBuf::from(v)),
        }
    }
}

/// Speech configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "tts-1", "eleven_monolingual_v1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    pub local_engine: LocalEngine,

    /// Voice passed to the local engine
    pub local_voice: Option<String>,

    /// Try networked TTS before the local engine
    pub prefer_online: bool,
}

/// Remote progress store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub token: Option<SecretString>,
    pub timeout: Duration,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (text generation, Whisper and TTS)
    pub openai: Option<SecretString>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<SecretString>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<SecretString>,
}

fn default_data_dir() -> PathBuf {
    // ~/.local/share/audio-quest on Linux
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("audio-quest"))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl Config {
    /// Load configuration from the environment, the TOML file and defaults
    #[must_use]
    pub fn load() -> Self {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// Priority is env > toml > default for every field.
    #[must_use]
    pub fn from_sources(fc: QuestConfigFile, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = |key: &str| lookup(key).and_then(non_empty);

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
            elevenlabs: env("ELEVENLABS_API_KEY")
                .or(fc.api_keys.elevenlabs)
                .map(SecretString::from),
            deepgram: env("DEEPGRAM_API_KEY")
                .or(fc.api_keys.deepgram)
                .map(SecretString::from),
        };

        let server = ServerConfig {
            port: env("AUDIO_QUEST_PORT")
                .or_else(|| env("PORT"))
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            static_dir: env("AUDIO_QUEST_STATIC_DIR")
                .or(fc.server.static_dir)
                .map(PathBuf::from),
        };

        let data_dir = env("AUDIO_QUEST_DATA_DIR")
            .or(fc.server.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        let story_path = env("AUDIO_QUEST_STORY")
            .or(fc.story.path)
            .map(PathBuf::from);

        let llm = LlmConfig {
            base_url: env("AUDIO_QUEST_LLM_URL")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| DEFAULT_LLM_URL.to_string()),
            model: env("AUDIO_QUEST_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            api_key: fc.llm.api_key.and_then(non_empty).map(SecretString::from),
            timeout: Duration::from_secs(fc.llm.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        };

        let tts_provider = env("AUDIO_QUEST_TTS_PROVIDER")
            .or(fc.voice.tts_provider)
            .and_then(|p| {
                let parsed = TtsProvider::parse(&p);
                if parsed.is_none() {
                    tracing::warn!(provider = %p, "unknown TTS provider, using openai");
                }
                parsed
            })
            .unwrap_or(TtsProvider::OpenAi);

        let (default_tts_model, default_tts_voice) = match tts_provider {
            TtsProvider::ElevenLabs => ("eleven_monolingual_v1", "21m00Tcm4TlvDq8ikWAM"),
            TtsProvider::OpenAi | TtsProvider::Disabled => ("tts-1", "alloy"),
        };

        let stt_provider = fc
            .voice
            .stt_provider
            .as_deref()
            .and_then(SttProvider::parse)
            .unwrap_or(SttProvider::Whisper);

        let default_stt_model = match stt_provider {
            SttProvider::Whisper => "whisper-1",
            SttProvider::Deepgram => "nova-2",
        };

        let voice = VoiceConfig {
            tts_provider,
            tts_model: fc
                .voice
                .tts_model
                .unwrap_or_else(|| default_tts_model.to_string()),
            tts_voice: fc
                .voice
                .tts_voice
                .unwrap_or_else(|| default_tts_voice.to_string()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0).clamp(0.25, 4.0),
            stt_provider,
            stt_model: fc
                .voice
                .stt_model
                .unwrap_or_else(|| default_stt_model.to_string()),
            local_engine: env("AUDIO_QUEST_LOCAL_TTS")
                .or(fc.voice.local_engine)
                .map_or(LocalEngine::Auto, |v| LocalEngine::parse(&v)),
            local_voice: fc.voice.local_voice,
            prefer_online: fc.voice.prefer_online.unwrap_or(true),
        };

        // Remote store only when a URL is present
        let store = env("AUDIO_QUEST_STORE_URL")
            .or(fc.store.url)
            .map(|url| StoreConfig {
                url,
                token: env("AUDIO_QUEST_STORE_TOKEN")
                    .or(fc.store.token)
                    .map(SecretString::from),
                timeout: Duration::from_secs(
                    fc.store.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
                ),
            });

        Self {
            server,
            data_dir,
            story_path,
            llm,
            voice,
            store,
            api_keys,
        }
    }

    /// Directory generated and downloaded audio is stored in
    #[must_use]
    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join("audio")
    }

    /// Root of the local progress store
    #[must_use]
    pub fn offline_dir(&self) -> PathBuf {
        self.data_dir.join("offline_data")
    }

    /// Key for the text generation service
    #[must_use]
    pub fn llm_key(&self) -> Option<&SecretString> {
        self.llm.api_key.as_ref().or(self.api_keys.openai.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn resolve(env: &[(&str, &str)], toml: &str) -> Config {
        let vars: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let fc: QuestConfigFile = toml::from_str(toml).unwrap();
        Config::from_sources(fc, |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = resolve(&[("AUDIO_QUEST_DATA_DIR", "/srv/quest")], "");
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.audio_dir(), PathBuf::from("/srv/quest/audio"));
        assert_eq!(config.offline_dir(), PathBuf::from("/srv/quest/offline_data"));
        assert!(config.story_path.is_none());
        assert!(config.store.is_none());
        assert_eq!(config.voice.tts_provider, TtsProvider::OpenAi);
        assert_eq!(config.voice.local_engine, LocalEngine::Auto);
        assert!(config.voice.prefer_online);
        assert_eq!(config.llm.model, DEFAULT_LLM_MODEL);
        assert!(config.llm_key().is_none());
    }

    #[test]
    fn env_overrides_toml() {
        let config = resolve(
            &[("PORT", "9100"), ("AUDIO_QUEST_LLM_MODEL", "gpt-4o")],
            r#"
            [server]
            port = 9000
            [llm]
            model = "gpt-3.5-turbo"
            "#,
        );
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.llm.model, "gpt-4o");
    }

    #[test]
    fn quest_port_beats_generic_port() {
        let config = resolve(&[("PORT", "9100"), ("AUDIO_QUEST_PORT", "9200")], "");
        assert_eq!(config.server.port, 9200);
    }

    #[test]
    fn toml_beats_default() {
        let config = resolve(
            &[],
            r#"
            [voice]
            tts_provider = "elevenlabs"
            local_engine = "off"
            prefer_online = false
            "#,
        );
        assert_eq!(config.voice.tts_provider, TtsProvider::ElevenLabs);
        assert_eq!(config.voice.tts_model, "eleven_monolingual_v1");
        assert_eq!(config.voice.local_engine, LocalEngine::Disabled);
        assert!(!config.voice.prefer_online);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let config = resolve(&[("OPENAI_API_KEY", "  ")], "[api_keys]\nopenai = \"from-file\"");
        assert_eq!(
            config.api_keys.openai.as_ref().map(|k| k.expose_secret().to_string()),
            Some("from-file".to_string())
        );
    }

    #[test]
    fn store_requires_url() {
        let config = resolve(&[("AUDIO_QUEST_STORE_TOKEN", "t")], "");
        assert!(config.store.is_none());

        let config = resolve(
            &[
                ("AUDIO_QUEST_STORE_URL", "https://docs.example.com"),
                ("AUDIO_QUEST_STORE_TOKEN", "t"),
            ],
            "",
        );
        let store = config.store.unwrap();
        assert_eq!(store.url, "https://docs.example.com");
        assert_eq!(store.token.unwrap().expose_secret(), "t");
    }

    #[test]
    fn local_engine_values() {
        assert_eq!(LocalEngine::parse("auto"), LocalEngine::Auto);
        assert_eq!(LocalEngine::parse("OFF"), LocalEngine::Disabled);
        assert_eq!(
            LocalEngine::parse("/usr/bin/espeak-ng"),
            LocalEngine::Binary(PathBuf::from("/usr/bin/espeak-ng"))
        );
    }
}
