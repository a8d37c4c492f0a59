//! Daemon - the main quest service
//!
//! Builds every collaborator from [`Config`] once at startup and serves the
//! HTTP API until interrupted. Missing credentials disable the matching
//! feature instead of failing startup.

use std::sync::Arc;

use crate::api::ApiServerBuilder;
use crate::config::{LocalEngine, SttProvider, TtsProvider};
use crate::quest::Quest;
use crate::session::{LocalProgressStore, RemoteProgressStore, SessionStore};
use crate::story::{
    ChatCompletionClient, EmotionClassifier, SceneGenerator, StoryStore, TextGenerator,
};
use crate::voice::{
    AudioDispatcher, EspeakSynthesizer, LocalSynthesizer, SpeechSynthesizer, SpeechToText,
    TextToSpeech, Transcriber,
};
use crate::{Config, Result};

/// The quest daemon - owns the configuration and the wired-up services
pub struct Daemon {
    config: Config,
    quest: Arc<Quest>,
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// # Errors
    ///
    /// Returns error if a configured story cannot be loaded or the data
    /// directory is not writable
    pub fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let story = load_story(&config)?;
        let llm = init_llm(&config);
        let sessions = init_sessions(&config)?;
        let audio = AudioDispatcher::new(
            config.audio_dir(),
            init_tts(&config),
            init_local_tts(&config),
        );

        let mut builder = Quest::builder(audio, sessions).prefer_online(config.voice.prefer_online);
        if let Some(story) = story {
            builder = builder.story(story);
        }
        if let Some(llm) = llm {
            builder = builder
                .generator(SceneGenerator::new(llm.clone()))
                .classifier(EmotionClassifier::new(llm));
        }
        if let Some(transcriber) = init_stt(&config) {
            builder = builder.transcriber(transcriber);
        }

        Ok(Self {
            config,
            quest: Arc::new(builder.build()),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn quest(&self) -> &Arc<Quest> {
        &self.quest
    }

    /// Serve the HTTP API until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the server cannot bind or fails while running
    pub async fn run(self) -> Result<()> {
        let audio = self.quest.audio();
        tracing::info!(
            port = self.config.server.port,
            data_dir = %self.config.data_dir.display(),
            story = self.quest.story().and_then(StoryStore::title).unwrap_or("none"),
            online_tts = audio.has_online(),
            local_tts = audio.has_local(),
            store = self.quest.sessions().backend_name(),
            "daemon running"
        );

        ApiServerBuilder::new(self.quest, self.config.server.port)
            .static_dir(self.config.server.static_dir)
            .build()
            .run()
            .await
    }
}

/// Load the configured story, or the bundled sample
fn load_story(config: &Config) -> Result<Option<Arc<StoryStore>>> {
    if let Some(path) = &config.story_path {
        let story = StoryStore::load(path)?;
        tracing::info!(path = %path.display(), scenes = story.len(), "story loaded");
        return Ok(Some(Arc::new(story)));
    }

    match StoryStore::sample() {
        Ok(story) => Ok(Some(Arc::new(story))),
        Err(e) => {
            tracing::error!(error = %e, "sample story unavailable");
            Ok(None)
        }
    }
}

fn init_llm(config: &Config) -> Option<Arc<dyn TextGenerator>> {
    let Some(key) = config.llm_key() else {
        tracing::warn!("no text generation key configured, generated scenes use defaults");
        return None;
    };

    match ChatCompletionClient::new(
        &config.llm.base_url,
        key.clone(),
        config.llm.model.clone(),
        config.llm.timeout,
    ) {
        Ok(client) => {
            tracing::info!(
                url = %config.llm.base_url,
                model = %config.llm.model,
                "text generation enabled"
            );
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize text generation");
            None
        }
    }
}

fn init_tts(config: &Config) -> Option<Arc<dyn SpeechSynthesizer>> {
    let voice = &config.voice;
    let result = match voice.tts_provider {
        TtsProvider::Disabled => return None,
        TtsProvider::OpenAi => config.api_keys.openai.clone().map(|key| {
            TextToSpeech::new_openai(
                key,
                voice.tts_voice.clone(),
                voice.tts_speed,
                voice.tts_model.clone(),
            )
        }),
        TtsProvider::ElevenLabs => config.api_keys.elevenlabs.clone().map(|key| {
            TextToSpeech::new_elevenlabs(key, voice.tts_voice.clone(), voice.tts_model.clone())
        }),
    };

    match result {
        Some(Ok(tts)) => {
            tracing::info!(provider = tts.name(), "online TTS enabled");
            Some(Arc::new(tts))
        }
        Some(Err(e)) => {
            tracing::error!(error = %e, "failed to initialize online TTS");
            None
        }
        None => {
            tracing::warn!(
                provider = ?voice.tts_provider,
                "no TTS key configured, using local TTS only"
            );
            None
        }
    }
}

fn init_local_tts(config: &Config) -> Option<Arc<dyn LocalSynthesizer>> {
    let engine = match &config.voice.local_engine {
        LocalEngine::Disabled => return None,
        LocalEngine::Binary(path) => Some(EspeakSynthesizer::new(path.clone())),
        LocalEngine::Auto => EspeakSynthesizer::detect(),
    };

    match engine {
        Some(engine) => {
            let engine = engine.with_voice(config.voice.local_voice.clone());
            tracing::info!(engine = engine.name(), "local TTS enabled");
            Some(Arc::new(engine))
        }
        None => {
            tracing::warn!("no local speech engine found on PATH");
            None
        }
    }
}

fn init_stt(config: &Config) -> Option<Arc<dyn Transcriber>> {
    let voice = &config.voice;
    let result = match voice.stt_provider {
        SttProvider::Whisper => config
            .api_keys
            .openai
            .clone()
            .map(|key| SpeechToText::new_whisper(key, voice.stt_model.clone())),
        SttProvider::Deepgram => config
            .api_keys
            .deepgram
            .clone()
            .map(|key| SpeechToText::new_deepgram(key, voice.stt_model.clone())),
    };

    match result {
        Some(Ok(stt)) => Some(Arc::new(stt)),
        Some(Err(e)) => {
            tracing::error!(error = %e, "failed to initialize speech recognition");
            None
        }
        None => {
            tracing::warn!(
                provider = ?voice.stt_provider,
                "no STT key configured, voice input disabled"
            );
            None
        }
    }
}

fn init_sessions(config: &Config) -> Result<SessionStore> {
    let local = LocalProgressStore::new(config.offline_dir())?;

    let Some(store) = &config.store else {
        return Ok(SessionStore::local(local));
    };

    match RemoteProgressStore::new(&store.url, store.token.clone(), store.timeout) {
        Ok(remote) => {
            tracing::info!(url = %store.url, "remote progress store enabled");
            Ok(SessionStore::with_fallback(Arc::new(remote), local))
        }
        Err(e) => {
            tracing::error!(error = %e, "invalid remote store, keeping progress locally");
            Ok(SessionStore::local(local))
        }
    }
}
