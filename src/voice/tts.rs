//! Networked text-to-speech (TTS)

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::{Error, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";

/// Longest input the speech endpoints accept in one request
const MAX_INPUT_CHARS: usize = 4096;

/// A networked speech synthesis backend returning encoded audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` into MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

#[derive(Clone, Copy, Debug)]
enum Provider {
    OpenAi { speed: f32 },
    ElevenLabs,
}

/// MP3 narration from `OpenAI` or `ElevenLabs`
pub struct TextToSpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    voice: String,
    model: String,
    provider: Provider,
}

fn require_key(api_key: &SecretString, provider: &str) -> Result<()> {
    if api_key.expose_secret().trim().is_empty() {
        return Err(Error::Config(format!("{provider} API key required for TTS")));
    }
    Ok(())
}

/// Cut `text` to the request limit on a character boundary
fn clamp_input(text: &str) -> &str {
    text.char_indices()
        .nth(MAX_INPUT_CHARS)
        .map_or(text, |(end, _)| &text[..end])
}

impl TextToSpeech {
    /// `OpenAI` speech with a voice name such as "alloy"
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new_openai(
        api_key: SecretString,
        voice: String,
        speed: f32,
        model: String,
    ) -> Result<Self> {
        require_key(&api_key, "OpenAI")?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key,
            voice,
            model,
            provider: Provider::OpenAi { speed },
        })
    }

    /// `ElevenLabs` speech with a voice id
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new_elevenlabs(api_key: SecretString, voice_id: String, model: String) -> Result<Self> {
        require_key(&api_key, "ElevenLabs")?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: ELEVENLABS_BASE_URL.to_string(),
            api_key,
            voice: voice_id,
            model,
            provider: Provider::ElevenLabs,
        })
    }

    /// Point the client at a compatible server
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn request(&self, text: &str) -> reqwest::RequestBuilder {
        let input = clamp_input(text);
        match self.provider {
            Provider::OpenAi { speed } => self
                .client
                .post(format!("{}/audio/speech", self.base_url))
                .bearer_auth(self.api_key.expose_secret())
                .json(&json!({
                    "model": self.model,
                    "input": input,
                    "voice": self.voice,
                    "speed": speed,
                    "response_format": "mp3",
                })),
            Provider::ElevenLabs => self
                .client
                .post(format!("{}/text-to-speech/{}", self.base_url, self.voice))
                .header("xi-api-key", self.api_key.expose_secret())
                .header(reqwest::header::ACCEPT, "audio/mpeg")
                .json(&json!({ "text": input, "model_id": self.model })),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(Error::Tts("nothing to synthesize".to_string()));
        }

        let response = self.request(text).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("{} returned {status}: {body}", self.name())));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(Error::Tts(format!("{} returned no audio", self.name())));
        }
        tracing::debug!(provider = self.name(), bytes = audio.len(), "speech synthesized");
        Ok(audio.to_vec())
    }

    fn name(&self) -> &'static str {
        match self.provider {
            Provider::OpenAi { .. } => "openai-tts",
            Provider::ElevenLabs => "elevenlabs",
        }
    }
}
