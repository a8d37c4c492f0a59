//! Speech-to-text (STT) for recorded voice commands

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::{Error, Result};

const WHISPER_BASE_URL: &str = "https://api.openai.com/v1";
const DEEPGRAM_BASE_URL: &str = "https://api.deepgram.com/v1";

/// A service that transcribes recorded speech
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one recording
    ///
    /// # Errors
    ///
    /// Returns error if the service fails
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String>;
}

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

/// The parts of a Deepgram `listen` result we read
#[derive(Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

impl DeepgramResponse {
    fn into_transcript(self) -> String {
        self.results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug)]
enum Provider {
    Whisper,
    Deepgram,
}

/// Transcribes uploads through Whisper or Deepgram
pub struct SpeechToText {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    provider: Provider,
}

/// Media type without parameters, e.g. `audio/webm` for `audio/webm;codecs=opus`
fn essence(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or(mime_type).trim()
}

/// File extension Whisper uses to detect the container
fn extension_for(mime_type: &str) -> &'static str {
    match essence(mime_type) {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/webm" | "video/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        _ => "wav",
    }
}

impl SpeechToText {
    fn new(api_key: SecretString, model: String, provider: Provider) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config(format!("{provider:?} API key required for STT")));
        }
        let base_url = match provider {
            Provider::Whisper => WHISPER_BASE_URL,
            Provider::Deepgram => DEEPGRAM_BASE_URL,
        };
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
            api_key,
            model,
            provider,
        })
    }

    /// Transcribe with `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new_whisper(api_key: SecretString, model: String) -> Result<Self> {
        Self::new(api_key, model, Provider::Whisper)
    }

    /// Transcribe with Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new_deepgram(api_key: SecretString, model: String) -> Result<Self> {
        Self::new(api_key, model, Provider::Deepgram)
    }

    /// Point the client at a compatible server
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn request(&self, audio: &[u8], mime_type: &str) -> Result<reqwest::RequestBuilder> {
        let mime_type = essence(mime_type);
        let request = match self.provider {
            Provider::Whisper => {
                let file = Part::bytes(audio.to_vec())
                    .file_name(format!("command.{}", extension_for(mime_type)))
                    .mime_str(mime_type)
                    .map_err(|e| Error::Stt(format!("invalid audio type {mime_type}: {e}")))?;
                self.client
                    .post(format!("{}/audio/transcriptions", self.base_url))
                    .bearer_auth(self.api_key.expose_secret())
                    .multipart(Form::new().part("file", file).text("model", self.model.clone()))
            }
            Provider::Deepgram => self
                .client
                .post(format!("{}/listen", self.base_url))
                .query(&[("model", self.model.as_str()), ("punctuate", "true")])
                .header(
                    reqwest::header::AUTHORIZATION,
                    format!("Token {}", self.api_key.expose_secret()),
                )
                .header(reqwest::header::CONTENT_TYPE, mime_type)
                .body(audio.to_vec()),
        };
        Ok(request)
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String> {
        tracing::debug!(provider = ?self.provider, bytes = audio.len(), mime_type, "transcribing");

        let response = self.request(audio, mime_type)?.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(provider = ?self.provider, %status, "transcription rejected");
            return Err(Error::Stt(format!("{:?} returned {status}: {body}", self.provider)));
        }

        let transcript = match self.provider {
            Provider::Whisper => response.json::<WhisperResponse>().await?.text,
            Provider::Deepgram => response.json::<DeepgramResponse>().await?.into_transcript(),
        };

        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}
