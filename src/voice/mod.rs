//! Voice processing module
//!
//! Text-to-speech with an on-disk artifact cache, speech-to-text, and matching
//! of spoken commands against scene choices.

pub mod cache;
mod local;
pub mod matcher;
mod stt;
mod tts;

pub use cache::{
    AMBIENCE_LIBRARY, AUDIO_CONTENT_TYPE, ArtifactState, AudioArtifact, AudioDispatcher,
    SceneAudio, WAV_CONTENT_TYPE, sniff_content_type,
};
pub use local::{EspeakSynthesizer, LocalSynthesizer};
pub use matcher::{VoiceCommandError, match_choice, resolve_voice_command};
pub use stt::{SpeechToText, Transcriber};
pub use tts::{SpeechSynthesizer, TextToSpeech};
