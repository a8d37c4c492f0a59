//! Shared test utilities

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use audio_quest::session::{ChoiceRecord, MetricEvent, ProgressBackend, UserState};
use audio_quest::story::TextGenerator;
use audio_quest::voice::{LocalSynthesizer, SpeechSynthesizer, Transcriber};
use audio_quest::{
    AudioDispatcher, Error, LocalProgressStore, Quest, Result, SessionStore, StoryStore,
};

/// Bytes written by the fake synthesizers
pub const FAKE_MP3: &[u8] = b"ID3\x03fake-mp3-frames";

/// Networked synthesizer that counts calls and can be told to fail
#[derive(Default)]
pub struct FakeSynthesizer {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl FakeSynthesizer {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Tts("quota exceeded".to_string()));
        }
        Ok(FAKE_MP3.to_vec())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Local engine that optionally waits for a release before writing
///
/// Tracks how many renders overlap so callers can check they are serialized.
#[derive(Default)]
pub struct FakeLocalEngine {
    pub calls: AtomicUsize,
    pub gate: Option<Arc<Notify>>,
    pub delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeLocalEngine {
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most renders seen running at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalSynthesizer for FakeLocalEngine {
    async fn synthesize_to_file(&self, _text: &str, output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        tokio::time::sleep(self.delay).await;
        let written = tokio::fs::write(output, FAKE_MP3).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        written?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake-local"
    }
}

/// Transcriber returning a fixed transcript or failure
pub struct FakeTranscriber(pub std::result::Result<String, String>);

impl FakeTranscriber {
    pub fn hearing(text: &str) -> Self {
        Self(Ok(text.to_string()))
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio: &[u8], _mime_type: &str) -> Result<String> {
        self.0.clone().map_err(Error::Stt)
    }
}

/// Text generator returning a fixed answer
pub struct FakeGenerator(pub String);

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "fake-llm"
    }
}

/// Progress backend whose every call fails
pub struct FailingBackend;

#[async_trait]
impl ProgressBackend for FailingBackend {
    async fn save_progress(
        &self,
        _user_id: &str,
        _scene_id: &str,
        _at: DateTime<Utc>,
    ) -> Result<()> {
        Err(Error::Store("service unavailable".to_string()))
    }

    async fn load_state(&self, _user_id: &str) -> Result<Option<UserState>> {
        Err(Error::Store("service unavailable".to_string()))
    }

    async fn save_choice(
        &self,
        _user_id: &str,
        _scene_id: &str,
        _record: &ChoiceRecord,
    ) -> Result<()> {
        Err(Error::Store("service unavailable".to_string()))
    }

    async fn append_metric(&self, _user_id: &str, _event: &MetricEvent) -> Result<()> {
        Err(Error::Store("service unavailable".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Paths of a test data directory
pub struct TestDirs {
    pub audio: PathBuf,
    pub offline: PathBuf,
}

impl TestDirs {
    pub fn new(root: &Path) -> Self {
        Self {
            audio: root.join("audio"),
            offline: root.join("offline_data"),
        }
    }

    pub fn local_store(&self) -> LocalProgressStore {
        LocalProgressStore::new(&self.offline).expect("failed to create local store")
    }
}

/// Quest over the sample story with a counting online synthesizer
pub fn sample_quest(root: &Path, transcriber: Option<Arc<dyn Transcriber>>) -> Quest {
    let dirs = TestDirs::new(root);
    let online = Arc::new(FakeSynthesizer::default());
    let audio = AudioDispatcher::new(dirs.audio.clone(), Some(online), None);
    let sessions = SessionStore::local(dirs.local_store());

    let mut builder = Quest::builder(audio, sessions)
        .story(Arc::new(StoryStore::sample().expect("sample story")));
    if let Some(transcriber) = transcriber {
        builder = builder.transcriber(transcriber);
    }
    builder.build()
}
