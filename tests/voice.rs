//! Voice pipeline integration tests
//!
//! Exercises the audio cache and speech fallbacks with fake engines

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use secrecy::SecretString;
use tokio::sync::Notify;

use audio_quest::voice::{
    ArtifactState, AudioDispatcher, SpeechSynthesizer, SpeechToText, TextToSpeech, Transcriber,
    match_choice,
};
use audio_quest::{Choice, StoryStore};

mod common;
use common::{FAKE_MP3, FakeLocalEngine, FakeSynthesizer, TestDirs};

/// Serve `app` on an ephemeral port, returning its base URL
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

fn key() -> SecretString {
    SecretString::from("test-key".to_string())
}

async fn wait_until_ready(audio: &AudioDispatcher, file_name: &str) {
    for _ in 0..100 {
        if !audio.is_pending(file_name) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{file_name} still pending");
}

#[tokio::test]
async fn test_cache_hit_skips_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    let dirs = TestDirs::new(dir.path());
    let online = Arc::new(FakeSynthesizer::default());
    let audio = AudioDispatcher::new(dirs.audio.clone(), Some(online.clone()), None);

    let first = audio.ensure_audio("Hello", "hello", true).await;
    assert_eq!(first.state, ArtifactState::Ready);
    assert_eq!(online.calls(), 1);

    // Different text, same key: the stored file wins
    let second = audio.ensure_audio("Goodbye", "hello", true).await;
    assert_eq!(second.state, ArtifactState::Ready);
    assert_eq!(second.file_path, first.file_path);
    assert_eq!(online.calls(), 1);

    assert_eq!(std::fs::read(&first.file_path).unwrap(), FAKE_MP3);
}

#[tokio::test]
async fn test_online_failure_falls_back_to_local() {
    let dir = tempfile::tempdir().unwrap();
    let dirs = TestDirs::new(dir.path());
    let online = Arc::new(FakeSynthesizer::failing());
    let local = Arc::new(FakeLocalEngine::default());
    let audio = AudioDispatcher::new(dirs.audio.clone(), Some(online.clone()), Some(local.clone()));

    let artifact = audio.ensure_audio("Hello", "fallback", true).await;
    assert_eq!(online.calls(), 1);
    assert_ne!(artifact.state, ArtifactState::Unavailable);

    wait_until_ready(&audio, "fallback.mp3").await;
    assert_eq!(local.calls(), 1);
    assert!(artifact.file_path.exists());
}

#[tokio::test]
async fn test_prefer_local_skips_online() {
    let dir = tempfile::tempdir().unwrap();
    let dirs = TestDirs::new(dir.path());
    let online = Arc::new(FakeSynthesizer::default());
    let local = Arc::new(FakeLocalEngine::default());
    let audio = AudioDispatcher::new(dirs.audio.clone(), Some(online.clone()), Some(local.clone()));

    audio.ensure_audio("Hello", "offline", false).await;
    wait_until_ready(&audio, "offline.mp3").await;

    assert_eq!(online.calls(), 0);
    assert_eq!(local.calls(), 1);
}

#[tokio::test]
async fn test_local_synthesis_is_pending_until_written() {
    let dir = tempfile::tempdir().unwrap();
    let dirs = TestDirs::new(dir.path());
    let gate = Arc::new(Notify::new());
    let local = Arc::new(FakeLocalEngine::gated(gate.clone()));
    let audio = AudioDispatcher::new(dirs.audio.clone(), None, Some(local.clone()));

    let artifact = audio.ensure_audio("Slow words", "slow", true).await;
    assert_eq!(artifact.state, ArtifactState::Pending);
    assert_eq!(artifact.url(), "/audio/slow.mp3");
    assert!(!artifact.file_path.exists());

    // A second request for the same clip does not queue another job
    let again = audio.ensure_audio("Slow words", "slow", true).await;
    assert_eq!(again.state, ArtifactState::Pending);

    gate.notify_one();
    wait_until_ready(&audio, "slow.mp3").await;

    assert!(artifact.file_path.exists());
    assert_eq!(local.calls(), 1);
    let ready = audio.ensure_audio("Slow words", "slow", true).await;
    assert_eq!(ready.state, ArtifactState::Ready);
}

#[tokio::test]
async fn test_pending_clip_skips_online_retry() {
    let dir = tempfile::tempdir().unwrap();
    let dirs = TestDirs::new(dir.path());
    let online = Arc::new(FakeSynthesizer::failing());
    let gate = Arc::new(Notify::new());
    let local = Arc::new(FakeLocalEngine::gated(gate.clone()));
    let audio = AudioDispatcher::new(dirs.audio.clone(), Some(online.clone()), Some(local.clone()));

    let first = audio.ensure_audio("Owl call", "owl", true).await;
    let second = audio.ensure_audio("Owl call", "owl", true).await;
    assert_eq!(first.state, ArtifactState::Pending);
    assert_eq!(second.state, ArtifactState::Pending);
    assert_eq!(online.calls(), 1);

    gate.notify_one();
    wait_until_ready(&audio, "owl.mp3").await;
    assert_eq!(local.calls(), 1);
    assert_eq!(online.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_local_synthesis_runs_one_job_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let dirs = TestDirs::new(dir.path());
    let local = Arc::new(FakeLocalEngine::slow(Duration::from_millis(30)));
    let audio = AudioDispatcher::new(dirs.audio.clone(), None, Some(local.clone()));

    let keys = ["glade", "river", "whispers", "perimeter", "forest_path"];
    for key in keys {
        let artifact = audio.ensure_audio("Narration", key, false).await;
        assert_eq!(artifact.state, ArtifactState::Pending);
    }
    for key in keys {
        wait_until_ready(&audio, &format!("{key}.mp3")).await;
        assert!(dirs.audio.join(format!("{key}.mp3")).exists());
    }

    assert_eq!(local.calls(), keys.len());
    assert_eq!(local.peak(), 1);
}

#[tokio::test]
async fn test_no_engine_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let audio = AudioDispatcher::new(TestDirs::new(dir.path()).audio, None, None);

    let artifact = audio.ensure_audio("Silence", "silent", true).await;
    assert_eq!(artifact.state, ArtifactState::Unavailable);
    assert_eq!(artifact.url(), "/audio/silent.mp3");
}

#[tokio::test]
async fn test_scene_audio_covers_narrative_and_choices() {
    let dir = tempfile::tempdir().unwrap();
    let online = Arc::new(FakeSynthesizer::default());
    let audio = AudioDispatcher::new(TestDirs::new(dir.path()).audio, Some(online.clone()), None);
    let story = StoryStore::sample().unwrap();

    let scene = story.get_scene("river").unwrap();
    let links = audio.scene_audio(scene, true).await;

    assert_eq!(links.narrative.as_deref(), Some("/audio/river_narrative.mp3"));
    let keys: Vec<&str> = links.choices.keys().map(String::as_str).collect();
    assert_eq!(keys, ["greet_heron", "swim_across"]);
    assert!(links.ready);
    assert_eq!(online.calls(), 3);
}

#[tokio::test]
async fn test_fetch_remote_audio_downloads_once() {
    let base = serve(Router::new().route("/clips/owl.mp3", get(|| async { FAKE_MP3 }))).await;

    let dir = tempfile::tempdir().unwrap();
    let audio = AudioDispatcher::new(TestDirs::new(dir.path()).audio, None, None);
    let url = format!("{base}/clips/owl.mp3");

    let path = audio.fetch_remote_audio(&url, "owl_call").await.unwrap();
    assert_eq!(path.file_name().unwrap(), "owl_call.mp3");
    assert_eq!(std::fs::read(&path).unwrap(), FAKE_MP3);

    // Present on disk: no second download even if the server is gone
    let again = audio
        .fetch_remote_audio("http://127.0.0.1:9/clips/owl.mp3", "owl_call")
        .await
        .unwrap();
    assert_eq!(again, path);
}

#[tokio::test]
async fn test_fetch_remote_audio_failure_leaves_nothing() {
    let base = serve(Router::new()).await;

    let dir = tempfile::tempdir().unwrap();
    let audio_dir = TestDirs::new(dir.path()).audio;
    let audio = AudioDispatcher::new(audio_dir.clone(), None, None);

    let url = format!("{base}/missing.mp3");
    assert!(audio.fetch_remote_audio(&url, "missing").await.is_err());
    assert_eq!(std::fs::read_dir(&audio_dir).unwrap().count(), 0);

    assert!(audio.fetch_remote_audio("not a url", "bad").await.is_err());
}

#[test]
fn test_voice_matching_against_sample_choices() {
    let story = StoryStore::sample().unwrap();
    let start = story.initial_scene();

    let picked: &Choice = match_choice("circle around perimeter", &start.choices).unwrap();
    assert_eq!(picked.id, "circle_perimeter");
    assert!(match_choice("xyzzy", &start.choices).is_none());
}

#[tokio::test]
async fn test_openai_speech_request() {
    let app = Router::new().route(
        "/v1/audio/speech",
        post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
            assert_eq!(headers[header::AUTHORIZATION], "Bearer test-key");
            assert_eq!(body["voice"], "alloy");
            assert_eq!(body["input"], "The heron bows.");
            assert_eq!(body["response_format"], "mp3");
            FAKE_MP3
        }),
    );
    let base = serve(app).await;

    let tts = TextToSpeech::new_openai(key(), "alloy".to_string(), 1.0, "tts-1".to_string())
        .unwrap()
        .with_base_url(&format!("{base}/v1/"));
    assert_eq!(tts.synthesize("The heron bows.").await.unwrap(), FAKE_MP3);
}

#[tokio::test]
async fn test_speech_error_status_is_reported() {
    let app = Router::new().route(
        "/text-to-speech/{voice}",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "quota exceeded") }),
    );
    let base = serve(app).await;

    let tts = TextToSpeech::new_elevenlabs(key(), "rachel".to_string(), "m".to_string())
        .unwrap()
        .with_base_url(&base);
    let err = tts.synthesize("Hello").await.unwrap_err();
    assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn test_deepgram_transcription_request() {
    let app = Router::new().route(
        "/listen",
        post(|headers: HeaderMap, body: axum::body::Bytes| async move {
            assert_eq!(headers[header::AUTHORIZATION], "Token test-key");
            assert_eq!(headers[header::CONTENT_TYPE], "audio/webm");
            assert_eq!(&body[..], b"opus-frames");
            Json(serde_json::json!({
                "results": {"channels": [{"alternatives": [{"transcript": "greet the heron"}]}]}
            }))
        }),
    );
    let base = serve(app).await;

    let stt = SpeechToText::new_deepgram(key(), "nova-2".to_string())
        .unwrap()
        .with_base_url(&base);
    let transcript = stt
        .transcribe(b"opus-frames", "audio/webm;codecs=opus")
        .await
        .unwrap();
    assert_eq!(transcript, "greet the heron");
}

#[tokio::test]
async fn test_whisper_transcription_request() {
    let app = Router::new().route(
        "/audio/transcriptions",
        post(|| async { Json(serde_json::json!({ "text": "swim across" })) }),
    );
    let base = serve(app).await;

    let stt = SpeechToText::new_whisper(key(), "whisper-1".to_string())
        .unwrap()
        .with_base_url(&base);
    assert_eq!(stt.transcribe(b"RIFF", "audio/wav").await.unwrap(), "swim across");
}
