//! Audio artifact cache and synthesis dispatch
//!
//! Artifacts live at `<audio_dir>/<key>.mp3`; a file at that path is a cache
//! hit. Misses go to the networked backend when preferred, falling back to the
//! local engine. Local synthesis runs detached and one job at a time; until it
//! finishes the artifact is reported as pending. Local clips are WAV data kept
//! under the same `.mp3` name so URLs stay stable across backends.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use indexmap::IndexMap;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use super::{LocalSynthesizer, SpeechSynthesizer};
use crate::story::Scene;
use crate::{Error, Result};

/// Content type of networked synthesis and downloads
pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Content type of local engine output, which is RIFF/WAVE under the same `.mp3` name
pub const WAV_CONTENT_TYPE: &str = "audio/wav";

/// URL prefix under which artifacts are served
pub const AUDIO_URL_PREFIX: &str = "/audio";

/// Write size used when streaming downloads to disk
pub const DOWNLOAD_CHUNK_SIZE: usize = 8192;

/// Key and text of the diagnostic clip
pub const DEMO_KEY: &str = "demo";
pub const DEMO_TEXT: &str = "Welcome to the Interactive Audio Quest. Your adventure awaits!";

/// Pre-recorded ambience tracks that can be fetched on demand
pub const AMBIENCE_LIBRARY: [(&str, &str); 3] = [
    ("forest_ambience", "https://example.com/audio/forest_ambience.mp3"),
    ("mystery_theme", "https://example.com/audio/mystery_theme.mp3"),
    ("magic_spell", "https://example.com/audio/magic_spell.mp3"),
];

/// Whether an artifact's file can be read yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    /// File is complete on disk
    Ready,
    /// Local synthesis is queued or running
    Pending,
    /// No backend could produce the file
    Unavailable,
}

/// A cached audio file for a scene or choice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub key: String,
    pub file_path: PathBuf,
    /// Nominal type; see [`sniff_content_type`] for what is actually served
    pub content_type: &'static str,
    pub state: ArtifactState,
}

impl AudioArtifact {
    /// File name under the audio directory
    #[must_use]
    pub fn file_name(&self) -> String {
        file_name_of(&self.file_path)
    }

    /// URL path the artifact is served from
    #[must_use]
    pub fn url(&self) -> String {
        format!("{AUDIO_URL_PREFIX}/{}", self.file_name())
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == ArtifactState::Ready
    }
}

/// Audio links for one scene
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SceneAudio {
    /// Narrative clip, absent when the scene has no narrative
    pub narrative: Option<String>,
    /// Choice id to clip URL, in choice order
    pub choices: IndexMap<String, String>,
    /// False while any clip is still being produced
    pub ready: bool,
}

/// Replace anything outside `[A-Za-z0-9_-]` so keys are safe file stems
#[must_use]
pub fn sanitize_key(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Content type of an artifact from its first bytes
#[must_use]
pub fn sniff_content_type(header: &[u8]) -> &'static str {
    if header.len() >= 12 && &header[..4] == b"RIFF" && &header[8..12] == b"WAVE" {
        WAV_CONTENT_TYPE
    } else {
        AUDIO_CONTENT_TYPE
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = file_name_of(path);
    name.push_str(&format!(".{}.part", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
}

pub(crate) async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let part = temp_path(path);
    if let Err(e) = tokio::fs::write(&part, bytes).await {
        tokio::fs::remove_file(&part).await.ok();
        return Err(e.into());
    }
    tokio::fs::rename(&part, path).await?;
    Ok(())
}

struct Inner {
    audio_dir: PathBuf,
    online: Option<Arc<dyn SpeechSynthesizer>>,
    local: Option<Arc<dyn LocalSynthesizer>>,
    /// Serializes all local synthesis; the engine is not reentrant
    local_lock: tokio::sync::Mutex<()>,
    /// File names with local synthesis in flight
    pending: Mutex<HashSet<String>>,
    http: reqwest::Client,
}

/// Maps scene and choice text to cached audio files
#[derive(Clone)]
pub struct AudioDispatcher {
    inner: Arc<Inner>,
}

impl AudioDispatcher {
    /// Create a dispatcher writing into `audio_dir`
    #[must_use]
    pub fn new(
        audio_dir: PathBuf,
        online: Option<Arc<dyn SpeechSynthesizer>>,
        local: Option<Arc<dyn LocalSynthesizer>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                audio_dir,
                online,
                local,
                local_lock: tokio::sync::Mutex::new(()),
                pending: Mutex::new(HashSet::new()),
                http: reqwest::Client::new(),
            }),
        }
    }

    /// Directory artifacts are stored in
    #[must_use]
    pub fn audio_dir(&self) -> &Path {
        &self.inner.audio_dir
    }

    /// Whether a networked backend is configured
    #[must_use]
    pub fn has_online(&self) -> bool {
        self.inner.online.is_some()
    }

    /// Whether a local engine is configured
    #[must_use]
    pub fn has_local(&self) -> bool {
        self.inner.local.is_some()
    }

    /// Deterministic path for `key`
    #[must_use]
    pub fn artifact_path(&self, key: &str) -> PathBuf {
        self.inner
            .audio_dir
            .join(format!("{}.mp3", sanitize_key(key)))
    }

    /// Whether local synthesis for `file_name` is still in flight
    #[must_use]
    pub fn is_pending(&self, file_name: &str) -> bool {
        self.pending().contains(file_name)
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn artifact(&self, key: &str, file_path: PathBuf, state: ArtifactState) -> AudioArtifact {
        AudioArtifact {
            key: key.to_string(),
            file_path,
            content_type: AUDIO_CONTENT_TYPE,
            state,
        }
    }

    /// Return the cached artifact for `key`, producing it from `text` on a miss
    ///
    /// An existing file is returned as-is even if `text` has changed.
    pub async fn ensure_audio(&self, text: &str, key: &str, prefer_online: bool) -> AudioArtifact {
        let path = self.artifact_path(key);

        if let Err(e) = tokio::fs::create_dir_all(&self.inner.audio_dir).await {
            tracing::warn!(
                path = %self.inner.audio_dir.display(),
                error = %e,
                "failed to create audio directory"
            );
        }

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(key, "audio cache hit");
            return self.artifact(key, path, ArtifactState::Ready);
        }

        // A local job already owns this path
        if self.is_pending(&file_name_of(&path)) {
            return self.artifact(key, path, ArtifactState::Pending);
        }

        if prefer_online {
            if let Some(online) = &self.inner.online {
                match online.synthesize(text).await {
                    Ok(bytes) => match write_atomically(&path, &bytes).await {
                        Ok(()) => {
                            tracing::debug!(key, provider = online.name(), "synthesized audio");
                            return self.artifact(key, path, ArtifactState::Ready);
                        }
                        Err(e) => {
                            tracing::warn!(key, error = %e, "failed to store synthesized audio");
                        }
                    },
                    Err(e) => {
                        tracing::warn!(
                            key,
                            provider = online.name(),
                            error = %e,
                            "online TTS failed, falling back to local TTS"
                        );
                    }
                }
            }
        }

        let state = self.dispatch_local(text, &path);
        self.artifact(key, path, state)
    }

    /// Queue local synthesis of `text` into `path` without waiting for it
    fn dispatch_local(&self, text: &str, path: &Path) -> ArtifactState {
        let Some(engine) = self.inner.local.clone() else {
            tracing::warn!(path = %path.display(), "no local speech engine available");
            return ArtifactState::Unavailable;
        };

        let file_name = file_name_of(path);

        if !self.pending().insert(file_name.clone()) {
            return ArtifactState::Pending;
        }

        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        let path = path.to_path_buf();

        tokio::spawn(async move {
            let result = {
                let _engine_guard = inner.local_lock.lock().await;
                let part = temp_path(&path);
                let rendered = match engine.synthesize_to_file(&text, &part).await {
                    Ok(()) => tokio::fs::rename(&part, &path).await.map_err(Error::from),
                    Err(e) => Err(e),
                };
                if rendered.is_err() {
                    tokio::fs::remove_file(&part).await.ok();
                }
                rendered
            };

            match result {
                Ok(()) => tracing::debug!(path = %path.display(), "local TTS finished"),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "local TTS failed");
                }
            }

            inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&file_name);
        });

        ArtifactState::Pending
    }

    /// Produce narrative and per-choice audio for a scene
    pub async fn scene_audio(&self, scene: &Scene, prefer_online: bool) -> SceneAudio {
        let mut ready = true;

        let narrative = if scene.narrative.trim().is_empty() {
            None
        } else {
            let artifact = self
                .ensure_audio(
                    &scene.narrative,
                    &format!("{}_narrative", scene.id),
                    prefer_online,
                )
                .await;
            ready &= artifact.is_ready();
            Some(artifact.url())
        };

        let mut choices = IndexMap::new();
        for choice in &scene.choices {
            let artifact = self
                .ensure_audio(
                    &choice.text,
                    &format!("{}_{}", scene.id, choice.id),
                    prefer_online,
                )
                .await;
            ready &= artifact.is_ready();
            choices.insert(choice.id.clone(), artifact.url());
        }

        SceneAudio {
            narrative,
            choices,
            ready,
        }
    }

    /// Queue the diagnostic welcome clip
    pub async fn synthesize_demo(&self) -> AudioArtifact {
        let prefer_online = self.has_online();
        self.ensure_audio(DEMO_TEXT, DEMO_KEY, prefer_online).await
    }

    /// Download a pre-recorded clip, reusing an existing copy
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the download fails
    pub async fn fetch_remote_audio(&self, url: &str, key: &str) -> Result<PathBuf> {
        let parsed =
            url::Url::parse(url).map_err(|e| Error::Download(format!("invalid url {url}: {e}")))?;
        let extension = Path::new(parsed.path())
            .extension()
            .map_or_else(|| "mp3".to_string(), |e| sanitize_key(&e.to_string_lossy()));

        let path = self
            .inner
            .audio_dir
            .join(format!("{}.{extension}", sanitize_key(key)));

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.inner.audio_dir).await?;

        let part = temp_path(&path);
        match self.download(parsed, &part).await {
            Ok(()) => {
                tokio::fs::rename(&part, &path).await?;
                tracing::info!(url, path = %path.display(), "downloaded audio");
                Ok(path)
            }
            Err(e) => {
                tokio::fs::remove_file(&part).await.ok();
                tracing::warn!(url, error = %e, "audio download failed");
                Err(e)
            }
        }
    }

    async fn download(&self, url: url::Url, dest: &Path) -> Result<()> {
        let response = self
            .inner
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Download(e.to_string()))?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for piece in chunk.chunks(DOWNLOAD_CHUNK_SIZE) {
                file.write_all(piece).await?;
            }
        }
        file.flush().await?;
        Ok(())
    }

    /// Fetch every track of the ambience library, returning how many are on disk
    pub async fn prefetch_ambience(&self) -> usize {
        let mut fetched = 0;
        for (key, url) in AMBIENCE_LIBRARY {
            if self.fetch_remote_audio(url, key).await.is_ok() {
                fetched += 1;
            }
        }
        fetched
    }
}
