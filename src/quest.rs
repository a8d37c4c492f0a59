//! Scene transitions for a user
//!
//! [`Quest`] walks the story graph (or asks the generator for the next scene),
//! prepares the scene's audio, and records progress. Only request-level
//! problems are reported as [`QuestError`]; everything downstream degrades.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::Error;
use crate::session::{MetricEvent, SessionStore, UserState};
use crate::story::{Choice, EmotionClassifier, Mood, Scene, SceneGenerator, StoryStore};
use crate::voice::{
    AudioDispatcher, SceneAudio, Transcriber, VoiceCommandError, resolve_voice_command,
};

/// Request-level failure of a quest operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuestError {
    /// A required request field is missing or empty
    #[error("Missing required parameters: {}", .0.join(", "))]
    MissingFields(&'static [&'static str]),

    /// The current scene (or a choice's successor) does not exist
    #[error("Scene {0} not found")]
    UnknownScene(String),

    /// The scene has no such choice
    #[error("Choice {choice} not found in scene {scene}")]
    UnknownChoice { scene: String, choice: String },

    /// A voice command could not be resolved
    #[error(transparent)]
    Voice(VoiceCommandError),

    /// A collaborator the operation needs is not configured
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl QuestError {
    /// Stable machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingFields(_) => "missing_fields",
            Self::UnknownScene(_) => "unknown_scene",
            Self::UnknownChoice { .. } => "unknown_choice",
            Self::Voice(e) => e.code(),
            Self::NotConfigured(_) => "not_configured",
        }
    }
}

impl From<Error> for QuestError {
    fn from(e: Error) -> Self {
        match e {
            Error::ChoiceNotFound { scene, choice } => Self::UnknownChoice { scene, choice },
            Error::SceneNotFound(scene) => Self::UnknownScene(scene),
            other => Self::UnknownScene(other.to_string()),
        }
    }
}

/// Fields a scene transition needs
pub const ADVANCE_REQUIRED: &[&str] = &["user_id", "choice_id"];
/// Fields a scene transition accepts beyond the required ones
pub const ADVANCE_OPTIONAL: &[&str] = &["scene_id", "use_sample", "emotion"];
/// Fields an explicit progress save needs
pub const SAVE_REQUIRED: &[&str] = &["user_id", "scene_id"];

/// A scene transition request
#[derive(Debug, Clone, Default)]
pub struct Advance {
    pub user_id: String,
    pub choice_id: String,
    /// Scene the choice was made in; the recorded scene when absent
    pub scene_id: Option<String>,
    pub use_sample: bool,
    /// Free-form mood label
    pub emotion: Option<String>,
}

/// A scene with its audio, addressed to a user
#[derive(Debug, Clone, Serialize)]
pub struct SceneResponse {
    pub user_id: String,
    pub scene: Scene,
    pub audio: SceneAudio,
}

/// A resolved voice command
#[derive(Debug, Clone, Serialize)]
pub struct VoiceResponse {
    pub transcript: String,
    pub choice: Choice,
    pub emotion: Mood,
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Builder for [`Quest`]
pub struct QuestBuilder {
    audio: AudioDispatcher,
    sessions: SessionStore,
    story: Option<Arc<StoryStore>>,
    generator: SceneGenerator,
    classifier: EmotionClassifier,
    transcriber: Option<Arc<dyn Transcriber>>,
    prefer_online: bool,
}

impl QuestBuilder {
    /// Serve scenes from a static story when requested
    #[must_use]
    pub fn story(mut self, story: Arc<StoryStore>) -> Self {
        self.story = Some(story);
        self
    }

    #[must_use]
    pub fn generator(mut self, generator: SceneGenerator) -> Self {
        self.generator = generator;
        self
    }

    #[must_use]
    pub fn classifier(mut self, classifier: EmotionClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Try the networked TTS backend before the local engine
    #[must_use]
    pub const fn prefer_online(mut self, prefer: bool) -> Self {
        self.prefer_online = prefer;
        self
    }

    #[must_use]
    pub fn build(self) -> Quest {
        Quest {
            audio: self.audio,
            sessions: self.sessions,
            story: self.story,
            generator: self.generator,
            classifier: self.classifier,
            transcriber: self.transcriber,
            prefer_online: self.prefer_online,
            generated: RwLock::new(HashMap::new()),
        }
    }
}

/// Orchestrates scene transitions, audio and progress for all users
pub struct Quest {
    audio: AudioDispatcher,
    sessions: SessionStore,
    story: Option<Arc<StoryStore>>,
    generator: SceneGenerator,
    classifier: EmotionClassifier,
    transcriber: Option<Arc<dyn Transcriber>>,
    prefer_online: bool,
    /// Last generated scene per user
    generated: RwLock<HashMap<String, Scene>>,
}

impl Quest {
    /// Start building a quest around its two mandatory collaborators
    #[must_use]
    pub fn builder(audio: AudioDispatcher, sessions: SessionStore) -> QuestBuilder {
        QuestBuilder {
            audio,
            sessions,
            story: None,
            generator: SceneGenerator::disabled(),
            classifier: EmotionClassifier::disabled(),
            transcriber: None,
            prefer_online: true,
        }
    }

    #[must_use]
    pub const fn audio(&self) -> &AudioDispatcher {
        &self.audio
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn story(&self) -> Option<&StoryStore> {
        self.story.as_deref()
    }

    /// The static story, if `use_sample` asks for it and one is loaded
    fn sample(&self, use_sample: bool) -> Option<&StoryStore> {
        if use_sample { self.story() } else { None }
    }

    async fn remember(&self, user_id: &str, scene: &Scene) {
        self.generated
            .write()
            .await
            .insert(user_id.to_string(), scene.clone());
    }

    /// Find the scene a user is making a choice in
    async fn current_scene(
        &self,
        user_id: &str,
        scene_id: &str,
        use_sample: bool,
    ) -> Result<Scene, QuestError> {
        if let Some(story) = self.sample(use_sample) {
            return Ok(story.get_scene(scene_id)?.clone());
        }

        if let Some(scene) = self
            .generated
            .read()
            .await
            .get(user_id)
            .filter(|s| s.id == scene_id)
        {
            return Ok(scene.clone());
        }

        self.story
            .as_deref()
            .and_then(|story| story.get_scene(scene_id).ok())
            .cloned()
            .ok_or_else(|| QuestError::UnknownScene(scene_id.to_string()))
    }

    async fn scene_id_for(&self, user_id: &str, requested: Option<&str>) -> String {
        match requested {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => self.sessions.get_state(user_id).await.current_scene_id,
        }
    }

    /// Begin (or restart) a story for `user_id`, allocating an id when absent
    pub async fn start(&self, user_id: Option<&str>, use_sample: bool) -> SceneResponse {
        let user_id = match user_id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let scene = if let Some(story) = self.sample(use_sample) {
            story.initial_scene().clone()
        } else {
            let scene = self.generator.generate_opening().await;
            self.remember(&user_id, &scene).await;
            scene
        };

        let audio = self.audio.scene_audio(&scene, self.prefer_online).await;

        self.sessions.record_scene(&user_id, &scene.id).await;
        self.sessions
            .log_event(
                &user_id,
                MetricEvent::new("start_story")
                    .with("scene_id", scene.id.as_str())
                    .with("use_sample", use_sample),
            )
            .await;

        tracing::info!(user_id, scene_id = %scene.id, use_sample, "story started");

        SceneResponse {
            user_id,
            scene,
            audio,
        }
    }

    /// Move a user along the choice they made
    ///
    /// # Errors
    ///
    /// - `MissingFields` if `user_id` or `choice_id` is empty; nothing is recorded
    /// - `UnknownScene` if the current scene or the choice's successor is missing
    /// - `UnknownChoice` if the current scene has no such choice
    pub async fn advance(&self, request: Advance) -> Result<SceneResponse, QuestError> {
        if is_blank(&request.user_id) || is_blank(&request.choice_id) {
            return Err(QuestError::MissingFields(ADVANCE_REQUIRED));
        }

        let user_id = request.user_id;
        let choice_id = request.choice_id;
        let scene_id = self.scene_id_for(&user_id, request.scene_id.as_deref()).await;
        let mood = request.emotion.as_deref().map(Mood::normalize);

        let current = self
            .current_scene(&user_id, &scene_id, request.use_sample)
            .await?;
        let choice = current
            .choice(&choice_id)
            .cloned()
            .ok_or_else(|| QuestError::UnknownChoice {
                scene: scene_id.clone(),
                choice: choice_id.clone(),
            })?;

        let scene = if let Some(story) = self.sample(request.use_sample) {
            story.resolve_choice(&scene_id, &choice_id)?.clone()
        } else {
            let scene = self
                .generator
                .generate(Some(&current.narrative), Some(&choice), mood)
                .await;
            self.remember(&user_id, &scene).await;
            scene
        };

        let audio = self.audio.scene_audio(&scene, self.prefer_online).await;

        self.sessions.record_scene(&user_id, &scene.id).await;
        self.sessions.record_choice(&user_id, &scene_id, &choice).await;
        self.sessions
            .log_event(
                &user_id,
                MetricEvent::new("next_scene")
                    .with("previous_scene", scene_id.as_str())
                    .with("choice_id", choice_id.as_str())
                    .with("new_scene", scene.id.as_str())
                    .with("emotion", mood.map(Mood::as_str)),
            )
            .await;

        tracing::info!(
            user_id,
            from = %scene_id,
            choice = %choice_id,
            to = %scene.id,
            "scene advanced"
        );

        Ok(SceneResponse {
            user_id,
            scene,
            audio,
        })
    }

    /// Resolve recorded speech to one of the current scene's choices
    ///
    /// The choice is only reported, not applied; the client follows up with
    /// [`Quest::advance`].
    ///
    /// # Errors
    ///
    /// - `NotConfigured` if no transcriber is available
    /// - `UnknownScene` if the scene cannot be found
    /// - `Voice` if the transcript does not resolve to a choice
    pub async fn voice_command(
        &self,
        user_id: &str,
        scene_id: Option<&str>,
        use_sample: bool,
        audio: &[u8],
        mime_type: &str,
    ) -> Result<VoiceResponse, QuestError> {
        let transcriber = self
            .transcriber
            .as_ref()
            .ok_or(QuestError::NotConfigured("speech recognition"))?;

        let scene_id = self.scene_id_for(user_id, scene_id).await;
        let scene = self.current_scene(user_id, &scene_id, use_sample).await?;

        let transcript = if audio.is_empty() {
            Ok(String::new())
        } else {
            transcriber
                .transcribe(audio, mime_type)
                .await
                .map_err(|e| e.to_string())
        };
        let choice = resolve_voice_command(
            transcript.as_deref().map_err(String::as_str),
            &scene.choices,
        )
        .map_err(QuestError::Voice)?;
        let transcript = transcript.unwrap_or_default();

        let emotion = self.classifier.classify(&transcript).await;

        self.sessions
            .log_event(
                user_id,
                MetricEvent::new("voice_command")
                    .with("scene_id", scene_id.as_str())
                    .with("transcript", transcript.as_str())
                    .with("choice_id", choice.id.as_str())
                    .with("emotion", emotion.as_str()),
            )
            .await;

        Ok(VoiceResponse {
            transcript,
            choice,
            emotion,
        })
    }

    /// Recorded state of a user
    pub async fn state(&self, user_id: &str) -> UserState {
        self.sessions.get_state(user_id).await
    }

    /// Explicitly record the scene a user is in
    ///
    /// # Errors
    ///
    /// Returns `MissingFields` if either id is empty
    pub async fn save_progress(&self, user_id: &str, scene_id: &str) -> Result<(), QuestError> {
        if is_blank(user_id) || is_blank(scene_id) {
            return Err(QuestError::MissingFields(SAVE_REQUIRED));
        }
        self.sessions.record_scene(user_id, scene_id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::LocalProgressStore;

    fn quest(dir: &std::path::Path) -> Quest {
        let audio = AudioDispatcher::new(dir.join("audio"), None, None);
        let sessions =
            SessionStore::local(LocalProgressStore::new(dir.join("offline_data")).unwrap());
        Quest::builder(audio, sessions)
            .story(Arc::new(StoryStore::sample().unwrap()))
            .build()
    }

    fn advance(user_id: &str, scene_id: Option<&str>, choice_id: &str) -> Advance {
        Advance {
            user_id: user_id.to_string(),
            choice_id: choice_id.to_string(),
            scene_id: scene_id.map(str::to_string),
            use_sample: true,
            emotion: None,
        }
    }

    #[test]
    fn error_codes() {
        assert_eq!(QuestError::MissingFields(ADVANCE_REQUIRED).code(), "missing_fields");
        assert_eq!(QuestError::UnknownScene("x".into()).code(), "unknown_scene");
        assert_eq!(QuestError::Voice(VoiceCommandError::NoMatch).code(), "no_match");
        assert_eq!(
            QuestError::from(Error::ChoiceNotFound {
                scene: "start".into(),
                choice: "fly".into()
            }),
            QuestError::UnknownChoice {
                scene: "start".into(),
                choice: "fly".into()
            }
        );
    }

    #[tokio::test]
    async fn start_allocates_user_id() {
        let dir = tempfile::tempdir().unwrap();
        let quest = quest(dir.path());

        let response = quest.start(None, true).await;
        assert!(uuid::Uuid::parse_str(&response.user_id).is_ok());
        assert_eq!(response.scene.id, "start");

        let state = quest.state(&response.user_id).await;
        assert_eq!(state.current_scene_id, "start");
        assert!(!state.first_time);
    }

    #[tokio::test]
    async fn advance_records_real_choice_text() {
        let dir = tempfile::tempdir().unwrap();
        let quest = quest(dir.path());
        quest.start(Some("u1"), true).await;

        let response = quest
            .advance(advance("u1", Some("start"), "enter_forest"))
            .await
            .unwrap();
        assert_eq!(response.scene.id, "forest_path");

        let state = quest.state("u1").await;
        assert_eq!(state.current_scene_id, "forest_path");
        let record = &state.choice_history["start"];
        assert_eq!(record.choice_id, "enter_forest");
        assert_ne!(record.choice_text, "Unknown choice");
        assert!(!record.choice_text.is_empty());
    }

    #[tokio::test]
    async fn advance_uses_recorded_scene_when_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let quest = quest(dir.path());
        quest.start(Some("u1"), true).await;

        let response = quest
            .advance(advance("u1", None, "enter_forest"))
            .await
            .unwrap();
        assert_eq!(response.scene.id, "forest_path");
    }

    #[tokio::test]
    async fn missing_fields_have_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let quest = quest(dir.path());

        let err = quest
            .advance(advance("u1", Some("start"), "  "))
            .await
            .unwrap_err();
        assert_eq!(err, QuestError::MissingFields(ADVANCE_REQUIRED));
        assert!(quest.state("u1").await.first_time);
    }

    #[tokio::test]
    async fn unknown_scene_and_choice() {
        let dir = tempfile::tempdir().unwrap();
        let quest = quest(dir.path());

        let err = quest
            .advance(advance("u1", Some("nowhere"), "enter_forest"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unknown_scene");

        let err = quest
            .advance(advance("u1", Some("start"), "fly_away"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unknown_choice");
    }

    #[tokio::test]
    async fn generator_mode_resolves_against_last_generated_scene() {
        let dir = tempfile::tempdir().unwrap();
        let quest = quest(dir.path());

        // No generator configured: the opening and every later scene are the defaults
        let opening = quest.start(Some("u1"), false).await;
        assert_eq!(opening.scene.id, "start");

        let mut request = advance("u1", Some("start"), "enter_forest");
        request.use_sample = false;
        let next = quest.advance(request).await.unwrap();
        assert_eq!(next.scene.id, "fallback_scene");

        let mut request = advance("u1", Some("fallback_scene"), "wait");
        request.use_sample = false;
        let again = quest.advance(request).await.unwrap();
        assert_eq!(again.scene.id, "fallback_scene");
    }

    #[tokio::test]
    async fn voice_needs_transcriber() {
        let dir = tempfile::tempdir().unwrap();
        let quest = quest(dir.path());
        let err = quest
            .voice_command("u1", Some("start"), true, b"RIFF", "audio/wav")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_configured");
    }

    #[tokio::test]
    async fn save_progress_validates() {
        let dir = tempfile::tempdir().unwrap();
        let quest = quest(dir.path());
        assert!(quest.save_progress("u1", "").await.is_err());
        quest.save_progress("u1", "river").await.unwrap();
        assert_eq!(quest.state("u1").await.current_scene_id, "river");
    }
}
