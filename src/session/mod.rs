//! Per-user progress, choice history and usage metrics
//!
//! [`SessionStore`] never surfaces persistence failures: a failing remote
//! backend degrades to local files, and a failing read yields the first-time
//! state.

mod local;
mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use local::LocalProgressStore;
pub use remote::RemoteProgressStore;

use crate::Result;
use crate::story::{Choice, START_SCENE_ID};

/// The choice last made in a scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceRecord {
    pub choice_id: String,
    pub choice_text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChoiceRecord {
    #[must_use]
    pub fn new(choice: &Choice) -> Self {
        Self {
            choice_id: choice.id.clone(),
            choice_text: choice.text.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// A usage event with free-form fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvent {
    pub action: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MetricEvent {
    #[must_use]
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            timestamp: Utc::now(),
            fields: Map::new(),
        }
    }

    /// Attach a field
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

/// Everything recorded about one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    pub user_id: String,
    #[serde(rename = "current_scene")]
    pub current_scene_id: String,
    /// Scene id to the last choice made there
    #[serde(default)]
    pub choice_history: IndexMap<String, ChoiceRecord>,
    #[serde(default)]
    pub metrics_log: Vec<MetricEvent>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// True when nothing has been recorded for the user yet
    #[serde(default)]
    pub first_time: bool,
}

impl UserState {
    /// State of a user with no recorded progress
    #[must_use]
    pub fn first_time(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            current_scene_id: START_SCENE_ID.to_string(),
            choice_history: IndexMap::new(),
            metrics_log: Vec::new(),
            updated_at: None,
            first_time: true,
        }
    }
}

/// A place user progress can be persisted
#[async_trait]
pub trait ProgressBackend: Send + Sync {
    /// Record the user's current scene
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    async fn save_progress(&self, user_id: &str, scene_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Load the user's state, `None` if never seen
    ///
    /// # Errors
    ///
    /// Returns error if the read fails
    async fn load_state(&self, user_id: &str) -> Result<Option<UserState>>;

    /// Record the choice made in a scene
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    async fn save_choice(&self, user_id: &str, scene_id: &str, record: &ChoiceRecord)
    -> Result<()>;

    /// Append a usage event
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    async fn append_metric(&self, user_id: &str, event: &MetricEvent) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Progress store with silent degradation to local files
#[derive(Clone)]
pub struct SessionStore {
    primary: Arc<dyn ProgressBackend>,
    fallback: Option<Arc<LocalProgressStore>>,
}

impl SessionStore {
    /// Store backed only by local files
    #[must_use]
    pub fn local(store: LocalProgressStore) -> Self {
        Self {
            primary: Arc::new(store),
            fallback: None,
        }
    }

    /// Store writing to `primary`, degrading to `fallback` on failure
    #[must_use]
    pub fn with_fallback(primary: Arc<dyn ProgressBackend>, fallback: LocalProgressStore) -> Self {
        Self {
            primary,
            fallback: Some(Arc::new(fallback)),
        }
    }

    /// Name of the backend tried first
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.primary.name()
    }

    /// Record the scene the user is now in
    pub async fn record_scene(&self, user_id: &str, scene_id: &str) {
        let at = Utc::now();
        let Err(e) = self.primary.save_progress(user_id, scene_id, at).await else {
            return;
        };
        tracing::warn!(
            backend = self.primary.name(),
            user_id,
            error = %e,
            "failed to save progress"
        );

        if let Some(fallback) = &self.fallback {
            if let Err(e) = fallback.save_progress(user_id, scene_id, at).await {
                tracing::error!(user_id, error = %e, "failed to save progress locally");
            }
        }
    }

    /// Current state of the user, or the first-time state
    pub async fn get_state(&self, user_id: &str) -> UserState {
        match self.primary.load_state(user_id).await {
            Ok(state) => return state.unwrap_or_else(|| UserState::first_time(user_id)),
            Err(e) => {
                tracing::warn!(
                    backend = self.primary.name(),
                    user_id,
                    error = %e,
                    "failed to load user state"
                );
            }
        }

        if let Some(fallback) = &self.fallback {
            match fallback.load_state(user_id).await {
                Ok(Some(state)) => return state,
                Ok(None) => {}
                Err(e) => tracing::error!(user_id, error = %e, "failed to load local state"),
            }
        }

        UserState::first_time(user_id)
    }

    /// Record the choice the user made in `scene_id`
    pub async fn record_choice(&self, user_id: &str, scene_id: &str, choice: &Choice) {
        let record = ChoiceRecord::new(choice);
        let Err(e) = self.primary.save_choice(user_id, scene_id, &record).await else {
            return;
        };
        tracing::warn!(
            backend = self.primary.name(),
            user_id,
            error = %e,
            "failed to save choice"
        );

        if let Some(fallback) = &self.fallback {
            if let Err(e) = fallback.save_choice(user_id, scene_id, &record).await {
                tracing::error!(user_id, error = %e, "failed to save choice locally");
            }
        }
    }

    /// Append a usage event
    pub async fn log_event(&self, user_id: &str, event: MetricEvent) {
        let Err(e) = self.primary.append_metric(user_id, &event).await else {
            return;
        };
        tracing::warn!(
            backend = self.primary.name(),
            user_id,
            error = %e,
            "failed to log metrics"
        );

        if let Some(fallback) = &self.fallback {
            if let Err(e) = fallback.append_metric(user_id, &event).await {
                tracing::error!(user_id, error = %e, "failed to log metrics locally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_time_state_starts_at_start() {
        let state = UserState::first_time("u1");
        assert_eq!(state.current_scene_id, "start");
        assert!(state.first_time);
        assert!(state.choice_history.is_empty());
    }

    #[test]
    fn metric_event_flattens_fields() {
        let event = MetricEvent::new("start_story")
            .with("scene_id", "start")
            .with("use_sample", true);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["action"], "start_story");
        assert_eq!(value["scene_id"], "start");
        assert_eq!(value["use_sample"], true);
        assert!(value["timestamp"].is_string());

        let back: MetricEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn user_state_serializes_current_scene() {
        let value = serde_json::to_value(UserState::first_time("u1")).unwrap();
        assert_eq!(value["current_scene"], "start");
        assert_eq!(value["first_time"], true);
    }
}
