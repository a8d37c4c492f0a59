//! File-backed progress store
//!
//! Layout under the store root:
//!
//! ```text
//! user_progress/<user>.json   {"user_id", "current_scene", "updated_at"}
//! user_choices/<user>.json    {"<scene_id>": {choice record}, ...}
//! metrics/<user>.json         [{metric event}, ...]
//! ```
//!
//! `<user>` is the form-urlencoded user id, so distinct ids never share a file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{ChoiceRecord, MetricEvent, ProgressBackend, UserState};
use crate::Result;
use crate::story::START_SCENE_ID;
use crate::voice::cache::write_atomically;

const PROGRESS_DIR: &str = "user_progress";
const CHOICES_DIR: &str = "user_choices";
const METRICS_DIR: &str = "metrics";

/// Reversible file stem for a user id, with path separators escaped
fn file_stem(user_id: &str) -> String {
    url::form_urlencoded::byte_serialize(user_id.as_bytes()).collect()
}

/// Stores each user's records as JSON files
pub struct LocalProgressStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl LocalProgressStore {
    /// Create a store rooted at `root`, creating the category directories
    ///
    /// # Errors
    ///
    /// Returns error if the directories cannot be created
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for category in [PROGRESS_DIR, CHOICES_DIR, METRICS_DIR] {
            std::fs::create_dir_all(root.join(category))?;
        }
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, category: &str, user_id: &str) -> PathBuf {
        self.root
            .join(category)
            .join(format!("{}.json", file_stem(user_id)))
    }

    async fn read(&self, category: &str, user_id: &str) -> Result<Option<Value>> {
        let path = self.path(category, user_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, category: &str, user_id: &str, value: &Value) -> Result<()> {
        let path = self.path(category, user_id);
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomically(&path, &bytes).await
    }

    /// Merge `fields` into the object stored for the user
    async fn merge(&self, category: &str, user_id: &str, fields: Map<String, Value>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = match self.read(category, user_id).await? {
            Some(Value::Object(existing)) => existing,
            _ => Map::new(),
        };
        doc.extend(fields);
        self.write(category, user_id, &Value::Object(doc)).await
    }
}

#[async_trait]
impl ProgressBackend for LocalProgressStore {
    async fn save_progress(&self, user_id: &str, scene_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut fields = Map::new();
        fields.insert("user_id".into(), user_id.into());
        fields.insert("current_scene".into(), scene_id.into());
        fields.insert("updated_at".into(), serde_json::to_value(at)?);
        self.merge(PROGRESS_DIR, user_id, fields).await
    }

    async fn load_state(&self, user_id: &str) -> Result<Option<UserState>> {
        let progress = self.read(PROGRESS_DIR, user_id).await?;
        let choices = self.read(CHOICES_DIR, user_id).await?;
        let metrics = self.read(METRICS_DIR, user_id).await?;

        if progress.is_none() && choices.is_none() && metrics.is_none() {
            return Ok(None);
        }

        let progress = progress.unwrap_or(Value::Null);
        let current_scene_id = progress
            .get("current_scene")
            .and_then(Value::as_str)
            .unwrap_or(START_SCENE_ID)
            .to_string();
        let updated_at = progress
            .get("updated_at")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok());

        let choice_history: IndexMap<String, ChoiceRecord> = match choices {
            Some(value) => serde_json::from_value(value)?,
            None => IndexMap::new(),
        };
        let metrics_log: Vec<MetricEvent> = match metrics {
            Some(Value::Array(events)) => events
                .into_iter()
                .filter_map(|e| serde_json::from_value(e).ok())
                .collect(),
            Some(single) => serde_json::from_value(single).map(|e| vec![e]).unwrap_or_default(),
            None => Vec::new(),
        };

        Ok(Some(UserState {
            user_id: user_id.to_string(),
            current_scene_id,
            choice_history,
            metrics_log,
            updated_at,
            first_time: false,
        }))
    }

    async fn save_choice(
        &self,
        user_id: &str,
        scene_id: &str,
        record: &ChoiceRecord,
    ) -> Result<()> {
        let mut fields = Map::new();
        fields.insert(scene_id.to_string(), serde_json::to_value(record)?);
        self.merge(CHOICES_DIR, user_id, fields).await
    }

    async fn append_metric(&self, user_id: &str, event: &MetricEvent) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut events = match self.read(METRICS_DIR, user_id).await? {
            Some(Value::Array(events)) => events,
            // Older files may hold a single event rather than a list
            Some(single) => vec![single],
            None => Vec::new(),
        };
        events.push(serde_json::to_value(event)?);
        self.write(METRICS_DIR, user_id, &Value::Array(events)).await
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
