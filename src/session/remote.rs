//! HTTP document store backend
//!
//! Talks to a JSON document service exposing collections of documents:
//!
//! - `PATCH {base}/users/{user_id}` merges fields into the user document
//! - `GET {base}/users/{user_id}` returns it (404 when absent)
//! - `POST {base}/{collection}` appends a document to `choices` or `metrics`
//! - `GET {base}/metrics?user_id=...` lists a user's metric documents

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::{ChoiceRecord, MetricEvent, ProgressBackend, UserState};
use crate::story::START_SCENE_ID;
use crate::{Error, Result};

const USERS: &str = "users";
const CHOICES: &str = "choices";
const METRICS: &str = "metrics";

/// User document as stored remotely
#[derive(Debug, Default, Deserialize)]
struct UserDocument {
    #[serde(default)]
    current_scene: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    choices: IndexMap<String, ChoiceRecord>,
}

/// Progress store backed by a remote document service
pub struct RemoteProgressStore {
    client: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl RemoteProgressStore {
    /// Create a client for the service at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the HTTP client cannot be built
    pub fn new(base_url: &str, token: Option<SecretString>, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid store URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("store URL cannot be a base: {base_url}")));
        }
        // Trailing slash so joined segments extend the path
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Store("store URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Store(format!("document store returned {status}: {body}")))
    }

    async fn patch_user(&self, user_id: &str, fields: Value) -> Result<()> {
        let url = self.url(&[USERS, user_id])?;
        let response = self
            .authorize(self.client.patch(url))
            .json(&fields)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn append(&self, collection: &str, document: Value) -> Result<()> {
        let url = self.url(&[collection])?;
        let response = self
            .authorize(self.client.post(url))
            .json(&document)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_metrics(&self, user_id: &str) -> Result<Vec<MetricEvent>> {
        let mut url = self.url(&[METRICS])?;
        url.query_pairs_mut().append_pair("user_id", user_id);
        let response = self.authorize(self.client.get(url)).send().await?;
        let documents: Vec<Value> = Self::check(response).await?.json().await?;
        Ok(documents
            .into_iter()
            .filter_map(|d| serde_json::from_value(d).ok())
            .collect())
    }
}

#[async_trait]
impl ProgressBackend for RemoteProgressStore {
    async fn save_progress(&self, user_id: &str, scene_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.patch_user(user_id, json!({ "current_scene": scene_id, "updated_at": at }))
            .await
    }

    async fn load_state(&self, user_id: &str) -> Result<Option<UserState>> {
        let url = self.url(&[USERS, user_id])?;
        let response = self.authorize(self.client.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document: UserDocument = Self::check(response).await?.json().await?;

        let metrics_log = match self.list_metrics(user_id).await {
            Ok(events) => events,
            Err(e) => {
                tracing::debug!(user_id, error = %e, "metrics listing unavailable");
                Vec::new()
            }
        };

        Ok(Some(UserState {
            user_id: user_id.to_string(),
            current_scene_id: document
                .current_scene
                .unwrap_or_else(|| START_SCENE_ID.to_string()),
            choice_history: document.choices,
            metrics_log,
            updated_at: document.updated_at,
            first_time: false,
        }))
    }

    async fn save_choice(
        &self,
        user_id: &str,
        scene_id: &str,
        record: &ChoiceRecord,
    ) -> Result<()> {
        let mut document = serde_json::to_value(record)?;
        if let Value::Object(fields) = &mut document {
            fields.insert("user_id".into(), user_id.into());
            fields.insert("scene_id".into(), scene_id.into());
        }
        self.append(CHOICES, document).await?;
        self.patch_user(user_id, json!({ "choices": { scene_id: record } }))
            .await
    }

    async fn append_metric(&self, user_id: &str, event: &MetricEvent) -> Result<()> {
        let mut document = serde_json::to_value(event)?;
        if let Value::Object(fields) = &mut document {
            fields.insert("user_id".into(), user_id.into());
        }
        self.append(METRICS, document).await
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
