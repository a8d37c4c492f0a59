//! Story endpoints: starting, advancing, and saving progress

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{ApiState, error_response};
use crate::quest::{
    ADVANCE_OPTIONAL, ADVANCE_REQUIRED, Advance, QuestError, SAVE_REQUIRED, SceneResponse,
};
use crate::session::UserState;

/// Build story router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/start_story", get(start_story))
        .route("/next_scene", post(next_scene))
        .route("/get_state", get(get_state))
        .route("/save_progress", post(save_progress))
        .with_state(state)
}

/// Interpret a `use_sample` flag; anything but "true" is false, absent is true
fn sample_flag(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// Same as [`sample_flag`] for JSON bodies, which may send a bool or a string
fn json_sample_flag(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => sample_flag(Some(s.as_str())),
        Some(_) => false,
    }
}

/// Query parameters for starting a story
#[derive(Debug, Deserialize)]
pub struct StartQuery {
    pub user_id: Option<String>,
    pub use_sample: Option<String>,
}

/// Start a new story from the first scene
async fn start_story(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<StartQuery>,
) -> Json<SceneResponse> {
    let use_sample = sample_flag(query.use_sample.as_deref());
    Json(state.quest.start(query.user_id.as_deref(), use_sample).await)
}

/// Body of a scene transition request
#[derive(Debug, Default, Deserialize)]
pub struct NextSceneRequest {
    pub user_id: Option<String>,
    pub choice_id: Option<String>,
    pub scene_id: Option<String>,
    pub use_sample: Option<Value>,
    pub emotion: Option<String>,
}

/// Get the next scene based on the user's choice
///
/// The body is parsed by hand so that a missing or malformed body gets the
/// same answer as missing fields.
async fn next_scene(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<SceneResponse>, StoryError> {
    let request: NextSceneRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(error = %e, "unreadable next_scene body");
        StoryError::missing(ADVANCE_REQUIRED, ADVANCE_OPTIONAL)
    })?;

    let advance = Advance {
        user_id: request.user_id.unwrap_or_default(),
        choice_id: request.choice_id.unwrap_or_default(),
        scene_id: request.scene_id,
        use_sample: json_sample_flag(request.use_sample.as_ref()),
        emotion: request.emotion,
    };

    state
        .quest
        .advance(advance)
        .await
        .map(Json)
        .map_err(|e| StoryError::from_quest(e, ADVANCE_OPTIONAL))
}

/// Query parameters for fetching user state
#[derive(Debug, Deserialize)]
pub struct StateQuery {
    pub user_id: Option<String>,
}

/// Get the recorded state of a user
async fn get_state(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<StateQuery>,
) -> Result<Json<UserState>, StoryError> {
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| StoryError::missing(&["user_id"], &[]))?;

    Ok(Json(state.quest.state(&user_id).await))
}

/// Body of an explicit progress save
#[derive(Debug, Default, Deserialize)]
pub struct SaveProgressRequest {
    pub user_id: Option<String>,
    pub scene_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SaveProgressResponse {
    pub saved: bool,
}

/// Record the scene a user is in
async fn save_progress(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<SaveProgressResponse>, StoryError> {
    let request: SaveProgressRequest = serde_json::from_slice(&body)
        .map_err(|_| StoryError::missing(SAVE_REQUIRED, &[]))?;

    state
        .quest
        .save_progress(
            request.user_id.as_deref().unwrap_or_default(),
            request.scene_id.as_deref().unwrap_or_default(),
        )
        .await
        .map_err(|e| StoryError::from_quest(e, &[]))?;

    Ok(Json(SaveProgressResponse { saved: true }))
}

/// Story API errors
#[derive(Debug)]
pub enum StoryError {
    MissingFields {
        required: &'static [&'static str],
        optional: &'static [&'static str],
    },
    Quest(QuestError),
}

impl StoryError {
    const fn missing(
        required: &'static [&'static str],
        optional: &'static [&'static str],
    ) -> Self {
        Self::MissingFields { required, optional }
    }

    fn from_quest(error: QuestError, optional: &'static [&'static str]) -> Self {
        match error {
            QuestError::MissingFields(required) => Self::missing(required, optional),
            other => Self::Quest(other),
        }
    }
}

impl IntoResponse for StoryError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingFields { required, optional } => {
                let body = json!({
                    "error": {
                        "code": "missing_fields",
                        "message": QuestError::MissingFields(required).to_string(),
                    },
                    "required": required,
                    "optional": optional,
                });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            Self::Quest(error) => {
                let status = match &error {
                    QuestError::UnknownScene(_) | QuestError::UnknownChoice { .. } => {
                        StatusCode::NOT_FOUND
                    }
                    QuestError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                    QuestError::MissingFields(_) | QuestError::Voice(_) => StatusCode::BAD_REQUEST,
                };
                error_response(status, error.code(), error.to_string())
            }
        }
    }
}
