//! Voice API endpoints: spoken commands and the TTS diagnostic

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::{ApiState, error_response};
use crate::quest::{QuestError, VoiceResponse};
use crate::voice::{ArtifactState, VoiceCommandError};

/// Mime type assumed when the client sends none
const DEFAULT_AUDIO_MIME: &str = "audio/wav";

/// Build voice router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/voice_input", post(voice_input))
        .route("/test_audio", get(test_audio))
        .with_state(state)
}

/// Query parameters for a voice command
#[derive(Debug, Deserialize)]
pub struct VoiceQuery {
    pub user_id: Option<String>,
    pub scene_id: Option<String>,
    pub use_sample: Option<String>,
}

/// Match recorded speech against the current scene's choices
///
/// The request body is the raw recording.
async fn voice_input(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<VoiceQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<VoiceResponse>, VoiceError> {
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(VoiceError::BadRequest("user_id is required"))?;

    if body.is_empty() {
        return Err(VoiceError::BadRequest("Empty audio data"));
    }

    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_AUDIO_MIME);

    let use_sample = query
        .use_sample
        .as_deref()
        .is_none_or(|v| v.trim().eq_ignore_ascii_case("true"));

    let response = state
        .quest
        .voice_command(
            &user_id,
            query.scene_id.as_deref(),
            use_sample,
            &body,
            mime_type,
        )
        .await?;

    tracing::info!(
        user_id,
        choice = %response.choice.id,
        emotion = %response.emotion,
        "voice command resolved"
    );

    Ok(Json(response))
}

/// Diagnostic synthesis response
#[derive(Debug, Serialize)]
pub struct TestAudioResponse {
    pub message: &'static str,
    pub audio_url: String,
    pub state: ArtifactState,
}

/// Synthesize the demo clip and report where it will be served
async fn test_audio(State(state): State<Arc<ApiState>>) -> Json<TestAudioResponse> {
    let artifact = state.quest.audio().synthesize_demo().await;
    let message = match artifact.state {
        ArtifactState::Ready => "Demo audio generated successfully",
        ArtifactState::Pending => "Demo audio is being generated",
        ArtifactState::Unavailable => "No speech engine is available",
    };

    Json(TestAudioResponse {
        message,
        audio_url: artifact.url(),
        state: artifact.state,
    })
}

/// Voice API errors
#[derive(Debug)]
pub enum VoiceError {
    BadRequest(&'static str),
    Quest(QuestError),
}

impl From<QuestError> for VoiceError {
    fn from(e: QuestError) -> Self {
        Self::Quest(e)
    }
}

impl IntoResponse for VoiceError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(msg) => {
                error_response(StatusCode::BAD_REQUEST, "bad_request", msg.to_string())
            }
            Self::Quest(error) => {
                let status = match &error {
                    QuestError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                    QuestError::UnknownScene(_) | QuestError::UnknownChoice { .. } => {
                        StatusCode::NOT_FOUND
                    }
                    QuestError::Voice(VoiceCommandError::TranscriptionFailed(_)) => {
                        StatusCode::BAD_GATEWAY
                    }
                    QuestError::Voice(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    QuestError::MissingFields(_) => StatusCode::BAD_REQUEST,
                };
                error_response(status, error.code(), error.to_string())
            }
        }
    }
}
