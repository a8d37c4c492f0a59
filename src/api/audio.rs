//! Serving of generated and downloaded audio files

use std::path::{Component, Path as FsPath};
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::io::AsyncReadExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::{ApiState, error_response};
use crate::voice::{AUDIO_CONTENT_TYPE, sniff_content_type};

/// Seconds a client should wait before retrying a pending file
const RETRY_AFTER_SECS: &str = "2";

/// Content type from the file's header, `audio/mpeg` if it cannot be read
async fn content_type_of(path: &FsPath) -> &'static str {
    let mut header = [0u8; 12];
    let Ok(mut file) = tokio::fs::File::open(path).await else {
        return AUDIO_CONTENT_TYPE;
    };
    match file.read_exact(&mut header).await {
        Ok(_) => sniff_content_type(&header),
        Err(_) => AUDIO_CONTENT_TYPE,
    }
}

/// Build audio router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/audio/{file}", get(serve_audio))
        .with_state(state)
}

/// Whether `name` is a single plain file name
fn is_plain_file_name(name: &str) -> bool {
    let mut components = FsPath::new(name).components();
    !name.contains('\\')
        && !name.starts_with('.')
        && matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
}

/// Serve an audio file with range support
///
/// Files still being synthesized answer 503 with `Retry-After`.
async fn serve_audio(
    State(state): State<Arc<ApiState>>,
    Path(file): Path<String>,
    request: Request,
) -> Response {
    if !is_plain_file_name(&file) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "bad_request",
            format!("invalid audio file name: {file}"),
        );
    }

    let audio = state.quest.audio();
    if audio.is_pending(&file) {
        let mut response = error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "pending",
            format!("{file} is still being generated"),
        );
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        return response;
    }

    let path = audio.audio_dir().join(&file);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("{file} not found"),
        );
    }

    let content_type = content_type_of(&path).await;
    let served = ServeFile::new(&path)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});
    let mut response = served.map(Body::new).into_response();

    if response.status().is_success() {
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type),
        );
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    }

    response
}
