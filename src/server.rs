//! HTTP surface: the page plus a JSON API over the controller.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::controller::{Command, ControllerError, ControllerHandle, DownloadTarget};
use crate::download;
use crate::payload::FileUpload;
use crate::state::{ProgressView, StateSnapshot};
use crate::style::{StyleOption, STYLES};

/// Largest accepted request body (uploads included).
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Debug)]
pub enum ApiError {
    Unavailable,
    NotFound(&'static str),
    BadRequest(String),
    Internal(String),
}

impl From<ControllerError> for ApiError {
    fn from(_: ControllerError) -> Self {
        Self::Unavailable
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "controller is not running".to_owned(),
            ),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, what.to_owned()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult = Result<Json<StateSnapshot>, ApiError>;

#[derive(Debug, Deserialize)]
struct StyleRequest {
    style: StyleOption,
}

#[derive(Debug, Deserialize)]
struct DragRequest {
    active: bool,
}

#[derive(Debug, Serialize)]
struct StyleEntry {
    id: StyleOption,
    label: &'static str,
}

pub fn router(controller: ControllerHandle) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/state", get(get_state))
        .route("/api/progress", get(get_progress))
        .route("/api/styles", get(list_styles))
        .route("/api/upload", post(upload_image))
        .route("/api/drag", post(set_drag))
        .route("/api/generate", post(generate))
        .route("/api/style", post(select_style))
        .route("/api/style/random", post(random_style))
        .route("/api/download", get(download_current))
        .route("/api/history/clear", post(request_clear))
        .route("/api/history/clear/confirm", post(confirm_clear))
        .route("/api/history/clear/cancel", post(cancel_clear))
        .route("/api/history/:id", delete(delete_history))
        .route("/api/history/:id/select", post(select_history))
        .route("/api/history/:id/download", get(download_history))
        .route("/api/history/:id/original", get(history_original))
        .route("/api/history/:id/avatar", get(history_avatar))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .with_state(controller)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn get_state(State(controller): State<ControllerHandle>) -> ApiResult {
    Ok(Json(controller.snapshot().await?))
}

async fn get_progress(
    State(controller): State<ControllerHandle>,
) -> Result<Json<ProgressView>, ApiError> {
    Ok(Json(controller.progress().await?))
}

async fn list_styles() -> Json<Vec<StyleEntry>> {
    Json(
        STYLES
            .iter()
            .map(|spec| StyleEntry {
                id: spec.style,
                label: spec.label,
            })
            .collect(),
    )
}

async fn upload_image(
    State(controller): State<ControllerHandle>,
    mut multipart: Multipart,
) -> ApiResult {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name().is_some_and(|name| name != "image") {
            continue;
        }
        let media_type = field.content_type().unwrap_or_default().to_owned();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;

        tracing::debug!(%media_type, bytes = data.len(), "received upload");
        let snapshot = controller
            .request(Command::Ingest(FileUpload::new(media_type, data.to_vec())))
            .await?;
        return Ok(Json(snapshot));
    }

    Err(ApiError::BadRequest("missing 'image' field".to_owned()))
}

async fn set_drag(
    State(controller): State<ControllerHandle>,
    Json(body): Json<DragRequest>,
) -> ApiResult {
    Ok(Json(controller.request(Command::SetDragging(body.active)).await?))
}

async fn generate(State(controller): State<ControllerHandle>) -> ApiResult {
    Ok(Json(controller.request(Command::Generate).await?))
}

async fn select_style(
    State(controller): State<ControllerHandle>,
    Json(body): Json<StyleRequest>,
) -> ApiResult {
    Ok(Json(controller.request(Command::SelectStyle(body.style)).await?))
}

async fn random_style(State(controller): State<ControllerHandle>) -> ApiResult {
    Ok(Json(controller.request(Command::RandomStyle).await?))
}

async fn select_history(
    State(controller): State<ControllerHandle>,
    Path(id): Path<String>,
) -> ApiResult {
    Ok(Json(controller.request(Command::SelectHistory(id)).await?))
}

async fn delete_history(
    State(controller): State<ControllerHandle>,
    Path(id): Path<String>,
) -> ApiResult {
    Ok(Json(controller.request(Command::DeleteHistory(id)).await?))
}

async fn request_clear(State(controller): State<ControllerHandle>) -> ApiResult {
    Ok(Json(controller.request(Command::RequestClearHistory).await?))
}

async fn confirm_clear(State(controller): State<ControllerHandle>) -> ApiResult {
    Ok(Json(controller.request(Command::ConfirmClearHistory).await?))
}

async fn cancel_clear(State(controller): State<ControllerHandle>) -> ApiResult {
    Ok(Json(controller.request(Command::CancelClearHistory).await?))
}

async fn download_current(State(controller): State<ControllerHandle>) -> Result<Response, ApiError> {
    serve_download(&controller, DownloadTarget::Current).await
}

async fn download_history(
    State(controller): State<ControllerHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    serve_download(&controller, DownloadTarget::History(id)).await
}

async fn history_original(
    State(controller): State<ControllerHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    serve_image(&controller, DownloadTarget::HistoryOriginal(id)).await
}

async fn history_avatar(
    State(controller): State<ControllerHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    serve_image(&controller, DownloadTarget::History(id)).await
}

/// Inline image body. History items never change, so browsers may keep it.
async fn serve_image(
    controller: &ControllerHandle,
    target: DownloadTarget,
) -> Result<Response, ApiError> {
    let payload = controller
        .download(target)
        .await?
        .ok_or(ApiError::NotFound("no such image"))?;
    let bytes = payload
        .decode_bytes()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, payload.mime_type().to_owned()),
            (header::CACHE_CONTROL, "private, max-age=31536000, immutable".to_owned()),
        ],
        bytes,
    )
        .into_response())
}

async fn serve_download(
    controller: &ControllerHandle,
    target: DownloadTarget,
) -> Result<Response, ApiError> {
    let payload = controller
        .download(target)
        .await?
        .ok_or(ApiError::NotFound("no avatar to download"))?;
    let file =
        download::prepare(&payload, Utc::now()).map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, file.mime_type.clone()),
            (header::CONTENT_DISPOSITION, file.content_disposition()),
        ],
        file.bytes,
    )
        .into_response())
}
