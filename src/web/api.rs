//! JSON handlers for `/api/*`.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Multipart, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

use super::{ApiError, ApiResult, AppState};
use crate::caption;
use crate::config::expand_home;
use crate::notify::Notification;
use crate::navigation::ItemId;
use crate::render::{PREVIEW_MAX_SIDE, content_type, preview_jpeg};
use crate::schedule::DisplayOverride;
use crate::settings::{SettingsUpdate, SettingsView};
use crate::system::SystemStats;
use crate::tasks::power::PowerAction;
use crate::uploads::{UploadStore, UploadedImage};

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub current_image: Option<String>,
    pub current_index: usize,
    pub total_images: usize,
    pub temperature: Option<String>,
    pub weather: Option<String>,
    pub time: String,
    pub date: String,
    pub paused: bool,
    pub display_on: bool,
    pub manual_override: DisplayOverride,
    pub time_remaining: u64,
    pub delay_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemStats>,
}

pub async fn status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let slideshow = &state.slideshow;
    let now = slideshow.local_now();
    let snapshot = slideshow.snapshot();
    let weather = slideshow.weather();
    let monitor = state.monitor.clone();
    let disk = slideshow.with_settings(|cfg| cfg.images_dir());
    let stats = spawn_blocking(move || monitor.snapshot(&disk)).await?;
    Ok(Json(StatusResponse {
        current_image: snapshot.current.as_ref().map(ToString::to_string),
        current_index: snapshot.position(),
        total_images: snapshot.seen,
        temperature: weather.as_ref().map(|w| w.temperature_label()),
        weather: weather.map(|w| w.description),
        time: now.format("%I:%M %p").to_string(),
        date: now.format("%d %b %Y").to_string(),
        paused: slideshow.is_paused(),
        display_on: slideshow.display_on_at(now),
        manual_override: slideshow.display_override(),
        time_remaining: slideshow.time_remaining(Instant::now()).as_secs(),
        delay_seconds: slideshow.with_settings(|cfg| cfg.delay_seconds),
        system: (stats != SystemStats::default()).then_some(stats),
    }))
}

pub async fn next(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let slideshow = state.slideshow.clone();
    let current = spawn_blocking(move || slideshow.next()).await?;
    info!(current = ?current, "next requested over http");
    Ok(Json(json!({ "status": "ok", "current_image": current })))
}

pub async fn previous(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let current = state.slideshow.previous();
    info!(current = ?current, "previous requested over http");
    Ok(Json(json!({ "status": "ok", "current_image": current })))
}

pub async fn pause(State(state): State<AppState>) -> Json<Value> {
    let paused = state.slideshow.toggle_pause();
    Json(json!({ "status": "ok", "paused": paused }))
}

#[derive(Debug, Deserialize)]
pub struct DisplayRequest {
    #[serde(default)]
    action: String,
}

pub async fn display(
    State(state): State<AppState>,
    Json(req): Json<DisplayRequest>,
) -> ApiResult<Json<Value>> {
    let over = DisplayOverride::parse(&req.action)
        .ok_or_else(|| ApiError::bad_request("Invalid action"))?;
    state.slideshow.set_display_override(over);
    Ok(Json(json!({ "status": "ok", "action": over })))
}

fn current_path(state: &AppState) -> ApiResult<PathBuf> {
    let current = state
        .slideshow
        .current()
        .ok_or_else(|| ApiError::not_found("No image loaded"))?;
    Ok(state.slideshow.library().resolve(&current))
}

pub async fn image_full(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let path = current_path(&state)?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ApiError::not_found("Image file not found"));
        }
        Err(err) => return Err(ApiError::internal(err.to_string())),
    };
    Ok(([(header::CONTENT_TYPE, content_type(&path))], bytes))
}

pub async fn image_caption(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let path = current_path(&state)?;
    if !path.is_file() {
        return Err(ApiError::not_found("Image file not found"));
    }
    let caption = spawn_blocking(move || caption::read_caption(&path)).await?;
    Ok(Json(json!({ "status": "ok", "caption": caption.unwrap_or_default() })))
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    path: Option<String>,
}

/// Item ids arrive from the browser; only plain relative names resolve.
fn parse_item_id(raw: &str) -> ApiResult<ItemId> {
    let raw = raw.trim();
    let clean = !raw.is_empty()
        && Path::new(raw).components().all(|c| match c {
            Component::Normal(part) => !part.to_string_lossy().starts_with('.'),
            _ => false,
        });
    if !clean {
        return Err(ApiError::bad_request("Invalid image path"));
    }
    Ok(ItemId::from(raw))
}

pub async fn image_preview(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> ApiResult<impl IntoResponse> {
    let path = match query.path.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(raw) => state.slideshow.library().resolve(&parse_item_id(raw)?),
        None => current_path(&state)?,
    };
    if !path.is_file() {
        return Err(ApiError::not_found("Image not found"));
    }
    let bytes = spawn_blocking(move || preview_jpeg(&path, PREVIEW_MAX_SIDE))
        .await?
        .map_err(|err| ApiError::internal(format!("{err:#}")))?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        bytes,
    ))
}

#[derive(Debug, Deserialize)]
pub struct CaptionRequest {
    #[serde(default)]
    caption: String,
}

pub async fn set_image_caption(
    State(state): State<AppState>,
    Json(req): Json<CaptionRequest>,
) -> ApiResult<Json<Value>> {
    let path = current_path(&state)?;
    if !path.is_file() {
        return Err(ApiError::not_found("Image file not found"));
    }
    spawn_blocking(move || caption::write_caption(&path, &req.caption)).await??;
    state.slideshow.request_redraw();
    Ok(Json(json!({ "status": "ok", "message": "Caption saved successfully" })))
}

pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsView> {
    Json(state.slideshow.with_settings(|cfg| SettingsView::from(cfg)))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<Json<Value>> {
    let slideshow = state.slideshow.clone();
    let applied = spawn_blocking(move || slideshow.apply_settings(&update)).await??;
    for change in &applied.changes {
        state.notifier.notify(Notification::SettingChanged {
            key: change.key.to_string(),
            old: change.old.clone(),
            new: change.new.clone(),
        });
    }
    let changed: Vec<&str> = applied.changes.iter().map(|c| c.key).collect();
    Ok(Json(json!({ "status": "ok", "changed": changed, "saved": applied.saved })))
}

fn upload_store(state: &AppState) -> UploadStore {
    UploadStore::new(state.slideshow.with_settings(|cfg| cfg.upload_dir()))
}

pub async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Json<Value>> {
    let mut file: Option<(String, Bytes)> = None;
    let mut caption = String::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(err.body_text()))?
    {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::bad_request(err.body_text()))?;
                file = Some((name, bytes));
            }
            Some("caption") => {
                caption = field
                    .text()
                    .await
                    .map_err(|err| ApiError::bad_request(err.body_text()))?;
            }
            other => debug!(field = ?other, "ignoring multipart field"),
        }
    }
    let (name, bytes) = file.ok_or_else(|| ApiError::bad_request("No file provided"))?;

    let store = upload_store(&state);
    let upload_dir = store.dir().display().to_string();
    let saved = {
        let name = name.clone();
        let store = store.clone();
        spawn_blocking(move || store.save(&name, &bytes)).await?
    };
    let filename = match saved {
        Ok(filename) => filename,
        Err(err) => {
            let err = ApiError::from(err);
            if err.status().is_server_error() {
                state.notifier.notify(Notification::Error {
                    message: "upload failed".into(),
                    context: Some(format!("Upload: {name}")),
                });
            }
            return Err(err);
        }
    };
    let caption_added = if caption.trim().is_empty() {
        false
    } else {
        let path = store.dir().join(&filename);
        match spawn_blocking(move || caption::write_caption(&path, &caption)).await? {
            Ok(()) => true,
            Err(err) => {
                // the upload itself succeeded; keep it without a caption
                warn!(file = %filename, error = %err, "could not store upload caption");
                false
            }
        }
    };
    state.slideshow.discover_upload(&filename);
    state.notifier.notify(Notification::Upload {
        filename: filename.clone(),
    });
    Ok(Json(json!({
        "status": "ok",
        "filename": filename,
        "upload_dir": upload_dir,
        "caption_added": caption_added,
    })))
}

#[derive(Debug, Serialize)]
pub struct UploadList {
    pub images: Vec<UploadedImage>,
    pub total: usize,
    pub upload_directory: String,
}

pub async fn list_uploads(State(state): State<AppState>) -> ApiResult<Json<UploadList>> {
    let store = upload_store(&state);
    let upload_directory = store.dir().display().to_string();
    let images = spawn_blocking(move || store.list())
        .await?
        .map_err(|err| ApiError::internal(format!("Failed to list images: {err}")))?;
    Ok(Json(UploadList {
        total: images.len(),
        images,
        upload_directory,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    images: Vec<String>,
}

pub async fn delete_uploads(
    State(state): State<AppState>,
    Json(req): Json<DeleteRequest>,
) -> ApiResult<Json<Value>> {
    if req.images.is_empty() {
        return Err(ApiError::bad_request("No images specified for deletion"));
    }
    let store = upload_store(&state);
    let report = spawn_blocking(move || store.delete(&req.images)).await?;
    if !report.deleted.is_empty() {
        // the loop skips the current item if it was one of them
        state.slideshow.request_redraw();
    }
    let mut body = json!({
        "deleted": report.deleted,
        "failed": report.failed,
        "total_deleted": report.deleted.len(),
        "total_failed": report.failed.len(),
    });
    if !report.failed.is_empty() {
        body["warning"] = json!(format!("{} image(s) could not be deleted", report.failed.len()));
    }
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    old_filename: Option<String>,
    new_filename: Option<String>,
}

pub async fn rename_upload(
    State(state): State<AppState>,
    Json(req): Json<RenameRequest>,
) -> ApiResult<Json<Value>> {
    let (Some(old_filename), Some(new_filename)) = (req.old_filename, req.new_filename) else {
        return Err(ApiError::bad_request("old_filename and new_filename required"));
    };
    let old_filename = old_filename.trim().to_string();
    let store = upload_store(&state);
    let renamed = {
        let old_filename = old_filename.clone();
        let new_filename = new_filename.trim().to_string();
        spawn_blocking(move || store.rename(&old_filename, &new_filename)).await??
    };
    state.slideshow.discover_upload(&renamed);
    info!(from = %old_filename, to = %renamed, "upload renamed");
    Ok(Json(json!({
        "status": "ok",
        "old_filename": old_filename,
        "new_filename": renamed,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UploadCaptionRequest {
    path: Option<String>,
    caption: Option<String>,
}

pub async fn caption_upload(
    State(state): State<AppState>,
    Json(req): Json<UploadCaptionRequest>,
) -> ApiResult<Json<Value>> {
    let (Some(path), Some(caption)) = (req.path, req.caption) else {
        return Err(ApiError::bad_request("path and caption required"));
    };
    let store = upload_store(&state);
    let filename = {
        let caption = caption.clone();
        spawn_blocking(move || store.set_caption(path.trim(), &caption)).await??
    };
    state.slideshow.request_redraw();
    Ok(Json(json!({
        "status": "ok",
        "filename": filename,
        "caption": caption::sanitize_caption(&caption),
    })))
}

pub async fn cleanup_caption_cache(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let store = upload_store(&state);
    let removed = spawn_blocking(move || store.cleanup_caption_cache()).await??;
    Ok(Json(json!({ "status": "ok", "removed": removed })))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    lines: Option<usize>,
}

pub const DEFAULT_LOG_LINES: usize = 200;

pub async fn logs(State(state): State<AppState>, Query(query): Query<LogsQuery>) -> Json<Value> {
    let wanted = query.lines.unwrap_or(DEFAULT_LOG_LINES).clamp(50, 1000);
    let mut lines = state.logs.tail(wanted);
    if lines.is_empty() {
        lines.push("No logs available".to_string());
    }
    Json(json!({ "status": "ok", "count": lines.len(), "lines": lines }))
}

#[derive(Debug, Deserialize)]
pub struct DirectoryQuery {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Serialize)]
pub struct DirectoryListing {
    pub directories: Vec<String>,
    pub current_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_path: Option<String>,
}

fn list_directories(raw: &str) -> ApiResult<DirectoryListing> {
    if raw.trim().is_empty() {
        let home = expand_home(Path::new("~"));
        return Ok(DirectoryListing {
            directories: vec![home.display().to_string(), "/".into()],
            current_path: String::new(),
            parent_path: None,
        });
    }
    let path = expand_home(Path::new(raw.trim()));
    if !path.exists() {
        return Err(ApiError::not_found("Path does not exist"));
    }
    if !path.is_dir() {
        return Err(ApiError::bad_request("Path is not a directory"));
    }
    let entries = std::fs::read_dir(&path).map_err(|err| match err.kind() {
        ErrorKind::PermissionDenied => ApiError::new(StatusCode::FORBIDDEN, "Permission denied"),
        _ => ApiError::internal(err.to_string()),
    })?;
    let mut directories: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    directories.sort();
    Ok(DirectoryListing {
        directories,
        current_path: path.display().to_string(),
        parent_path: path.parent().map(|p| p.display().to_string()),
    })
}

pub async fn directories(Query(query): Query<DirectoryQuery>) -> ApiResult<Json<DirectoryListing>> {
    let listing = spawn_blocking(move || list_directories(&query.path)).await??;
    Ok(Json(listing))
}

#[derive(Debug, Default, Deserialize)]
struct PowerRequest {
    countdown: Option<u64>,
}

fn power_request(body: &Bytes) -> ApiResult<PowerRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PowerRequest::default());
    }
    serde_json::from_slice(body).map_err(|err| ApiError::bad_request(format!("Invalid JSON: {err}")))
}

async fn start_power(state: AppState, action: PowerAction, body: Bytes) -> ApiResult<Json<Value>> {
    let req = power_request(&body)?;
    let countdown = state.slideshow.start_power_action(action, req.countdown)?;
    let message = match action {
        PowerAction::Shutdown => format!("Shutdown initiated with {countdown}s countdown"),
        PowerAction::Restart => format!("Restart initiated with {countdown}s countdown"),
    };
    state.notifier.notify(Notification::SystemAlert {
        kind: action.as_str().to_string(),
        message: message.clone(),
    });
    Ok(Json(json!({ "status": "ok", "message": message })))
}

pub async fn shutdown(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    start_power(state, PowerAction::Shutdown, body).await
}

pub async fn restart(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    start_power(state, PowerAction::Restart, body).await
}

pub async fn cancel_power(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let action = state.slideshow.cancel_power_action()?;
    state.notifier.notify(Notification::SystemAlert {
        kind: action.as_str().to_string(),
        message: action.cancelled_notice().to_string(),
    });
    Ok(Json(json!({ "status": "ok", "message": "Power action cancelled" })))
}
