//! Local HTTP control surface.
//!
//! Handlers never render; they mutate the shared [`Slideshow`] and raise its
//! redraw flag. Blocking filesystem work is pushed onto the blocking pool.

pub mod api;
pub mod ui;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, DefaultBodyLimit, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::logs::LogBuffer;
use crate::notify::Notifier;
use crate::slideshow::Slideshow;
use crate::system::SystemMonitor;

#[derive(Clone)]
pub struct AppState {
    pub slideshow: Arc<Slideshow>,
    pub monitor: Arc<SystemMonitor>,
    pub notifier: Notifier,
    pub logs: LogBuffer,
}

impl AppState {
    pub fn new(slideshow: Arc<Slideshow>, notifier: Notifier) -> Self {
        Self {
            slideshow,
            monitor: Arc::new(SystemMonitor::new()),
            notifier,
            logs: LogBuffer::default(),
        }
    }

    /// Serve `/api/logs` from the buffer the tracing subscriber writes into.
    pub fn with_logs(mut self, logs: LogBuffer) -> Self {
        self.logs = logs;
        self
    }
}

/// JSON error body `{"error": "..."}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(error = %message, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::BadDir(dir) => {
                tracing::debug!(dir = %dir, "rejected directory");
                Self::bad_request("Invalid directory path")
            }
            Error::InvalidUpload(msg) | Error::InvalidSettings(msg) => Self::bad_request(msg),
            Error::NotFound(msg) => Self::not_found(msg),
            Error::AlreadyExists(msg) => Self::new(StatusCode::CONFLICT, msg),
            Error::PowerActionBusy => Self::new(
                StatusCode::CONFLICT,
                "A shutdown or restart is already in progress",
            ),
            Error::NoPowerAction => Self::bad_request("No power action in progress"),
            err @ (Error::Io(_) | Error::Config(_) | Error::Caption(_)) => Self::internal(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(format!("background task failed: {err}"))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    let body_limit = state
        .slideshow
        .with_settings(|cfg| cfg.web.max_upload_bytes);
    Router::new()
        .route("/", get(ui::index))
        .route("/static/{*path}", get(ui::asset))
        .route("/api/status", get(api::status))
        .route("/api/next", post(api::next))
        .route("/api/prev", post(api::previous))
        .route("/api/pause", post(api::pause))
        .route("/api/display", post(api::display))
        .route("/api/image/full", get(api::image_full))
        .route("/api/image/preview", get(api::image_preview))
        .route(
            "/api/image/caption",
            get(api::image_caption).post(api::set_image_caption),
        )
        .route("/api/settings", get(api::get_settings).post(api::update_settings))
        .route("/api/upload", post(api::upload))
        .route("/api/uploaded-images", get(api::list_uploads))
        .route("/api/uploaded-images/delete", post(api::delete_uploads))
        .route("/api/uploaded-images/rename", post(api::rename_upload))
        .route("/api/uploaded-images/caption", post(api::caption_upload))
        .route(
            "/api/uploaded-images/cleanup-cache",
            post(api::cleanup_caption_cache),
        )
        .route("/api/logs", get(api::logs))
        .route("/api/directories", get(api::directories))
        .route("/api/system/shutdown", post(api::shutdown))
        .route("/api/system/restart", post(api::restart))
        .route("/api/system/cancel", post(api::cancel_power))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(state.clone(), require_local))
        .with_state(state)
}

pub fn spawn(state: AppState, bind_addr: SocketAddr, cancel: CancellationToken) -> JoinHandle<()> {
    let app = router(state);
    tokio::spawn(async move {
        tracing::info!(%bind_addr, "starting web control server");
        match TcpListener::bind(bind_addr).await {
            Ok(listener) => {
                let shutdown = cancel.clone();
                if let Err(err) = axum::serve(
                    listener,
                    app.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .with_graceful_shutdown(async move {
                    shutdown.cancelled().await;
                })
                .await
                {
                    tracing::error!(error = %err, "web control server failed");
                }
            }
            Err(err) => {
                tracing::error!(error = %err, %bind_addr, "failed to bind web control server");
            }
        }
    })
}

async fn require_local(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let local_only = state.slideshow.with_settings(|cfg| cfg.web.local_only);
    if local_only && !is_local(addr.ip()) {
        tracing::warn!(peer = %addr, path = %request.uri().path(), "rejected non-local request");
        return ApiError::new(
            StatusCode::FORBIDDEN,
            "This interface is only available on the local network",
        )
        .into_response();
    }
    next.run(request).await
}

fn is_local(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback() || v4.is_private())
        }
    }
}
