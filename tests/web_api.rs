use std::io::Cursor;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes, to_bytes};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode, header};
use pi_gallery::caption::read_caption;
use pi_gallery::config::Configuration;
use pi_gallery::logs::LogBuffer;
use pi_gallery::navigation::ItemId;
use pi_gallery::notify::Notifier;
use pi_gallery::platform::display_power::CommandRunner;
use pi_gallery::slideshow::{DisplaySignals, Slideshow};
use pi_gallery::tasks::power::PowerControl;
use pi_gallery::web::{self, AppState};
use serde_json::{Value, json};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct Harness {
    slideshow: Arc<Slideshow>,
    commands: Arc<Mutex<Vec<String>>>,
    dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        for name in ["a.jpg", "b.jpg"] {
            std::fs::write(images.join(name), b"jpeg").unwrap();
        }
        let mut cfg = Configuration {
            images_directory: images,
            ..Configuration::default()
        };
        cfg.weather.enabled = false;
        cfg.navigation.shuffle_seed = Some(5);

        let commands = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&commands);
        let runner: CommandRunner = Arc::new(move |cmd: &str| {
            sink.lock().unwrap().push(cmd.to_string());
            Ok(())
        });
        let signals = Arc::new(DisplaySignals::default());
        let power = PowerControl::new(Handle::current(), runner, Arc::clone(&signals))
            .with_tick(Duration::from_millis(20));
        let slideshow = Arc::new(Slideshow::new(
            cfg.validated().unwrap(),
            Some(dir.path().join("config.yaml")),
            signals,
            power,
            CancellationToken::new(),
        ));
        slideshow.rescan();
        Self {
            slideshow,
            commands,
            dir,
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn router_from(&self, peer: [u8; 4]) -> Router {
        web::router(AppState::new(Arc::clone(&self.slideshow), Notifier::disabled()))
            .layer(MockConnectInfo(SocketAddr::from((peer, 40000))))
    }

    fn router(&self) -> Router {
        self.router_from([127, 0, 0, 1])
    }

    fn images(&self) -> std::path::PathBuf {
        self.path().join("images")
    }

    /// Replace the placeholder gallery files with decodable JPEGs.
    fn with_real_images(self) -> Self {
        for name in ["a.jpg", "b.jpg"] {
            std::fs::write(self.images().join(name), jpeg_bytes(400, 300)).unwrap();
        }
        self
    }

    async fn raw(&self, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
        let resp = self
            .router()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes)
    }

    async fn call(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]))
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

fn multipart_upload(file_name: &str, bytes: &[u8], caption: Option<&str>) -> Request<Body> {
    let boundary = "XBOUNDARYX";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: image/jpeg\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
    if let Some(caption) = caption {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"caption\"\r\n\r\n{caption}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    Request::post("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn next_prev_and_status_share_navigation() {
    let h = Harness::new();
    let (status, first) = h.post("/api/next", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let first = first["current_image"].as_str().unwrap().to_string();

    let (_, second) = h.post("/api/next", json!({})).await;
    let second = second["current_image"].as_str().unwrap().to_string();
    assert_ne!(first, second);

    let (_, back) = h.post("/api/prev", json!({})).await;
    assert_eq!(back["current_image"], first.as_str());

    let (status, body) = h.get("/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_image"], first.as_str());
    assert_eq!(body["current_index"], 1);
    assert_eq!(body["total_images"], 2);
    assert_eq!(body["paused"], false);
    assert_eq!(body["delay_seconds"], 30);
    assert_eq!(body["manual_override"], "auto");
    assert!(h.slideshow.signals().take_redraw());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_peers_are_rejected() {
    let h = Harness::new();
    let resp = h
        .router_from([8, 8, 8, 8])
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pause_and_display_override() {
    let h = Harness::new();
    let (_, body) = h.post("/api/pause", json!({})).await;
    assert_eq!(body["paused"], true);
    assert!(h.slideshow.is_paused());

    let (status, body) = h.post("/api/display", json!({ "action": "sideways" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid action");

    let (status, _) = h.post("/api/display", json!({ "action": "off" })).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = h.get("/api/status").await;
    assert_eq!(body["display_on"], false);
    assert_eq!(body["manual_override"], "off");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn settings_update_restarts_navigation_on_sort_change() {
    let h = Harness::new();
    let (_, before) = h.get("/api/settings").await;
    assert_eq!(before["delay_seconds"], 30);
    assert_eq!(before["sort_order"], "random");

    let (status, body) = h
        .post("/api/settings", json!({ "delay_seconds": "12", "sort_order": "name" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], json!(["delay_seconds", "sort_order"]));
    assert_eq!(h.slideshow.current(), Some(ItemId::from("a.jpg")));

    let (_, after) = h.get("/api/settings").await;
    assert_eq!(after["delay_seconds"], 12);
    assert_eq!(after["sort_order"], "name");

    let (status, body) = h
        .post("/api/settings", json!({ "images_directory": "/definitely/not/here" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid directory path");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn settings_can_be_saved_to_the_config_file() {
    let h = Harness::new();
    let (status, body) = h
        .post("/api/settings", json!({ "show_time": "false", "save_to_config": true }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["saved"], true);
    let saved = Configuration::from_yaml_file(h.path().join("config.yaml")).unwrap();
    assert!(!saved.overlay.show_time);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upload_list_rename_delete() {
    let h = Harness::new();
    let boundary = "XBOUNDARYX";
    let multipart = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"my photo.jpg\"\r\n\
         Content-Type: image/jpeg\r\n\r\njpegbytes\r\n--{boundary}--\r\n"
    );
    let (status, body) = h
        .call(
            Request::post("/api/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(multipart))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["filename"], "my_photo.jpg");
    assert_eq!(body["caption_added"], false);
    assert!(
        h.slideshow
            .navigator()
            .inspect(|state| state.seen().contains(&ItemId::from("uploaded/my_photo.jpg")))
    );

    let (_, list) = h.get("/api/uploaded-images").await;
    assert_eq!(list["total"], 1);
    assert_eq!(list["images"][0]["path"], "uploaded/my_photo.jpg");

    let (status, body) = h
        .post(
            "/api/uploaded-images/rename",
            json!({ "old_filename": "my_photo.jpg", "new_filename": "beach.jpg" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_filename"], "beach.jpg");

    let (status, _) = h
        .post(
            "/api/uploaded-images/rename",
            json!({ "old_filename": "my_photo.jpg", "new_filename": "x.jpg" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = h
        .post(
            "/api/uploaded-images/delete",
            json!({ "images": ["beach.jpg", "nope.jpg"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_deleted"], 1);
    assert_eq!(body["total_failed"], 1);
    assert_eq!(body["warning"], "1 image(s) could not be deleted");

    let (status, _) = h.post("/api/uploaded-images/delete", json!({ "images": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn power_actions_conflict_and_cancel() {
    let h = Harness::new();
    let (status, body) = h.post("/api/system/cancel", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No power action in progress");

    let (status, body) = h.post("/api/system/shutdown", json!({ "countdown": 5 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Shutdown initiated with 5s countdown");

    let (status, _) = h.post("/api/system/restart", json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = h.post("/api/system/cancel", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.commands.lock().unwrap().is_empty());

    let (status, _) = h
        .call(Request::post("/api/system/restart").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(*h.commands.lock().unwrap(), vec!["sudo reboot"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn control_page_and_assets_are_served() {
    let h = Harness::new();
    let (status, headers, body) = h.raw("/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
    let page = String::from_utf8(body.to_vec()).unwrap();
    assert!(page.starts_with("<!DOCTYPE html>"));
    assert!(page.contains("/static/app.js"));

    let (status, headers, body) = h.raw("/static/app.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().contains("javascript"));
    assert!(!body.is_empty());

    let (status, _, _) = h.raw("/static/style.css").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = h.raw("/static/../config.yaml").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = h.raw("/static/missing.js").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logs_endpoint_tails_the_buffer() {
    let h = Harness::new();
    let (status, body) = h.get("/api/logs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lines"], json!(["No logs available"]));
    assert_eq!(body["count"], 1);

    let logs = LogBuffer::default();
    for i in 0..300 {
        logs.push_bytes(format!("line {i}\n").as_bytes());
    }
    let router = web::router(
        AppState::new(Arc::clone(&h.slideshow), Notifier::disabled()).with_logs(logs),
    )
    .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
    let fetch = |uri: &'static str| {
        let router = router.clone();
        async move {
            let resp = router
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
            serde_json::from_slice::<Value>(&bytes).unwrap()
        }
    };

    let body = fetch("/api/logs").await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["count"], 200);
    assert_eq!(body["lines"][199], "line 299");

    // clamped to at least 50 and at most what is buffered
    assert_eq!(fetch("/api/logs?lines=3").await["count"], 50);
    assert_eq!(fetch("/api/logs?lines=5000").await["count"], 300);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn preview_scales_current_or_named_image() {
    let h = Harness::new().with_real_images();
    let (status, body) = h.get("/api/image/preview").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "No image loaded");

    h.post("/api/next", json!({})).await;
    let (status, headers, bytes) = h.raw("/api/image/preview").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/jpeg");
    let preview = image::load_from_memory(&bytes).unwrap();
    assert_eq!((preview.width(), preview.height()), (200, 150));

    let (status, _, bytes) = h.raw("/api/image/preview?path=b.jpg").await;
    assert_eq!(status, StatusCode::OK);
    assert!(image::load_from_memory(&bytes).is_ok());

    let (status, body) = h.get("/api/image/preview?path=missing.jpg").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Image not found");
    let (status, _) = h.get("/api/image/preview?path=../config.yaml").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn caption_of_the_current_image_is_written() {
    let h = Harness::new().with_real_images();
    let (status, body) = h.post("/api/image/caption", json!({ "caption": "Sunset" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "No image loaded");

    h.post("/api/next", json!({})).await;
    assert!(h.slideshow.signals().take_redraw());
    let (status, body) = h.post("/api/image/caption", json!({ "caption": "Sunset" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Caption saved successfully");
    assert!(h.slideshow.signals().take_redraw());

    let current = h.slideshow.current().unwrap();
    let path = h.slideshow.library().resolve(&current);
    assert_eq!(read_caption(&path).as_deref(), Some("Sunset"));
    let (_, body) = h.get("/api/image/caption").await;
    assert_eq!(body["caption"], "Sunset");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upload_captions_are_stored_in_the_file() {
    let h = Harness::new();
    let (status, body) = h
        .call(multipart_upload("beach.jpg", &jpeg_bytes(64, 48), Some("At the beach")))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["caption_added"], true);
    let stored = h.images().join("uploaded").join("beach.jpg");
    assert_eq!(read_caption(&stored).as_deref(), Some("At the beach"));

    // not an image the caption can live in; the upload still succeeds
    let (status, body) = h
        .call(multipart_upload("odd.jpg", b"jpegbytes", Some("lost")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["caption_added"], false);

    let (status, body) = h
        .post(
            "/api/uploaded-images/caption",
            json!({ "path": "uploaded/beach.jpg", "caption": "Low tide" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["filename"], "beach.jpg");
    assert_eq!(body["caption"], "Low tide");
    assert_eq!(read_caption(&stored).as_deref(), Some("Low tide"));

    let (_, list) = h.get("/api/uploaded-images").await;
    let beach = list["images"]
        .as_array()
        .unwrap()
        .iter()
        .find(|img| img["filename"] == "beach.jpg")
        .unwrap();
    assert_eq!(beach["caption"], "Low tide");

    let (status, body) = h
        .post("/api/uploaded-images/caption", json!({ "caption": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "path and caption required");
    let (status, body) = h
        .post("/api/uploaded-images/caption", json!({ "path": "a.jpg", "caption": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid image path");
    let (status, body) = h
        .post(
            "/api/uploaded-images/caption",
            json!({ "path": "uploaded/nope.jpg", "caption": "x" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Image file not found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn caption_cache_cleanup_removes_the_file() {
    let h = Harness::new();
    let uploads = h.images().join("uploaded");
    std::fs::create_dir_all(&uploads).unwrap();
    let cache = uploads.join(".captions.json");
    std::fs::write(&cache, b"{}").unwrap();

    let (status, body) = h.post("/api/uploaded-images/cleanup-cache", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["removed"], true);
    assert!(!cache.exists());

    let (status, body) = h.post("/api/uploaded-images/cleanup-cache", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], false);
}
