//! The browser control page. One HTML shell plus embedded static assets;
//! everything dynamic goes through `/api/*` from `app.js`.

use axum::extract::Path;
use axum::http::header;
use axum::response::{Html, IntoResponse};

use super::{ApiError, ApiResult};

const APP_JS: &str = include_str!("assets/app.js");

pub async fn index() -> Html<String> {
    Html(layout(BODY))
}

pub async fn asset(Path(path): Path<String>) -> ApiResult<impl IntoResponse> {
    match path.as_str() {
        "app.js" => Ok((
            [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
            APP_JS,
        )),
        "style.css" => Ok(([(header::CONTENT_TYPE, "text/css; charset=utf-8")], styles())),
        _ => Err(ApiError::not_found("Not found")),
    }
}

fn layout(body: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"><title>Pi Gallery</title><link rel=\"stylesheet\" href=\"/static/style.css\"></head><body><main>{}</main><script src=\"/static/app.js\"></script></body></html>",
        body
    )
}

fn styles() -> &'static str {
    "body { font-family: sans-serif; margin: 0; padding: 0; background: #f5f5f5; color: #222; }\nmain { max-width: 960px; margin: 0 auto; padding: 24px; background: #fff; min-height: 100vh; box-sizing: border-box; }\nh1, h2 { margin-top: 0; }\nsection { margin-bottom: 28px; }\nbutton { padding: 6px 12px; font-size: 0.95rem; border-radius: 4px; border: 1px solid #1976d2; background: #2196f3; color: #fff; cursor: pointer; margin: 2px; }\nbutton:hover { background: #1e88e5; }\nbutton.danger { border-color: #b71c1c; background: #d32f2f; }\nbutton.danger:hover { background: #c62828; }\ninput[type=text], input[type=number], select { padding: 6px; border-radius: 4px; border: 1px solid #ccc; }\n.current { display: flex; gap: 16px; align-items: flex-start; }\n.current img { max-width: 200px; max-height: 200px; border-radius: 4px; background: #eee; }\n.note { font-size: 0.9rem; color: #555; }\n.error { background: #ffebee; color: #b71c1c; padding: 12px; border-radius: 4px; }\ntable { width: 100%; border-collapse: collapse; margin-top: 12px; }\nth, td { border-bottom: 1px solid #ddd; padding: 8px; text-align: left; vertical-align: middle; }\ntd img { max-width: 80px; max-height: 80px; }\npre { background: #263238; color: #eceff1; padding: 12px; border-radius: 6px; max-height: 400px; overflow: auto; font-size: 0.85rem; }\n.settings label { display: block; margin: 6px 0; }"
}

const BODY: &str = r#"<h1>Pi Gallery</h1>
<div id="message" class="error" hidden></div>
<section>
  <h2>Now showing</h2>
  <div class="current">
    <img id="preview" alt="">
    <div>
      <p id="status" class="note">Loading...</p>
      <button data-post="/api/prev">Previous</button>
      <button data-post="/api/pause" id="pause">Pause</button>
      <button data-post="/api/next">Next</button>
      <p>
        <input type="text" id="caption" placeholder="Caption" size="40">
        <button id="save-caption">Save caption</button>
      </p>
      <p>
        Display:
        <button data-display="on">On</button>
        <button data-display="off">Off</button>
        <button data-display="auto">Auto</button>
      </p>
    </div>
  </div>
</section>
<section>
  <h2>Upload</h2>
  <form id="upload">
    <input type="file" name="file" accept="image/*" required>
    <input type="text" name="caption" placeholder="Caption (optional)">
    <button type="submit">Upload</button>
  </form>
  <table>
    <thead><tr><th></th><th>File</th><th>Size</th><th>Caption</th><th></th></tr></thead>
    <tbody id="uploads"></tbody>
  </table>
  <p class="note" id="upload-dir"></p>
</section>
<section class="settings">
  <h2>Settings</h2>
  <form id="settings">
    <label>Delay (seconds) <input type="number" name="delay_seconds" min="1"></label>
    <label>Order
      <select name="sort_order">
        <option value="random">Random</option>
        <option value="name">Name</option>
        <option value="date">Date</option>
      </select>
    </label>
    <label><input type="checkbox" name="save_to_config"> Save to config file</label>
    <button type="submit">Apply</button>
  </form>
</section>
<section>
  <h2>System</h2>
  <button data-power="/api/system/restart" class="danger">Restart</button>
  <button data-power="/api/system/shutdown" class="danger">Shut down</button>
  <button data-post="/api/system/cancel">Cancel</button>
</section>
<section>
  <h2>Logs</h2>
  <button id="refresh-logs">Refresh</button>
  <pre id="logs"></pre>
</section>"#;
