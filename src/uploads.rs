//! The upload directory: saving, listing, deleting and renaming user uploads.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::caption;
use crate::error::Error;
use crate::scan::{UPLOAD_PREFIX, is_supported_image};

/// Scratch caption cache left in the upload directory by the web UI.
pub const CAPTION_CACHE_FILE: &str = ".captions.json";

/// Extensions accepted for uploads, regardless of what the library scans.
pub const UPLOAD_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedImage {
    pub filename: String,
    /// Item id of the upload (`uploaded/<filename>`).
    pub path: String,
    pub size: u64,
    pub size_human: String,
    /// Modification time in seconds since the epoch.
    pub upload_date: f64,
    pub upload_date_human: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<DeleteFailure>,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `bytes` under a sanitised version of `original_name`, choosing
    /// `name_1.ext`, `name_2.ext`, ... when the name is taken. Returns the
    /// stored file name.
    pub fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String, Error> {
        if original_name.trim().is_empty() {
            return Err(Error::InvalidUpload("No file selected".into()));
        }
        if !has_upload_extension(original_name) {
            return Err(Error::InvalidUpload(
                "Invalid file type. Only JPG and PNG allowed".into(),
            ));
        }
        let name = sanitize_filename(original_name)
            .filter(|n| has_upload_extension(n))
            .ok_or_else(|| Error::InvalidUpload(format!("unusable file name: {original_name}")))?;
        fs::create_dir_all(&self.dir)?;

        let (stem, ext) = split_extension(&name);
        let mut candidate = name.clone();
        let mut counter = 1;
        loop {
            let path = self.dir.join(&candidate);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(bytes)?;
                    file.sync_all()?;
                    info!(file = %candidate, dir = %self.dir.display(), bytes = bytes.len(), "stored upload");
                    return Ok(candidate);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    candidate = format!("{stem}_{counter}{ext}");
                    counter += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Uploaded images, newest first. A missing directory lists as empty.
    pub fn list(&self) -> Result<Vec<UploadedImage>, Error> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut images = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Ok(filename) = entry.file_name().into_string() else {
                continue;
            };
            if filename.starts_with('.') || !has_upload_extension(&filename) {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(err) => {
                    warn!(file = %filename, error = %err, "cannot stat upload");
                    continue;
                }
            };
            let modified = meta.modified().unwrap_or(UNIX_EPOCH);
            let upload_date = modified
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default();
            images.push(UploadedImage {
                path: format!("{UPLOAD_PREFIX}{filename}"),
                size: meta.len(),
                size_human: format_file_size(meta.len()),
                upload_date,
                upload_date_human: DateTime::<Local>::from(modified)
                    .format("%Y-%m-%d %H:%M")
                    .to_string(),
                caption: caption::read_caption(&entry.path()).unwrap_or_default(),
                filename,
            });
        }
        images.sort_by(|a, b| b.upload_date.total_cmp(&a.upload_date));
        Ok(images)
    }

    /// Delete uploads by name. Only the final path component of each entry is
    /// used, so ids such as `uploaded/a.jpg` work too.
    pub fn delete(&self, names: &[String]) -> DeleteReport {
        let mut report = DeleteReport::default();
        for requested in names {
            let fail = |error: &str| DeleteFailure {
                path: requested.clone(),
                error: error.to_string(),
            };
            let Some(base) = Path::new(requested)
                .file_name()
                .and_then(|n| n.to_str())
                .filter(|n| !n.starts_with('.'))
            else {
                report.failed.push(fail("Invalid path"));
                continue;
            };
            let path = self.dir.join(base);
            if !path.is_file() {
                report.failed.push(fail("File not found"));
                continue;
            }
            if !has_upload_extension(base) {
                report.failed.push(fail("Not an image file"));
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!(file = base, "deleted upload");
                    report.deleted.push(requested.clone());
                }
                Err(err) => report.failed.push(fail(&err.to_string())),
            }
        }
        report
    }

    /// Rename an upload. Returns the (sanitised) new file name.
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<String, Error> {
        if old_name.is_empty() || new_name.is_empty() {
            return Err(Error::InvalidUpload("Filenames cannot be empty".into()));
        }
        for name in [old_name, new_name] {
            if name.contains("..") || name.contains('/') || name.contains('\\') {
                return Err(Error::InvalidUpload("Invalid filename".into()));
            }
        }
        let new_name = sanitize_filename(new_name)
            .filter(|n| has_upload_extension(n))
            .ok_or_else(|| {
                Error::InvalidUpload(
                    "New filename must have .jpg, .jpeg, or .png extension".into(),
                )
            })?;
        let old_path = self.dir.join(old_name);
        let new_path = self.dir.join(&new_name);
        if !old_path.is_file() {
            return Err(Error::NotFound("Original file not found".into()));
        }
        if new_path.exists() {
            return Err(Error::AlreadyExists(
                "A file with that name already exists".into(),
            ));
        }
        fs::rename(&old_path, &new_path)?;
        debug!(from = old_name, to = %new_name, "renamed upload");
        Ok(new_name)
    }

    /// Write `caption` into the upload named by its item id
    /// (`uploaded/<file>`). Returns the file name.
    pub fn set_caption(&self, id: &str, caption: &str) -> Result<String, Error> {
        let Some(rest) = id.strip_prefix(UPLOAD_PREFIX) else {
            return Err(Error::InvalidUpload("Invalid image path".into()));
        };
        let filename = Path::new(rest)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.starts_with('.'))
            .ok_or_else(|| Error::InvalidUpload("Invalid filename".into()))?;
        let path = self.dir.join(filename);
        if !path.is_file() {
            return Err(Error::NotFound("Image file not found".into()));
        }
        caption::write_caption(&path, caption)?;
        info!(file = filename, "caption updated");
        Ok(filename.to_string())
    }

    /// Remove the UI's caption cache file. Returns whether one existed.
    pub fn cleanup_caption_cache(&self) -> Result<bool, Error> {
        match fs::remove_file(self.dir.join(CAPTION_CACHE_FILE)) {
            Ok(()) => {
                debug!(dir = %self.dir.display(), "caption cache removed");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

pub fn has_upload_extension(name: &str) -> bool {
    is_supported_image(Path::new(name), UPLOAD_EXTENSIONS)
}

/// Reduce a client supplied file name to a safe basename: directory parts are
/// dropped, whitespace becomes `_`, and only ASCII letters, digits, `.`, `_`
/// and `-` survive. Leading and trailing dots/underscores are trimmed.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_');
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

pub fn format_file_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} GB")
}
