//! Directory scanning: turns the images and upload directories into item ids.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::{Configuration, SortOrder};
use crate::navigation::{DiscoveryOrder, ItemId, ItemSource};

/// Namespace prefix for ids that live in the upload directory.
pub const UPLOAD_PREFIX: &str = "uploaded/";

/// Return `true` if `path` has one of the allowed (lowercase) extensions.
#[must_use]
pub fn is_supported_image<S: AsRef<str>>(path: &Path, exts: &[S]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            exts.iter().any(|e| e.as_ref() == ext)
        })
}

/// The two roots images are discovered from, plus how to order what they hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Library {
    images_root: PathBuf,
    upload_root: PathBuf,
    extensions: Vec<String>,
    sort: SortOrder,
    reverse: bool,
}

impl Library {
    pub fn new(images_root: PathBuf, upload_root: PathBuf) -> Self {
        Self {
            images_root,
            upload_root,
            extensions: vec!["jpg".into(), "jpeg".into(), "png".into()],
            sort: SortOrder::Random,
            reverse: false,
        }
    }

    pub fn from_config(cfg: &Configuration) -> Self {
        Self {
            images_root: cfg.images_dir(),
            upload_root: cfg.upload_dir(),
            extensions: cfg
                .extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
            sort: cfg.sort_order,
            reverse: cfg.sort_reverse,
        }
    }

    pub fn with_sort(mut self, sort: SortOrder, reverse: bool) -> Self {
        self.sort = sort;
        self.reverse = reverse;
        self
    }

    pub fn images_root(&self) -> &Path {
        &self.images_root
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn discovery_order(&self) -> DiscoveryOrder {
        self.sort.discovery_order()
    }

    /// Map an id back to a path. The file may no longer exist.
    pub fn resolve(&self, id: &ItemId) -> PathBuf {
        match id.as_str().strip_prefix(UPLOAD_PREFIX) {
            Some(rest) => self.upload_root.join(rest),
            None => self.images_root.join(id.as_str()),
        }
    }

    /// Id for a file stored directly in the upload directory.
    pub fn upload_id(file_name: &str) -> ItemId {
        ItemId::new(format!("{UPLOAD_PREFIX}{file_name}"))
    }

    /// Id for an arbitrary path under one of the roots, if it is a supported image.
    pub fn id_for_path(&self, path: &Path) -> Option<ItemId> {
        if !is_supported_image(path, &self.extensions) {
            return None;
        }
        if let Some(rel) = relative_to(path, &self.upload_root) {
            return Some(ItemId::new(format!("{UPLOAD_PREFIX}{rel}")));
        }
        relative_to(path, &self.images_root).map(ItemId::new)
    }

    fn walk(&self, root: &Path, prefix: &str, skip: Option<&Path>) -> Vec<(ItemId, SystemTime)> {
        if !root.is_dir() {
            if prefix.is_empty() {
                warn!(root = %root.display(), "image directory missing or not a directory");
            } else {
                debug!(root = %root.display(), "upload directory not present yet");
            }
            return Vec::new();
        }
        let skip = skip.and_then(|p| p.canonicalize().ok());
        let mut out = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            // Skip hidden dot-directories *below* the root only.
            .filter_entry(|e| !should_skip_dir(e) && !is_excluded(e, skip.as_deref()))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(root = %root.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_supported_image(entry.path(), &self.extensions)
            {
                continue;
            }
            let Some(rel) = relative_to(entry.path(), root) else {
                continue;
            };
            let modified = match self.sort {
                SortOrder::Date => entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH),
                _ => SystemTime::UNIX_EPOCH,
            };
            out.push((ItemId::new(format!("{prefix}{rel}")), modified));
        }
        out
    }
}

impl ItemSource for Library {
    fn scan(&self) -> Vec<ItemId> {
        let mut found = self.walk(&self.images_root, "", Some(&self.upload_root));
        found.extend(self.walk(&self.upload_root, UPLOAD_PREFIX, None));
        match self.sort {
            SortOrder::Random => {}
            SortOrder::Name => found.sort_by(|a, b| a.0.cmp(&b.0)),
            SortOrder::Date => found.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0))),
        }
        if self.reverse && self.sort != SortOrder::Random {
            found.reverse();
        }
        debug!(count = found.len(), sort = self.sort.as_str(), "library scanned");
        found.into_iter().map(|(id, _)| id).collect()
    }
}

fn should_skip_dir(entry: &DirEntry) -> bool {
    // Never skip the root; tempfile roots can be dot-dirs.
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .is_some_and(|n| n.starts_with('.'))
}

fn is_excluded(entry: &DirEntry, skip: Option<&Path>) -> bool {
    let Some(skip) = skip else {
        return false;
    };
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.path().canonicalize().is_ok_and(|p| p == skip)
}

/// `path` relative to `root` with `/` separators, rejecting anything that
/// climbs out of the root.
fn relative_to(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
