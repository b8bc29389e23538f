//! Filesystem watcher that queues new images as soon as they land.
//!
//! Frontier rescans would find them eventually; the watcher just makes a
//! freshly copied photo eligible for the very next slide.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::navigation::ItemId;
use crate::scan::Library;
use crate::slideshow::Slideshow;

/// Paths an event makes available, or `None` when it only removes or
/// touches files.
fn arrivals(event: &Event) -> Option<Vec<PathBuf>> {
    match &event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Any) => Some(event.paths.clone()),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(event.paths.clone()),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            Some(event.paths.last().cloned().into_iter().collect())
        }
        // some backends report moves as Name(Any); decide by existence
        EventKind::Modify(ModifyKind::Name(_)) => {
            Some(event.paths.iter().filter(|p| p.exists()).cloned().collect())
        }
        _ => None,
    }
}

/// Ids for `paths` that the library would also find by scanning.
fn visible_ids(library: &Library, paths: &[PathBuf]) -> Vec<ItemId> {
    paths
        .iter()
        .filter(|p| p.is_file())
        .filter_map(|p| library.id_for_path(p))
        .filter(|id| !id.as_str().split('/').any(|part| part.starts_with('.')))
        .collect()
}

fn watch_roots(watcher: &mut RecommendedWatcher, library: &Library) -> Vec<PathBuf> {
    let mut watched = Vec::new();
    for root in [library.images_root(), library.upload_root()] {
        if !root.is_dir() || watched.iter().any(|w: &PathBuf| root.starts_with(w)) {
            continue;
        }
        match watcher.watch(root, RecursiveMode::Recursive) {
            Ok(()) => {
                info!(watching = %root.display(), "notify watcher initialized (recursive)");
                watched.push(root.to_path_buf());
            }
            Err(err) => warn!(root = %root.display(), error = %err, "failed to watch directory"),
        }
    }
    watched
}

fn unwatch_all(watcher: &mut RecommendedWatcher, watched: &[PathBuf]) {
    for root in watched {
        if let Err(err) = watcher.unwatch(Path::new(root)) {
            debug!(root = %root.display(), error = %err, "unwatch failed");
        }
    }
}

#[instrument(skip_all)]
pub async fn run(slideshow: Arc<Slideshow>, cancel: CancellationToken) -> Result<()> {
    // notify callback -> async channel
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<Event>>(128);
    let mut watcher = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send(res);
    })?;
    let mut library = slideshow.library();
    let mut watched = watch_roots(&mut watcher, &library);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting files task");
                break;
            }
            _ = slideshow.library_changed().notified() => {
                unwatch_all(&mut watcher, &watched);
                library = slideshow.library();
                watched = watch_roots(&mut watcher, &library);
            }
            Some(res) = watch_rx.recv() => match res {
                Ok(event) => {
                    debug!(kind = ?event.kind, paths = ?event.paths, "notify event");
                    if matches!(event.kind, EventKind::Remove(RemoveKind::File | RemoveKind::Any)) {
                        debug!(paths = ?event.paths, "fs: removed; stale ids are skipped on display");
                        continue;
                    }
                    let Some(paths) = arrivals(&event) else {
                        continue;
                    };
                    let ids = visible_ids(&library, &paths);
                    if ids.is_empty() {
                        continue;
                    }
                    let added = slideshow.navigator().discover(ids);
                    if added > 0 {
                        info!(added, "fs: new images queued");
                    }
                }
                Err(err) => error!("watch error: {err}"),
            }
        }
    }
    Ok(())
}
