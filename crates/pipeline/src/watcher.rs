//! Filesystem event source for the watch directory.

use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Keeps the OS watcher alive. Dropping it stops the event stream and closes
/// the receiver returned by [`watch_directory`].
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    dir: PathBuf,
}

impl DirectoryWatcher {
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Watches `dir` (non-recursively) and sends the path of every entry created
/// in it, including entries renamed into it.
///
/// Paths are not filtered by extension and may repeat.
pub fn watch_directory(
    dir: &Path,
) -> Result<(DirectoryWatcher, mpsc::UnboundedReceiver<PathBuf>), notify::Error> {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        match res {
            Ok(event) => {
                for path in created_paths(&event) {
                    if path.is_dir() {
                        continue;
                    }
                    debug!(path = %path.display(), kind = ?event.kind, "file created");
                    let _ = tx.send(path);
                }
            }
            Err(e) => warn!(error = %e, "watch error"),
        }
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!(dir = %dir.display(), "watching directory");

    Ok((
        DirectoryWatcher {
            _watcher: watcher,
            dir: dir.to_path_buf(),
        },
        rx,
    ))
}

/// Paths an event introduces into the directory.
pub(crate) fn created_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.clone()
        }
        // Paths are [from, to].
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        _ => Vec::new(),
    }
}
