// SPDX-License-Identifier: MIT OR Apache-2.0
//! Edit state file watcher.
//!
//! Watches the edit state file and hands back a freshly parsed edit state
//! whenever it changes on disk, so edits made elsewhere show up in the
//! running preview.

use crate::config::Result;
use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode},
    DebounceEventResult, Debouncer, RecommendedCache,
};
use reelsync_timeline::EditState;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

/// Events emitted by the edit watcher
#[derive(Debug, Clone, PartialEq)]
pub enum EditFileEvent {
    /// The file was written
    Changed,
    /// The file was removed
    Removed,
    /// The watcher reported an error
    Error(String),
}

/// Watches one edit state file
pub struct EditWatcher {
    _watcher: Debouncer<RecommendedWatcher, RecommendedCache>,
    event_rx: Receiver<EditFileEvent>,
    path: PathBuf,
}

impl EditWatcher {
    /// Start watching `path`
    pub fn new(path: impl AsRef<Path>, debounce: Duration) -> Result<Self> {
        let path = absolute(path.as_ref());
        let target = path.clone();
        let (event_tx, event_rx) = mpsc::channel();

        let mut watcher = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        if !event.paths.iter().any(|p| p == &target) {
                            continue;
                        }
                        let mapped = match event.kind {
                            EventKind::Create(_) | EventKind::Modify(_) => EditFileEvent::Changed,
                            EventKind::Remove(_) => EditFileEvent::Removed,
                            EventKind::Any | EventKind::Access(_) | EventKind::Other => continue,
                        };
                        let _ = event_tx.send(mapped);
                    }
                }
                Err(errors) => {
                    for error in errors {
                        let _ = event_tx.send(EditFileEvent::Error(error.to_string()));
                    }
                }
            }
        })?;

        // Editors often replace the file, so watch the directory
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        tracing::info!("Watching edit state {:?}", path);

        Ok(Self {
            _watcher: watcher,
            event_rx,
            path,
        })
    }

    /// Watched file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drain pending events (non-blocking)
    pub fn poll_events(&self) -> Vec<EditFileEvent> {
        let mut events = Vec::new();
        loop {
            match self.event_rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("Edit watcher channel disconnected");
                    break;
                }
            }
        }
        events
    }

    /// Reload the edit state if the file changed since the last poll.
    ///
    /// A file that fails to parse is logged and skipped; the preview keeps
    /// the previous edit.
    pub fn poll_reload(&self) -> Option<EditState> {
        let events = self.poll_events();
        for event in &events {
            match event {
                EditFileEvent::Removed => tracing::warn!("Edit state {:?} was removed", self.path),
                EditFileEvent::Error(e) => tracing::warn!("Edit watcher error: {}", e),
                EditFileEvent::Changed => {}
            }
        }

        if !events.contains(&EditFileEvent::Changed) {
            return None;
        }

        match load_edit_state(&self.path) {
            Ok(edit) => {
                tracing::info!("Reloaded edit state: {} clips", edit.clips.len());
                Some(edit)
            }
            Err(e) => {
                tracing::warn!("Ignoring edit state change: {}", e);
                None
            }
        }
    }
}

/// Read an edit state from a RON file
pub fn load_edit_state(path: &Path) -> Result<EditState> {
    let content = std::fs::read_to_string(path)?;
    Ok(EditState::from_ron(&content)?)
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelsync_timeline::{ClipEdit, RetainedSpan};

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}_{}.ron", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_load_edit_state() {
        let path = temp_file("edit");
        let mut edit = EditState::new();
        edit.push_clip(ClipEdit::new("intro").with_span(RetainedSpan::new(0.0, 2.0)));
        std::fs::write(&path, edit.to_ron().unwrap()).unwrap();

        let loaded = load_edit_state(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, edit);
    }

    #[test]
    fn test_load_invalid_edit_state() {
        let path = temp_file("broken");
        std::fs::write(&path, "(clips: oops").unwrap();
        let result = load_edit_state(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_no_reload_without_changes() {
        let path = temp_file("quiet");
        std::fs::write(&path, EditState::new().to_ron().unwrap()).unwrap();

        let watcher = EditWatcher::new(&path, Duration::from_millis(50)).unwrap();
        assert!(watcher.path().is_absolute());
        assert!(watcher.poll_reload().is_none());
        std::fs::remove_file(&path).unwrap();
    }
}
