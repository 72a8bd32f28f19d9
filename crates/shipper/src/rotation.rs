//! Reacting to external rotate and reload requests
//!
//! Both operations swap the cursors of the shared `WatchSet` under its
//! lock, so they never interleave with a tail poll.
//!
//! - **rotate**: the files were moved or truncated by logrotate. Whatever
//!   was still unread in the old handles is returned as final lines, then
//!   the configured paths are opened fresh at their end, or at the saved
//!   offset when the offsets file knows the new inode.
//! - **reload**: the path list (or nothing) changed. Offsets are remembered
//!   by inode, and a reopened file with a known inode resumes where it was.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cursor::SeekTo;
use crate::offsets::{OffsetMap, OffsetStore};
use crate::tailer::{CursorPosition, WatchSet};

pub struct RotationController {
    watch: Arc<Mutex<WatchSet>>,
    paths: Vec<PathBuf>,
    offsets: Option<OffsetStore>,
}

impl RotationController {
    pub fn new(watch: Arc<Mutex<WatchSet>>, paths: Vec<PathBuf>) -> Self {
        Self {
            watch,
            paths,
            offsets: None,
        }
    }

    /// Consult `store` for the start position of files reopened by rotation
    pub fn with_offsets(mut self, store: OffsetStore) -> Self {
        self.offsets = Some(store);
        self
    }

    /// Currently configured watch paths
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Capture final lines, close everything, reopen at end of file
    ///
    /// The returned lines must be enqueued before anything read from the
    /// new handles.
    pub fn rotate(&self) -> Vec<String> {
        let saved = self.saved_offsets();
        let mut set = self.watch.lock();

        let final_lines = set.drain();
        set.reopen(&self.paths, |path, inode, size| match saved.get(&inode) {
            Some(entry) if inode != 0 && entry.offset <= size => {
                tracing::info!(
                    path = %path.display(),
                    inode,
                    offset = entry.offset,
                    "resuming rotated file from saved offset"
                );
                SeekTo::Offset(entry.offset)
            }
            _ => SeekTo::End,
        });

        if set.is_empty() {
            tracing::warn!("no watch files could be reopened after rotation");
        }
        tracing::info!(
            final_lines = final_lines.len(),
            files = set.len(),
            "watch files rotated"
        );

        final_lines
    }

    /// Reopen (optionally different) paths, keeping offsets of unchanged files
    ///
    /// Returns partial slow-log blocks flushed from the closed handles.
    pub fn reload(&mut self, new_paths: Option<Vec<PathBuf>>) -> Vec<String> {
        let mut set = self.watch.lock();

        let saved: HashMap<u64, u64> = set
            .positions()
            .into_iter()
            .map(|p| (p.inode, p.offset))
            .collect();
        let flushed = set.flush_pending();

        if let Some(paths) = new_paths {
            self.paths = paths;
        }

        let mut resumed = 0usize;
        set.reopen(&self.paths, |path, inode, _size| match saved.get(&inode) {
            Some(&offset) => {
                resumed += 1;
                tracing::debug!(path = %path.display(), inode, offset, "resuming file");
                SeekTo::Offset(offset)
            }
            None => SeekTo::End,
        });

        if set.is_empty() {
            tracing::warn!("no watch files could be reopened after reload");
        }
        tracing::info!(files = set.len(), resumed, "watch files reloaded");

        flushed
    }

    fn saved_offsets(&self) -> OffsetMap {
        let Some(store) = &self.offsets else {
            return OffsetMap::new();
        };
        store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring saved offsets");
            OffsetMap::new()
        })
    }

    /// Offsets of the open cursors
    pub fn positions(&self) -> Vec<CursorPosition> {
        self.watch.lock().positions()
    }
}

#[cfg(test)]
#[path = "rotation_test.rs"]
mod rotation_test;
