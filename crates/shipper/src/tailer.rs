//! Polling a set of watched files
//!
//! The `WatchSet` is the single shared mutable resource on the shipper:
//! the tail loop reads through it and the rotation controller swaps its
//! cursors. Both go through one `parking_lot::Mutex`, and both only hold
//! it from the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use logbeat_config::WatchFormat;
use logbeat_protocol::parse_slow_block;
use parking_lot::Mutex;

use crate::assembler::SlowLogAssembler;
use crate::cursor::{FileCursor, SeekTo};
use crate::metrics::ShipperMetrics;

/// How cursors in a set are opened and framed
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub format: WatchFormat,
    pub max_line_size: usize,
}

/// Position of one open cursor, for reload and durable offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorPosition {
    pub inode: u64,
    pub path: PathBuf,
    pub offset: u64,
}

/// Turns raw lines into wire messages
enum Framer {
    Plain,
    Slow(SlowLogAssembler),
}

struct Watched {
    cursor: FileCursor,
    framer: Framer,
}

impl Watched {
    fn frame(&mut self, lines: Vec<String>, out: &mut Vec<String>, metrics: &ShipperMetrics) {
        match &mut self.framer {
            Framer::Plain => out.extend(lines),
            Framer::Slow(assembler) => {
                for line in lines {
                    if let Some(block) = assembler.push(line) {
                        encode_block(self.cursor.path(), &block, out, metrics);
                    }
                }
            }
        }
    }

    fn flush(&mut self, out: &mut Vec<String>, metrics: &ShipperMetrics) {
        if let Framer::Slow(assembler) = &mut self.framer
            && let Some(block) = assembler.flush()
        {
            encode_block(self.cursor.path(), &block, out, metrics);
        }
    }
}

fn encode_block(path: &Path, block: &[String], out: &mut Vec<String>, metrics: &ShipperMetrics) {
    let encoded = parse_slow_block(block)
        .map_err(|e| e.to_string())
        .and_then(|envelope| envelope.to_line().map_err(|e| e.to_string()));

    match encoded {
        Ok(line) => out.push(line),
        Err(error) => {
            metrics.record_block_dropped();
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "dropping slow log block"
            );
        }
    }
}

/// The open cursors being tailed
pub struct WatchSet {
    watched: Vec<Watched>,
    /// Cursor to resume from when the last poll hit the batch cap
    next: usize,
    options: WatchOptions,
    metrics: Arc<ShipperMetrics>,
}

impl WatchSet {
    /// Open every path, choosing each start position with `position`
    ///
    /// `position` receives the path, its inode and its current size.
    /// Paths that cannot be opened are logged and left out.
    pub fn open<F>(
        paths: &[PathBuf],
        options: WatchOptions,
        metrics: Arc<ShipperMetrics>,
        mut position: F,
    ) -> Self
    where
        F: FnMut(&Path, u64, u64) -> SeekTo,
    {
        let mut watched = Vec::with_capacity(paths.len());

        for path in paths {
            let opened = FileCursor::open(path, SeekTo::End, options.max_line_size).and_then(
                |mut cursor| {
                    let start = position(path, cursor.inode(), cursor.offset());
                    if start != SeekTo::End {
                        cursor.seek(start)?;
                    }
                    Ok(cursor)
                },
            );

            match opened {
                Ok(cursor) => {
                    tracing::info!(
                        path = %path.display(),
                        inode = cursor.inode(),
                        offset = cursor.offset(),
                        "watching file"
                    );
                    let framer = match options.format {
                        WatchFormat::Plain => Framer::Plain,
                        WatchFormat::MysqlSlow => Framer::Slow(SlowLogAssembler::new()),
                    };
                    watched.push(Watched { cursor, framer });
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "cannot open watch file"
                    );
                }
            }
        }

        Self {
            watched,
            next: 0,
            options,
            metrics,
        }
    }

    /// Close every cursor, then open `paths` again
    pub fn reopen<F>(&mut self, paths: &[PathBuf], position: F)
    where
        F: FnMut(&Path, u64, u64) -> SeekTo,
    {
        self.close();
        *self = Self::open(paths, self.options, Arc::clone(&self.metrics), position);
    }

    /// Close every cursor
    pub fn close(&mut self) {
        self.watched.clear();
        self.next = 0;
    }

    pub fn options(&self) -> WatchOptions {
        self.options
    }

    pub fn metrics(&self) -> &Arc<ShipperMetrics> {
        &self.metrics
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    /// One pass over the cursors, at most `batch_size` messages
    ///
    /// Each cursor is read until it has nothing complete left. If the cap
    /// is hit mid-file the unread bytes stay put and the next poll starts
    /// with that cursor. An unreadable cursor is logged and skipped.
    pub fn poll(&mut self, batch_size: usize) -> Vec<String> {
        let mut out = Vec::new();
        let count = self.watched.len();

        for step in 0..count {
            let idx = (self.next + step) % count;
            let watched = &mut self.watched[idx];

            match watched.cursor.detect_truncation() {
                Ok(true) => self.metrics.record_truncation(),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        path = %watched.cursor.path().display(),
                        error = %e,
                        "watched file unreadable, skipping"
                    );
                    continue;
                }
            }

            loop {
                let room = batch_size.saturating_sub(out.len());
                if room == 0 {
                    self.next = idx;
                    return out;
                }

                let mut lines = Vec::new();
                match watched.cursor.read_lines(room, &mut lines) {
                    Ok(0) => break,
                    Ok(n) => {
                        self.metrics.record_lines(n as u64);
                        watched.frame(lines, &mut out, &self.metrics);
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %watched.cursor.path().display(),
                            error = %e,
                            "watched file unreadable, skipping"
                        );
                        break;
                    }
                }
            }
        }

        self.next = 0;
        out
    }

    /// Read everything left in every cursor and flush partial blocks
    ///
    /// Called before the handles are closed on rotation.
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();

        for watched in &mut self.watched {
            let mut lines = Vec::new();
            if let Err(e) = watched.cursor.read_remaining(&mut lines) {
                tracing::warn!(
                    path = %watched.cursor.path().display(),
                    error = %e,
                    "failed to read final lines"
                );
            }
            self.metrics.record_lines(lines.len() as u64);
            watched.frame(lines, &mut out, &self.metrics);
            watched.flush(&mut out, &self.metrics);
        }

        out
    }

    /// Flush partial slow-log blocks without reading further
    pub fn flush_pending(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        for watched in &mut self.watched {
            watched.flush(&mut out, &self.metrics);
        }
        out
    }

    pub fn positions(&self) -> Vec<CursorPosition> {
        self.watched
            .iter()
            .map(|w| CursorPosition {
                inode: w.cursor.inode(),
                path: w.cursor.path().to_path_buf(),
                offset: w.cursor.offset(),
            })
            .collect()
    }
}

/// Background reader over a shared `WatchSet`
#[derive(Clone)]
pub struct Tailer {
    watch: Arc<Mutex<WatchSet>>,
    batch_size: usize,
}

impl Tailer {
    pub fn new(watch: Arc<Mutex<WatchSet>>, batch_size: usize) -> Self {
        Self { watch, batch_size }
    }

    /// Blocking poll; holds the set lock for the whole pass
    pub fn poll(&self) -> Vec<String> {
        self.watch.lock().poll(self.batch_size)
    }

    /// Poll on the blocking pool
    pub async fn poll_async(&self) -> Result<Vec<String>, tokio::task::JoinError> {
        let tailer = self.clone();
        tokio::task::spawn_blocking(move || tailer.poll()).await
    }
}

#[cfg(test)]
#[path = "tailer_test.rs"]
mod tailer_test;
