//! Per-file read position
//!
//! A `FileCursor` owns an open handle on one watched file plus the byte
//! offset just past the last complete line handed out. The offset only
//! moves forward, except when the file is found shorter than the offset
//! (copy-truncate rotation) and the cursor rewinds to 0.
//!
//! All I/O here is blocking; callers run it on the blocking pool.

use std::fs::{File, Metadata};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Where a freshly opened cursor starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTo {
    /// Current end of file
    End,
    /// Absolute byte offset, clamped to the file size
    Offset(u64),
}

pub struct FileCursor {
    path: PathBuf,
    inode: u64,
    offset: u64,
    reader: BufReader<File>,
    max_line_size: usize,
    line_buf: Vec<u8>,
}

impl FileCursor {
    /// Open `path` and position the cursor
    pub fn open(path: &Path, seek: SeekTo, max_line_size: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        let meta = file.metadata()?;
        let size = meta.len();

        let offset = match seek {
            SeekTo::End => size,
            SeekTo::Offset(offset) => offset.min(size),
        };

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(offset))?;

        Ok(Self {
            path: path.to_path_buf(),
            inode: inode_of(&meta),
            offset,
            reader,
            max_line_size,
            line_buf: Vec::new(),
        })
    }

    /// Move to a new start position (used right after `open`)
    pub fn seek(&mut self, to: SeekTo) -> io::Result<()> {
        let size = self.size()?;
        self.offset = match to {
            SeekTo::End => size,
            SeekTo::Offset(offset) => offset.min(size),
        };
        self.reader.seek(SeekFrom::Start(self.offset))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn inode(&self) -> u64 {
        self.inode
    }

    /// Byte offset just past the last line returned
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Current size of the open file
    pub fn size(&self) -> io::Result<u64> {
        Ok(self.reader.get_ref().metadata()?.len())
    }

    /// Rewind to 0 if the file shrank below our offset
    ///
    /// Returns whether a truncation was detected.
    pub fn detect_truncation(&mut self) -> io::Result<bool> {
        let size = self.size()?;
        if size >= self.offset {
            return Ok(false);
        }

        tracing::warn!(
            path = %self.path.display(),
            offset = self.offset,
            size,
            "file truncated, rewinding to start"
        );
        self.offset = 0;
        self.reader.seek(SeekFrom::Start(0))?;
        Ok(true)
    }

    /// Read up to `limit` complete lines into `out`
    ///
    /// Returns the number of lines appended; 0 means nothing complete is
    /// available. A trailing fragment without `\n` is left unread and the
    /// offset stays in front of it.
    pub fn read_lines(&mut self, limit: usize, out: &mut Vec<String>) -> io::Result<usize> {
        let mut emitted = 0;

        while emitted < limit {
            self.line_buf.clear();
            let n = self.reader.read_until(b'\n', &mut self.line_buf)?;
            if n == 0 {
                break;
            }

            if self.line_buf.last() != Some(&b'\n') {
                // Writer is mid-line; come back for it
                self.reader.seek(SeekFrom::Start(self.offset))?;
                break;
            }

            self.offset += n as u64;
            if let Some(line) = self.take_line() {
                out.push(line);
                emitted += 1;
            }
        }

        Ok(emitted)
    }

    /// Read everything left, including a trailing fragment
    ///
    /// Used right before the handle is closed, when no more bytes will
    /// arrive through it.
    pub fn read_remaining(&mut self, out: &mut Vec<String>) -> io::Result<usize> {
        let mut emitted = 0;

        loop {
            self.line_buf.clear();
            let n = self.reader.read_until(b'\n', &mut self.line_buf)?;
            if n == 0 {
                break;
            }

            self.offset += n as u64;
            if let Some(line) = self.take_line() {
                out.push(line);
                emitted += 1;
            }
        }

        Ok(emitted)
    }

    /// Decode `line_buf` into a message, `None` for blank lines
    fn take_line(&mut self) -> Option<String> {
        let mut end = self.line_buf.len();
        if end > 0 && self.line_buf[end - 1] == b'\n' {
            end -= 1;
        }
        if end > 0 && self.line_buf[end - 1] == b'\r' {
            end -= 1;
        }
        if end == 0 {
            return None;
        }

        let mut line = String::from_utf8_lossy(&self.line_buf[..end]).into_owned();
        if line.len() > self.max_line_size {
            tracing::debug!(
                path = %self.path.display(),
                len = line.len(),
                max = self.max_line_size,
                "line truncated"
            );
            let mut cut = self.max_line_size;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            line.truncate(cut);
        }
        Some(line)
    }
}

#[cfg(unix)]
fn inode_of(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode_of(_meta: &Metadata) -> u64 {
    0
}

#[cfg(test)]
#[path = "cursor_test.rs"]
mod cursor_test;
