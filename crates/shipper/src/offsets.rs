//! Durable read offsets
//!
//! A small JSON map from inode to the last fully shipped byte offset,
//! written to a temporary file and renamed over the old one so a crash
//! never leaves a half-written map behind.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ShipperError;
use crate::tailer::CursorPosition;

/// Offset saved for one inode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedOffset {
    pub path: PathBuf,
    pub offset: u64,
}

/// Saved offsets keyed by inode
pub type OffsetMap = HashMap<u64, SavedOffset>;

#[derive(Debug, Clone)]
pub struct OffsetStore {
    path: PathBuf,
}

impl OffsetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved map; a missing file is an empty map
    pub fn load(&self) -> Result<OffsetMap, ShipperError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(OffsetMap::new()),
            Err(source) => {
                return Err(ShipperError::OffsetStore {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(OffsetMap::new());
        }

        // JSON object keys are strings
        let raw: HashMap<String, SavedOffset> =
            serde_json::from_str(&content).map_err(|source| ShipperError::OffsetFormat {
                path: self.path.clone(),
                source,
            })?;

        let mut offsets = OffsetMap::with_capacity(raw.len());
        for (key, saved) in raw {
            match key.parse::<u64>() {
                Ok(inode) => {
                    offsets.insert(inode, saved);
                }
                Err(_) => {
                    tracing::warn!(path = %self.path.display(), key = %key, "ignoring bad inode key");
                }
            }
        }
        Ok(offsets)
    }

    /// Replace the saved map with `positions`
    pub fn save(&self, positions: &[CursorPosition]) -> Result<(), ShipperError> {
        let map: HashMap<String, SavedOffset> = positions
            .iter()
            .map(|p| {
                (
                    p.inode.to_string(),
                    SavedOffset {
                        path: p.path.clone(),
                        offset: p.offset,
                    },
                )
            })
            .collect();

        let json = serde_json::to_vec_pretty(&map).map_err(|source| ShipperError::OffsetFormat {
            path: self.path.clone(),
            source,
        })?;

        let io_err = |source| ShipperError::OffsetStore {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;

        tracing::debug!(path = %self.path.display(), files = positions.len(), "offsets saved");
        Ok(())
    }
}
