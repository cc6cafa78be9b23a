//! Watermark store: the latest timestamp already emitted per stream
//!
//! Persisted as YAML under a single `positions` key:
//!
//! ```yaml
//! positions:
//!   vulns: 2024-01-02T03:04:05Z
//! ```

use crate::error::PositionsError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Stream name -> latest emitted timestamp
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTable {
    #[serde(default)]
    positions: BTreeMap<String, DateTime<Utc>>,
}

impl PositionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stream: &str) -> Option<DateTime<Utc>> {
        self.positions.get(stream).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DateTime<Utc>)> {
        self.positions.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// True if a record at `timestamp` was already emitted for `stream`
    pub fn covers(&self, stream: &str, timestamp: DateTime<Utc>) -> bool {
        self.get(stream).is_some_and(|mark| timestamp <= mark)
    }

    /// Return the table with `stream` moved forward to `candidate`
    ///
    /// The watermark only ever moves forward: a candidate at or before the
    /// current value leaves the table unchanged.
    pub fn advanced(mut self, stream: &str, candidate: DateTime<Utc>) -> Self {
        if !self.covers(stream, candidate) {
            self.positions.insert(stream.to_string(), candidate);
        }
        self
    }

    /// Load the table from `path`; a missing file yields an empty table
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PositionsError> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("no positions file at {}, starting empty", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(PositionsError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&text).map_err(|source| PositionsError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the table to `path`, keeping the previous file as `<path>.bak`
    ///
    /// Failing to create the backup is logged and otherwise ignored.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PositionsError> {
        let path = path.as_ref();
        let text = serde_yaml::to_string(self).map_err(PositionsError::Encode)?;

        let backup = backup_path(path);
        match fs::rename(path, &backup) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("couldn't back up {} to {}: {e}", path.display(), backup.display()),
        }

        fs::write(path, text).map_err(|source| PositionsError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("saved {} positions to {}", self.len(), path.display());
        Ok(())
    }
}

/// `<path>.bak`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}
