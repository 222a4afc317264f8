//! Single-slot cache of the last bandwidth measurement.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Nothing has been stored yet.
    #[error("no cached bandwidth measurement at {}", .path.display())]
    Miss { path: PathBuf },

    #[error("cache I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed cache file {}: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Last measured bandwidth, in Mbit/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandwidthCacheEntry {
    pub speed_down: f64,
    pub speed_up: f64,
}

/// File-backed single-slot cache.
///
/// Runs are serialized by the external scheduler, so there is no locking.
#[derive(Debug, Clone)]
pub struct BandwidthCache {
    path: PathBuf,
}

impl BandwidthCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True iff a fresh measurement is due at `now`: the minute is a
    /// multiple of `frequency_minutes`. A zero frequency never refreshes.
    pub fn should_refresh(now: &impl Timelike, frequency_minutes: u32) -> bool {
        frequency_minutes != 0 && now.minute() % frequency_minutes == 0
    }

    /// Read the cached entry.
    pub fn load(&self) -> Result<BandwidthCacheEntry, CacheError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheError::Miss {
                    path: self.path.clone(),
                });
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| CacheError::Format {
            path: self.path.clone(),
            source,
        })
    }

    /// Overwrite the cached entry.
    ///
    /// Writes a sibling temp file and renames it over the cache, so a
    /// crashed run never leaves a truncated file behind.
    pub fn store(&self, entry: &BandwidthCacheEntry) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        {
            let file = std::fs::File::create(&tmp).map_err(io_err)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, entry).map_err(|source| CacheError::Format {
                path: tmp.clone(),
                source,
            })?;
            writer.flush().map_err(io_err)?;
        }
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;

        tracing::debug!(
            path = %self.path.display(),
            down = entry.speed_down,
            up = entry.speed_up,
            "Stored bandwidth measurement"
        );
        Ok(())
    }
}
