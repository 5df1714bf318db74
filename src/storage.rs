//! Capture persistence.
//!
//! Received photos are written to a flat directory with timestamped names.
//! Uploads are stored before any delivery attempt, so a Telegram outage never
//! loses a capture.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use crate::errors::{Error, Result};

/// Metadata for a capture written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct StoredCapture {
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Writes captures into a single directory. Cheap to clone.
#[derive(Clone)]
pub struct CaptureStore {
    dir: PathBuf,
}

impl CaptureStore {
    /// Open (and create if needed) the capture directory.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| Error::Internal {
            operation: format!("create capture directory {}: {e}", dir.display()),
        })?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one capture. The filename embeds the receive time down to
    /// nanoseconds so concurrent uploads never collide.
    pub async fn save(&self, bytes: &[u8]) -> Result<StoredCapture> {
        let filename = format!("capture_{}.jpg", Utc::now().format("%Y%m%d_%H%M%S_%f"));
        let path = self.dir.join(&filename);

        tokio::fs::write(&path, bytes).await.map_err(|e| Error::Internal {
            operation: format!("write capture {}: {e}", path.display()),
        })?;

        tracing::info!(filename = %filename, size_bytes = bytes.len(), "Stored capture");

        Ok(StoredCapture {
            filename,
            path,
            size_bytes: bytes.len() as u64,
        })
    }
}
