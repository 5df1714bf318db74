use serde::{Deserialize, Serialize};

/// Response body for a stored upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: String,
    pub filename: String,
    pub size_bytes: u64,
}
