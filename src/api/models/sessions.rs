use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sessions::{CameraFacing, CaptureSession};

/// Request body for creating a capture session.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionCreateRequest {
    /// Camera facing the capture page should request
    #[serde(default = "default_camera")]
    pub camera: CameraFacing,
    /// Validity window, e.g. "10m". Clamped into the configured bounds;
    /// omitted means the configured default.
    #[serde(default, with = "humantime_serde::option")]
    pub valid_for: Option<Duration>,
}

fn default_camera() -> CameraFacing {
    CameraFacing::User
}

/// A capture session as returned by the sessions API.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: Uuid,
    pub camera: CameraFacing,
    pub capture_url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionResponse {
    pub fn from_session(session: &CaptureSession, capture_url: String) -> Self {
        Self {
            token: session.token,
            camera: session.camera,
            capture_url,
            created_at: session.created_at,
            expires_at: session.expires_at,
        }
    }
}
