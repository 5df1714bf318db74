//! In-memory capture session store.
//!
//! A capture session is an expiring, tokenized invitation to open the capture
//! page. Sessions only exist in memory: restarting the service invalidates all
//! outstanding links. A background reaper removes expired entries so the map
//! does not grow unbounded when links are never opened.

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SessionsConfig;

/// Which device camera the capture page should request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    /// Front camera (selfie)
    User,
    /// Rear camera
    Environment,
}

impl fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraFacing::User => write!(f, "user"),
            CameraFacing::Environment => write!(f, "environment"),
        }
    }
}

impl std::str::FromStr for CameraFacing {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "user" => Ok(CameraFacing::User),
            "environment" => Ok(CameraFacing::Environment),
            _ => Err(()),
        }
    }
}

/// A single expiring capture link.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureSession {
    pub token: Uuid,
    pub camera: CameraFacing,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CaptureSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Outcome of a token lookup.
#[derive(Debug, Clone)]
pub enum SessionLookup {
    Live(CaptureSession),
    Expired,
    Unknown,
}

/// Shared handle to the session map. Cheap to clone.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<Uuid, CaptureSession>>,
    config: SessionsConfig,
}

impl SessionStore {
    pub fn new(config: SessionsConfig) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Create a session. The validity window is clamped into the configured bounds.
    pub fn create(&self, camera: CameraFacing, valid_for: Option<Duration>) -> CaptureSession {
        let valid_for = self.config.clamp_validity(valid_for);
        let now = Utc::now();
        let session = CaptureSession {
            token: Uuid::new_v4(),
            camera,
            created_at: now,
            expires_at: now + chrono::Duration::from_std(valid_for).unwrap_or(chrono::Duration::zero()),
        };
        self.sessions.insert(session.token, session.clone());
        tracing::info!(token = %session.token, camera = %session.camera, expires_at = %session.expires_at, "Created capture session");
        session
    }

    /// Look up a token. Expired entries are removed as a side effect, matching
    /// the behavior callers need: an expired link is Gone, not Not Found.
    pub fn get(&self, token: Uuid) -> SessionLookup {
        let now = Utc::now();
        match self.sessions.get(&token) {
            Some(entry) if entry.is_expired_at(now) => {
                drop(entry);
                self.sessions.remove(&token);
                tracing::debug!(token = %token, "Capture session expired");
                SessionLookup::Expired
            }
            Some(entry) => SessionLookup::Live(entry.value().clone()),
            None => SessionLookup::Unknown,
        }
    }

    /// Remove a session. Returns the removed session if it existed.
    pub fn revoke(&self, token: Uuid) -> Option<CaptureSession> {
        self.sessions.remove(&token).map(|(_, session)| session)
    }

    /// Snapshot of all live sessions, most recently created first.
    pub fn live_sessions(&self) -> Vec<CaptureSession> {
        let now = Utc::now();
        let mut live: Vec<CaptureSession> = self
            .sessions
            .iter()
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.value().clone())
            .collect();
        live.sort_by_key(|s| std::cmp::Reverse(s.created_at));
        live
    }

    /// Remove every expired session. Returns how many were removed.
    pub fn reap_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Replace a session entry directly, bypassing validity clamping.
    #[cfg(test)]
    pub(crate) fn insert_for_test(&self, session: CaptureSession) {
        self.sessions.insert(session.token, session);
    }
}

/// Periodically remove expired sessions until shutdown is signalled.
pub async fn run_session_reaper(store: SessionStore, interval: Duration, shutdown: CancellationToken) {
    tracing::info!(interval = ?interval, "Starting session reaper");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.cancelled() => {
                tracing::info!("Session reaper shutting down");
                return;
            }
        }

        let removed = store.reap_expired();
        if removed > 0 {
            tracing::info!(removed, remaining = store.len(), "Reaped expired capture sessions");
        }
    }
}
