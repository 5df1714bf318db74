//! # snaplink: one-shot webcam capture links
//!
//! `snaplink` is a small self-hosted service for collecting a single webcam
//! photo from a browser. An operator creates an expiring capture link (via the
//! bundled Telegram bot or the JSON sessions API), sends it to the subject,
//! and the capture page does the rest: it asks for camera permission, shows a
//! live preview, waits three seconds, grabs one still frame and uploads it.
//! The service stores the photo on disk and forwards it to a Telegram chat.
//!
//! ## Request Flow
//!
//! `GET /capture/{token}` renders the capture page for a live session (404 for
//! unknown tokens, 410 once the validity window has passed). The page loads
//! the embedded capture script, which performs exactly one capture-and-upload
//! cycle per page load and reports progress through a status line. The
//! resulting photo arrives at `POST /upload` as a multipart form with a single
//! `photo` field; it is written to the capture directory before any delivery
//! attempt, so a Telegram outage never loses a capture.
//!
//! Sessions live in memory only. A background reaper drops expired entries,
//! and the optional bot loop long-polls the Telegram API to drive the
//! `/startcapture` conversation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use snaplink::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = snaplink::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     snaplink::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config)?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await
//! }
//! ```

pub mod api;
pub mod bot;
pub mod config;
pub mod errors;
pub mod sessions;
mod static_assets;
pub mod storage;
pub mod telegram;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_utils;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};

pub use config::Config;

use crate::errors::{Error, Result};
use crate::sessions::{CaptureSession, SessionStore};
use crate::storage::CaptureStore;
use crate::telegram::TelegramClient;

/// Application state shared across all request handlers.
///
/// Holds the session store, the capture directory handle, the optional
/// Telegram client, and the compiled page templates. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub captures: CaptureStore,
    pub telegram: Option<TelegramClient>,
    templates: Arc<minijinja::Environment<'static>>,
}

impl AppState {
    /// Build the full application state from configuration.
    pub fn new(config: Config) -> Result<Self> {
        let captures = CaptureStore::new(&config.capture_dir)?;
        let sessions = SessionStore::new(config.sessions.clone());
        let telegram = config.telegram.as_ref().map(TelegramClient::new).transpose()?;

        Ok(Self {
            config,
            sessions,
            captures,
            telegram,
            templates: Arc::new(build_templates()?),
        })
    }

    /// Render the capture page for a live session.
    pub fn render_capture_page(&self, session: &CaptureSession) -> Result<String> {
        let template = self.templates.get_template("capture").map_err(|e| Error::Internal {
            operation: format!("load capture template: {e}"),
        })?;

        template
            .render(minijinja::context! {
                camera => session.camera.to_string(),
                expires_at => session.expires_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            })
            .map_err(|e| Error::Internal {
                operation: format!("render capture page: {e}"),
            })
    }
}

fn build_templates() -> Result<minijinja::Environment<'static>> {
    let mut env = minijinja::Environment::new();
    env.add_template("capture", include_str!("../templates/capture.html"))
        .map_err(|e| Error::Internal {
            operation: format!("compile capture template: {e}"),
        })?;
    Ok(env)
}

/// Build the application router with all endpoints and middleware.
///
/// - `GET /capture/{token}` - per-session capture page
/// - `POST /upload` - multipart photo upload (body-limited)
/// - `/api/v1/sessions` - session management API
/// - `GET /healthz` - liveness
/// - fallback - embedded static assets (demo page + capture script)
pub fn build_router(state: AppState) -> Router {
    let upload_routes = Router::new().route(
        "/upload",
        post(api::handlers::captures::upload_photo).layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
    );

    let session_routes = Router::new()
        .route(
            "/sessions",
            post(api::handlers::sessions::create_session).get(api::handlers::sessions::list_sessions),
        )
        .route("/sessions/{token}", delete(api::handlers::sessions::revoke_session));

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/capture/{token}", get(api::handlers::captures::capture_page))
        .merge(upload_routes)
        .nest("/api/v1", session_routes)
        .fallback(api::handlers::static_assets::serve_embedded_asset)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Container for background tasks and their lifecycle.
///
/// When dropped, the `drop_guard` cancels the shutdown token, signalling all
/// tasks to stop.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: tokio_util::sync::CancellationToken,
    pub drop_guard: Option<tokio_util::sync::DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// Spawn the session reaper and, when configured, the Telegram bot loop.
fn setup_background_services(state: &AppState, shutdown_token: tokio_util::sync::CancellationToken) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    let reaper = sessions::run_session_reaper(
        state.sessions.clone(),
        state.config.sessions.reap_interval,
        shutdown_token.clone(),
    );
    background_tasks.push(tokio::spawn(reaper));

    match (&state.telegram, &state.config.telegram) {
        (Some(client), Some(telegram_config)) if telegram_config.enable_bot => {
            let bot = bot::run_bot(
                client.clone(),
                state.sessions.clone(),
                state.config.clone(),
                shutdown_token.clone(),
            );
            background_tasks.push(tokio::spawn(bot));
        }
        (Some(_), _) => info!("Telegram bot conversation disabled; delivery only"),
        (None, _) => info!("Telegram not configured; captures are stored on disk only"),
    }

    BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] builds the state, router and background
///    services.
/// 2. **Serve**: [`Application::serve`] binds the TCP port and handles
///    requests until the shutdown future resolves.
/// 3. **Shutdown**: background tasks are stopped and telemetry is flushed.
pub struct Application {
    router: Router,
    config: Config,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting snaplink with configuration: {:#?}", config);

        let state = AppState::new(config.clone())?;
        let shutdown_token = tokio_util::sync::CancellationToken::new();
        let bg_services = setup_background_services(&state, shutdown_token);
        let router = build_router(state);

        Ok(Self {
            router,
            config,
            bg_services,
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "snaplink listening on http://{}, capture links served from {}",
            bind_addr, self.config.public_url
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Stop the reaper and bot loop before flushing telemetry
        self.bg_services.shutdown().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
