//! Shared fixtures for handler-level tests.

use std::path::Path;
use std::time::Duration;

use axum_test::TestServer;

use crate::config::{Config, TelegramConfig};
use crate::{AppState, build_router};

/// Reqwest's rustls backend needs a process-level crypto provider; the binary
/// installs it in `main`, so tests that build HTTP clients must do it here.
pub(crate) fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

pub(crate) fn test_config(capture_dir: &Path) -> Config {
    Config {
        capture_dir: capture_dir.to_path_buf(),
        ..Config::default()
    }
}

pub(crate) fn test_state(capture_dir: &Path) -> AppState {
    AppState::new(test_config(capture_dir)).expect("failed to build test state")
}

/// State with Telegram delivery pointed at a mock Bot API server.
pub(crate) fn test_state_with_telegram(capture_dir: &Path, api_url: &str) -> AppState {
    install_crypto_provider();
    let mut config = test_config(capture_dir);
    config.telegram = Some(TelegramConfig {
        bot_token: "test-token".to_string(),
        chat_id: "42".to_string(),
        api_url: api_url.parse().expect("mock server URL is valid"),
        poll_timeout: Duration::from_secs(1),
        enable_bot: false,
    });
    AppState::new(config).expect("failed to build test state")
}

pub(crate) fn test_server(state: AppState) -> TestServer {
    TestServer::new(build_router(state)).expect("failed to create test server")
}
