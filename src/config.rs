//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `SNAPLINK_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `SNAPLINK_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `SNAPLINK_TELEGRAM__BOT_TOKEN=...` sets the `telegram.bot_token` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use snaplink::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;
use uuid::Uuid;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "SNAPLINK_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Base URL where the service is publicly reachable (e.g., "https://snap.example.com").
    /// Used to build the capture links handed out by the bot and the sessions API.
    pub public_url: Url,
    /// Directory where received captures are written
    pub capture_dir: PathBuf,
    /// Maximum accepted size of an uploaded photo, in bytes
    pub max_upload_bytes: usize,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
    /// Capture session lifecycle configuration
    pub sessions: SessionsConfig,
    /// Telegram delivery and bot configuration. When absent, captures are only
    /// stored on disk and the bot conversation loop does not run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,
}

/// Capture session lifecycle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionsConfig {
    /// Validity window applied when a session is created without an explicit one
    #[serde(with = "humantime_serde")]
    pub default_validity: Duration,
    /// Shortest validity window a session may be created with
    #[serde(with = "humantime_serde")]
    pub min_validity: Duration,
    /// Longest validity window a session may be created with
    #[serde(with = "humantime_serde")]
    pub max_validity: Duration,
    /// How often the background reaper removes expired sessions
    #[serde(with = "humantime_serde")]
    pub reap_interval: Duration,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            default_validity: Duration::from_secs(10 * 60),
            min_validity: Duration::from_secs(60),
            max_validity: Duration::from_secs(120 * 60),
            reap_interval: Duration::from_secs(60),
        }
    }
}

impl SessionsConfig {
    /// Clamp a requested validity window into the configured bounds.
    pub fn clamp_validity(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.default_validity)
            .clamp(self.min_validity, self.max_validity)
    }
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot token issued by @BotFather
    pub bot_token: String,
    /// Chat that receives capture notifications and photos
    pub chat_id: String,
    /// Bot API base URL. Only overridden in tests.
    #[serde(default = "default_telegram_api_url")]
    pub api_url: Url,
    /// Long-poll timeout passed to getUpdates
    #[serde(default = "default_poll_timeout", with = "humantime_serde")]
    pub poll_timeout: Duration,
    /// Run the /startcapture conversation loop. Disable to keep delivery only.
    #[serde(default = "default_true")]
    pub enable_bot: bool,
}

fn default_telegram_api_url() -> Url {
    Url::parse("https://api.telegram.org").expect("static URL is valid")
}

fn default_poll_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_url: Url::parse("http://localhost:8080").expect("static URL is valid"),
            capture_dir: PathBuf::from("captures"),
            max_upload_bytes: 10 * 1024 * 1024,
            enable_otel_export: false,
            sessions: SessionsConfig::default(),
            telegram: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment, then validate it.
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("SNAPLINK_").split("__"))
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_upload_bytes == 0 {
            return Err(Error::Internal {
                operation: "validate config: max_upload_bytes must be greater than zero".to_string(),
            });
        }

        let s = &self.sessions;
        if s.min_validity > s.max_validity {
            return Err(Error::Internal {
                operation: "validate config: sessions.min_validity exceeds sessions.max_validity".to_string(),
            });
        }
        if s.default_validity < s.min_validity || s.default_validity > s.max_validity {
            return Err(Error::Internal {
                operation: "validate config: sessions.default_validity outside [min_validity, max_validity]".to_string(),
            });
        }
        if s.reap_interval.is_zero() {
            return Err(Error::Internal {
                operation: "validate config: sessions.reap_interval must be non-zero".to_string(),
            });
        }

        if let Some(telegram) = &self.telegram {
            if telegram.bot_token.is_empty() {
                return Err(Error::Internal {
                    operation: "validate config: telegram.bot_token is empty".to_string(),
                });
            }
            if telegram.chat_id.is_empty() {
                return Err(Error::Internal {
                    operation: "validate config: telegram.chat_id is empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Address the HTTP server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Absolute URL of the capture page for a session token.
    pub fn capture_url(&self, token: Uuid) -> String {
        format!("{}/capture/{}", self.public_url.as_str().trim_end_matches('/'), token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().expect("default config should validate");
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn loads_yaml_with_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                concat!(
                    "port: 9000\n",
                    "public_url: \"https://snap.example.com/\"\n",
                    "sessions:\n",
                    "  default_validity: 5m\n",
                    "  max_validity: 1h\n",
                    "telegram:\n",
                    "  bot_token: \"123:abc\"\n",
                    "  chat_id: \"42\"\n",
                ),
            )?;
            jail.set_env("SNAPLINK_PORT", "9001");
            jail.set_env("SNAPLINK_TELEGRAM__CHAT_ID", "99");

            let config = Config::load(&test_args("config.yaml"))?;
            assert_eq!(config.port, 9001);
            assert_eq!(config.sessions.default_validity, Duration::from_secs(300));
            assert_eq!(config.sessions.max_validity, Duration::from_secs(3600));

            let telegram = config.telegram.expect("telegram section present");
            assert_eq!(telegram.chat_id, "99");
            assert_eq!(telegram.bot_token, "123:abc");
            assert!(telegram.enable_bot);
            Ok(())
        });
    }

    #[test]
    fn rejects_inverted_validity_bounds() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                concat!(
                    "sessions:\n",
                    "  min_validity: 2h\n",
                    "  max_validity: 1h\n",
                    "  default_validity: 90m\n",
                ),
            )?;
            assert!(Config::load(&test_args("config.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn rejects_empty_bot_token() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                concat!("telegram:\n", "  bot_token: \"\"\n", "  chat_id: \"42\"\n"),
            )?;
            assert!(Config::load(&test_args("config.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn capture_url_handles_trailing_slash() {
        let mut config = Config::default();
        config.public_url = Url::parse("https://snap.example.com/").unwrap();
        let token = Uuid::nil();
        assert_eq!(
            config.capture_url(token),
            format!("https://snap.example.com/capture/{token}")
        );
    }

    #[test]
    fn clamps_requested_validity() {
        let sessions = SessionsConfig::default();
        assert_eq!(sessions.clamp_validity(None), sessions.default_validity);
        assert_eq!(sessions.clamp_validity(Some(Duration::from_secs(1))), sessions.min_validity);
        assert_eq!(
            sessions.clamp_validity(Some(Duration::from_secs(999_999))),
            sessions.max_validity
        );
    }
}
