//! Minimal Telegram Bot API client.
//!
//! Covers the three methods the service needs: `sendMessage` for capture
//! notices and bot replies, `sendPhoto` for delivering the captured image, and
//! `getUpdates` for the long-polling conversation loop. The base URL is
//! configurable so tests can point the client at a mock server.

use std::time::Duration;

use reqwest::multipart;
use serde::{Deserialize, Serialize};

use crate::config::TelegramConfig;
use crate::errors::{Error, Result};

/// Envelope every Bot API method responds with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// One entry from `getUpdates`.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Custom reply keyboard shown to the operator during the bot conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyKeyboardMarkup {
    keyboard: Vec<Vec<KeyboardButton>>,
    one_time_keyboard: bool,
}

#[derive(Debug, Clone, Serialize)]
struct KeyboardButton {
    text: String,
}

impl ReplyKeyboardMarkup {
    /// One-time keyboard from rows of button labels.
    pub fn one_time(rows: &[&[&str]]) -> Self {
        Self {
            keyboard: rows
                .iter()
                .map(|row| row.iter().map(|text| KeyboardButton { text: (*text).to_string() }).collect())
                .collect(),
            one_time_keyboard: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a ReplyKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
}

/// HTTP client for one bot token. Cheap to clone.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build().map_err(|e| Error::Internal {
            operation: format!("build Telegram HTTP client: {e}"),
        })?;

        Ok(Self {
            http,
            base_url: config.api_url.as_str().trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            poll_timeout: config.poll_timeout,
        })
    }

    /// Chat that receives capture notifications.
    pub fn notify_chat_id(&self) -> &str {
        &self.chat_id
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.bot_token, method)
    }

    /// Send a plain text message, optionally with a reply keyboard.
    pub async fn send_message(&self, chat_id: &str, text: &str, keyboard: Option<&ReplyKeyboardMarkup>) -> Result<()> {
        let request = SendMessageRequest {
            chat_id,
            text,
            reply_markup: keyboard,
        };

        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        Self::check::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// Deliver a photo as a multipart upload with an optional caption.
    pub async fn send_photo(&self, chat_id: &str, filename: &str, bytes: Vec<u8>, caption: Option<&str>) -> Result<()> {
        let photo = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("image/jpeg")
            .map_err(|e| Error::Telegram {
                message: format!("build photo part: {e}"),
            })?;

        let mut form = multipart::Form::new().text("chat_id", chat_id.to_string()).part("photo", photo);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }

        let response = self
            .http
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        Self::check::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// Long-poll for updates after `offset`. Blocks up to the configured poll
    /// timeout on the server side.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        let request = GetUpdatesRequest {
            timeout: self.poll_timeout.as_secs(),
            offset,
        };

        let response = self
            .http
            .post(self.method_url("getUpdates"))
            // Client-side timeout must outlast the server-side long poll.
            .timeout(self.poll_timeout + Duration::from_secs(10))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let updates = Self::check::<Vec<Update>>(response).await?;
        Ok(updates.unwrap_or_default())
    }

    /// Decode the Bot API envelope, turning `ok=false` into an error.
    async fn check<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<Option<T>> {
        let status = response.status();
        let body: ApiResponse<T> = response.json().await.map_err(|e| Error::Telegram {
            message: format!("decode response (HTTP {status}): {e}"),
        })?;

        if !body.ok {
            return Err(Error::Telegram {
                message: body.description.unwrap_or_else(|| format!("HTTP {status}")),
            });
        }
        Ok(body.result)
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::Telegram {
        message: format!("request failed: {e}"),
    }
}
