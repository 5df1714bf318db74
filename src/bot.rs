//! Telegram bot conversation for issuing capture links.
//!
//! The operator sends `/startcapture` to the bot, picks a camera facing from a
//! reply keyboard, answers with a validity window in minutes, and receives the
//! capture URL. Conversation state is held per chat and survives interleaved
//! chatter from other chats. `/cancel` aborts a running dialogue.

use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::sessions::{CameraFacing, SessionStore};
use crate::telegram::{ReplyKeyboardMarkup, TelegramClient};

/// Where a chat currently is in the /startcapture dialogue.
#[derive(Debug, Clone, Copy)]
enum Step {
    AwaitingCamera,
    AwaitingValidity { camera: CameraFacing },
}

/// Outgoing bot reply, decoupled from the transport for testability.
#[derive(Debug)]
pub(crate) struct Reply {
    pub text: String,
    pub keyboard: Option<ReplyKeyboardMarkup>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            keyboard: None,
        }
    }

    fn with_camera_keyboard(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            keyboard: Some(ReplyKeyboardMarkup::one_time(&[&["user", "environment"]])),
        }
    }
}

/// Per-chat dialogue state machine.
pub(crate) struct Dialogues {
    steps: DashMap<i64, Step>,
}

impl Dialogues {
    pub(crate) fn new() -> Self {
        Self { steps: DashMap::new() }
    }

    /// Advance the dialogue for one incoming message. Returns the reply to
    /// send, or `None` when the message is unrelated chatter.
    pub(crate) fn respond(&self, chat_id: i64, text: &str, sessions: &SessionStore, config: &Config) -> Option<Reply> {
        let text = text.trim();

        match text {
            "/startcapture" => {
                self.steps.insert(chat_id, Step::AwaitingCamera);
                return Some(Reply::with_camera_keyboard(
                    "Which camera should the capture link request? (user = front, environment = rear)",
                ));
            }
            "/cancel" => {
                self.steps.remove(&chat_id);
                return Some(Reply::text("Cancelled."));
            }
            _ => {}
        }

        let step = *self.steps.get(&chat_id)?;
        match step {
            Step::AwaitingCamera => match text.parse::<CameraFacing>() {
                Ok(camera) => {
                    self.steps.insert(chat_id, Step::AwaitingValidity { camera });
                    Some(Reply::text("How many minutes should the link stay valid? (e.g. 10)"))
                }
                Err(()) => Some(Reply::with_camera_keyboard("Please answer 'user' or 'environment'.")),
            },
            Step::AwaitingValidity { camera } => {
                let min_minutes = config.sessions.min_validity.as_secs().div_ceil(60).max(1);
                let max_minutes = config.sessions.max_validity.as_secs() / 60;

                let minutes = match text.parse::<u64>() {
                    Ok(m) => m,
                    Err(_) => return Some(Reply::text("Please send a whole number of minutes.")),
                };
                if minutes < min_minutes || minutes > max_minutes {
                    return Some(Reply::text(format!(
                        "Please choose between {min_minutes} and {max_minutes} minutes."
                    )));
                }

                let session = sessions.create(camera, Some(Duration::from_secs(minutes * 60)));
                self.steps.remove(&chat_id);
                Some(Reply::text(format!(
                    "Capture link (valid for {minutes} minutes):\n{}",
                    config.capture_url(session.token)
                )))
            }
        }
    }
}

/// Long-poll `getUpdates` and drive the dialogue until shutdown.
///
/// Transport failures are logged and retried after a short backoff; the loop
/// only exits on cancellation.
pub async fn run_bot(client: TelegramClient, sessions: SessionStore, config: Config, shutdown: CancellationToken) {
    let dialogues = Dialogues::new();
    let mut offset: Option<i64> = None;

    tracing::info!("Starting Telegram bot conversation loop");

    loop {
        let updates = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Telegram bot shutting down");
                return;
            }
            result = client.get_updates(offset) => match result {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!(error = %e, "getUpdates failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(5)) => continue,
                        _ = shutdown.cancelled() => return,
                    }
                }
            }
        };

        for update in updates {
            offset = Some(offset.map_or(update.update_id + 1, |o| o.max(update.update_id + 1)));

            let Some(message) = update.message else { continue };
            let Some(text) = message.text.as_deref() else { continue };

            if let Some(reply) = dialogues.respond(message.chat.id, text, &sessions, &config) {
                let chat_id = message.chat.id.to_string();
                if let Err(e) = client.send_message(&chat_id, &reply.text, reply.keyboard.as_ref()).await {
                    tracing::warn!(chat_id = %chat_id, error = %e, "Failed to send bot reply");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, TelegramConfig};
    use crate::sessions::SessionLookup;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fixtures() -> (Dialogues, SessionStore, Config) {
        let config = Config::default();
        let sessions = SessionStore::new(config.sessions.clone());
        (Dialogues::new(), sessions, config)
    }

    fn extract_token(reply: &Reply, config: &Config) -> uuid::Uuid {
        let prefix = format!("{}/capture/", config.public_url.as_str().trim_end_matches('/'));
        let url = reply.text.lines().last().unwrap();
        url.strip_prefix(&prefix).unwrap().parse().unwrap()
    }

    #[test]
    fn full_dialogue_creates_session_and_replies_with_link() {
        let (dialogues, sessions, config) = fixtures();

        let reply = dialogues.respond(42, "/startcapture", &sessions, &config).unwrap();
        assert!(reply.keyboard.is_some());

        let reply = dialogues.respond(42, "environment", &sessions, &config).unwrap();
        assert!(reply.text.contains("minutes"));

        let reply = dialogues.respond(42, "10", &sessions, &config).unwrap();
        assert!(reply.text.contains("/capture/"));

        let token = extract_token(&reply, &config);
        match sessions.get(token) {
            SessionLookup::Live(session) => {
                assert_eq!(session.camera, CameraFacing::Environment);
                let lifetime = (session.expires_at - session.created_at).to_std().unwrap();
                assert_eq!(lifetime, Duration::from_secs(600));
            }
            other => panic!("expected live session, got {other:?}"),
        }
    }

    #[test]
    fn invalid_camera_reprompts_with_keyboard() {
        let (dialogues, sessions, config) = fixtures();
        dialogues.respond(42, "/startcapture", &sessions, &config);

        let reply = dialogues.respond(42, "selfie", &sessions, &config).unwrap();
        assert!(reply.keyboard.is_some());
        assert!(reply.text.contains("'user' or 'environment'"));

        // The dialogue is still waiting for a camera.
        let reply = dialogues.respond(42, "user", &sessions, &config).unwrap();
        assert!(reply.text.contains("minutes"));
    }

    #[test]
    fn out_of_bounds_minutes_reprompt() {
        let (dialogues, sessions, config) = fixtures();
        dialogues.respond(42, "/startcapture", &sessions, &config);
        dialogues.respond(42, "user", &sessions, &config);

        let reply = dialogues.respond(42, "0", &sessions, &config).unwrap();
        assert!(reply.text.contains("between"));
        let reply = dialogues.respond(42, "100000", &sessions, &config).unwrap();
        assert!(reply.text.contains("between"));
        let reply = dialogues.respond(42, "not-a-number", &sessions, &config).unwrap();
        assert!(reply.text.contains("whole number"));

        assert!(sessions.is_empty());
    }

    #[test]
    fn cancel_aborts_dialogue() {
        let (dialogues, sessions, config) = fixtures();
        dialogues.respond(42, "/startcapture", &sessions, &config);

        let reply = dialogues.respond(42, "/cancel", &sessions, &config).unwrap();
        assert_eq!(reply.text, "Cancelled.");

        // After cancelling, a camera answer is plain chatter.
        assert!(dialogues.respond(42, "user", &sessions, &config).is_none());
    }

    #[test]
    fn chatter_without_dialogue_is_ignored() {
        let (dialogues, sessions, config) = fixtures();
        assert!(dialogues.respond(42, "hello bot", &sessions, &config).is_none());
        assert!(sessions.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn run_bot_acknowledges_updates_and_stops_on_shutdown() {
        let server = MockServer::start().await;

        // Polls after the first batch must acknowledge the highest update_id.
        // Mounted first so it takes precedence once the offset is present.
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .and(body_string_contains("\"offset\":8"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": true, "result": []}))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1..)
            .mount(&server)
            .await;

        // First poll carries no offset and delivers two updates out of order.
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": [
                    {"update_id": 7, "message": {"chat": {"id": 42}, "text": "/startcapture"}},
                    {"update_id": 3, "message": null}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        crate::test_utils::install_crypto_provider();
        let config = Config::default();
        let sessions = SessionStore::new(config.sessions.clone());
        let client = TelegramClient::new(&TelegramConfig {
            bot_token: "123:abc".to_string(),
            chat_id: "42".to_string(),
            api_url: server.uri().parse().unwrap(),
            poll_timeout: Duration::from_secs(1),
            enable_bot: true,
        })
        .unwrap();

        let shutdown = CancellationToken::new();
        let bot = tokio::spawn(run_bot(client, sessions, config, shutdown.clone()));

        // Let the loop consume the batch and poll again with the advanced offset.
        tokio::time::sleep(Duration::from_millis(500)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(2), bot)
            .await
            .expect("bot loop should stop on cancellation")
            .unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn run_bot_retries_after_transport_errors() {
        // Nothing is listening on this address, so every poll fails at the
        // transport level. The loop must keep retrying and still honor
        // cancellation during the backoff sleep.
        crate::test_utils::install_crypto_provider();
        let config = Config::default();
        let sessions = SessionStore::new(config.sessions.clone());
        let client = TelegramClient::new(&TelegramConfig {
            bot_token: "123:abc".to_string(),
            chat_id: "42".to_string(),
            api_url: "http://127.0.0.1:9".parse().unwrap(),
            poll_timeout: Duration::from_secs(1),
            enable_bot: true,
        })
        .unwrap();

        let shutdown = CancellationToken::new();
        let bot = tokio::spawn(run_bot(client, sessions, config, shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!bot.is_finished(), "loop should survive transport errors");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), bot)
            .await
            .expect("bot loop should stop on cancellation")
            .unwrap();
    }

    #[test]
    fn dialogues_are_isolated_per_chat() {
        let (dialogues, sessions, config) = fixtures();
        dialogues.respond(1, "/startcapture", &sessions, &config);
        dialogues.respond(2, "/startcapture", &sessions, &config);

        dialogues.respond(1, "user", &sessions, &config);
        // Chat 2 is still on the camera question.
        let reply = dialogues.respond(2, "7", &sessions, &config).unwrap();
        assert!(reply.text.contains("'user' or 'environment'"));
    }
}
