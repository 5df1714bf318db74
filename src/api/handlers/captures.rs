//! Handlers for the capture page and the photo upload endpoint.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    response::Html,
};
use uuid::Uuid;

use crate::AppState;
use crate::api::models::captures::UploadResponse;
use crate::errors::{Error, Result};
use crate::sessions::SessionLookup;
use crate::storage::StoredCapture;

/// Render the capture page for a live session token.
///
/// Unknown tokens (including unparseable ones) are 404; tokens whose validity
/// window has passed are 410 and the session entry is dropped.
pub async fn capture_page(State(state): State<AppState>, Path(token): Path<String>) -> Result<Html<String>> {
    let not_found = || Error::NotFound {
        resource: "Capture link".to_string(),
        id: token.clone(),
    };

    let token_id: Uuid = token.parse().map_err(|_| not_found())?;

    match state.sessions.get(token_id) {
        SessionLookup::Live(session) => Ok(Html(state.render_capture_page(&session)?)),
        SessionLookup::Expired => Err(Error::Gone {
            message: "This capture link has expired".to_string(),
        }),
        SessionLookup::Unknown => Err(not_found()),
    }
}

/// Receive one captured photo as a multipart form with a single `photo` field.
///
/// The image is stored on disk first; Telegram delivery happens afterwards and
/// is best-effort, so a delivery failure never loses the capture or fails the
/// request.
pub async fn upload_photo(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<UploadResponse>> {
    let mut photo: Option<axum::body::Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| Error::BadRequest {
        message: format!("Failed to parse multipart data: {e}"),
    })? {
        match field.name().unwrap_or("") {
            "photo" => {
                photo = Some(field.bytes().await.map_err(|e| Error::BadRequest {
                    message: format!("Failed to read photo field: {e}"),
                })?);
            }
            _ => {
                // Ignore unknown fields (forward compatibility)
            }
        }
    }

    let photo = photo.ok_or_else(|| Error::BadRequest {
        message: "Missing required field: 'photo'".to_string(),
    })?;
    if photo.is_empty() {
        return Err(Error::BadRequest {
            message: "Photo cannot be empty".to_string(),
        });
    }

    let stored = state.captures.save(&photo).await?;

    if let Some(telegram) = &state.telegram {
        deliver_capture(telegram, &stored, photo.to_vec()).await;
    }

    Ok(Json(UploadResponse {
        status: "ok".to_string(),
        filename: stored.filename,
        size_bytes: stored.size_bytes,
    }))
}

/// Forward a stored capture to the configured Telegram chat. Failures are
/// logged and swallowed: the capture is already on disk.
async fn deliver_capture(telegram: &crate::telegram::TelegramClient, stored: &StoredCapture, bytes: Vec<u8>) {
    let chat_id = telegram.notify_chat_id().to_string();
    let notice = format!("New capture received: {}", stored.filename);

    if let Err(e) = telegram.send_message(&chat_id, &notice, None).await {
        tracing::warn!(filename = %stored.filename, error = %e, "Failed to send capture notice");
    }

    match telegram.send_photo(&chat_id, &stored.filename, bytes, None).await {
        Ok(()) => tracing::info!(filename = %stored.filename, "Delivered capture to Telegram"),
        Err(e) => tracing::warn!(filename = %stored.filename, error = %e, "Failed to deliver capture photo"),
    }
}
