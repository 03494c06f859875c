//! Telegram-specific error handling
//!
//! Maps teloxide errors onto [`FetchError`] so the executor knows which
//! failures are worth another attempt.

use std::fmt::Display;

use teloxide::{ApiError, RequestError};
use tracing::{debug, warn};
use transfer_core::FetchError;

/// Classify a failed Bot API request made while fetching a file.
pub fn classify_request(err: &RequestError) -> FetchError {
    match err {
        // ── Flood control ────────────────────────────────────────────────────
        RequestError::RetryAfter(secs) => {
            warn!("Flood control while fetching file: retry after {:?}", secs.duration());
            FetchError::transient(format!(
                "Flood control exceeded, retry after {}s",
                secs.duration().as_secs()
            ))
        }

        // ── Network / I/O ────────────────────────────────────────────────────
        RequestError::Network(_) => {
            debug!("Network error while fetching file: {}", err);
            FetchError::transient(err.to_string())
        }

        RequestError::Io(_) => {
            debug!("I/O error while fetching file: {}", err);
            FetchError::transient(err.to_string())
        }

        // ── Invalid JSON ─────────────────────────────────────────────────────
        RequestError::InvalidJson { raw, .. } => {
            warn!("Invalid JSON while fetching file: {}", raw);
            FetchError::transient(format!("Invalid JSON response: {}", raw))
        }

        // ── Chat migration ───────────────────────────────────────────────────
        RequestError::MigrateToChatId(new_id) => {
            FetchError::permanent(format!("Chat migrated to {}", new_id.0))
        }

        // ── Telegram API errors ──────────────────────────────────────────────
        RequestError::Api(api_err) => classify_api(api_err),
    }
}

fn classify_api(api_err: &ApiError) -> FetchError {
    let message = match api_err {
        ApiError::WrongFileId | ApiError::FileIdInvalid => "Wrong file ID".to_string(),
        ApiError::RequestEntityTooLarge => "File is too big".to_string(),
        ApiError::InvalidToken => "Bot token is invalid".to_string(),
        ApiError::Unknown(raw) => format!("Telegram API error: {}", raw),
        other => format!("Telegram API error: {}", other),
    };
    warn!("Permanent Telegram error while fetching file: {}", message);
    FetchError::permanent(message)
}

/// Failures while streaming file content are connection-level problems.
pub fn classify_download(err: impl Display) -> FetchError {
    debug!("Download stream error: {}", err);
    FetchError::transient(format!("Download interrupted: {}", err))
}
