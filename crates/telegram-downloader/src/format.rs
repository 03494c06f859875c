//! Plain-text rendering of every message the bot sends.

use std::time::Duration;

use chrono::{DateTime, Local};
use transfer_core::{Conflict, ProgressEvent, TransferError, TransferOutcome, TransferRecord};

/// Telegram's per-message character limit.
pub const MESSAGE_LIMIT: usize = 4096;

pub const NO_ACTIVE_TRANSFERS: &str = "No files are being downloaded at the moment.";
pub const DOWNLOAD_STARTED: &str = "⬇️ Downloading file...";
pub const DOWNLOAD_CANCELLED: &str = "Download cancelled.";
pub const MISSING_DOCUMENT: &str =
    "Could not find the document for this confirmation. Please send the file again.";
pub const HANDLER_ERROR_REPLY: &str =
    "An error occurred while processing the request. Please check the logs.";

const COMMANDS: &[(&str, &str)] = &[
    ("/start", "Start the bot"),
    ("/help", "Get help"),
    ("/info", "Get user and chat info"),
    ("/status", "Get downloading files status"),
];

pub fn size_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

pub fn duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    format!("{:.2} secs  ({:.2} mins)", secs, secs / 60.0)
}

pub fn start_time(at: &DateTime<Local>) -> String {
    at.format("%H:%M:%S  %d/%m/%Y").to_string()
}

/// Cut `message` to at most `limit` characters, ending in "..." when cut.
pub fn truncate(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        return message.to_string();
    }
    let keep = limit.saturating_sub(3);
    let mut out: String = message.chars().take(keep).collect();
    out.push_str("...");
    out
}

pub fn start(first_name: &str) -> String {
    format!(
        "Hi {first_name}! I'm a bot that can download files for you. \
         Send me a file and I'll download it for you.\n\n\
         Use /help to see available commands."
    )
}

pub fn help(destination_dir: &std::path::Path) -> String {
    let commands = COMMANDS
        .iter()
        .map(|(name, description)| format!("{name} - {description}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "The following commands are available:\n{commands}\n\n\
         Send me a file and I'll download it to {}.",
        destination_dir.display()
    )
}

pub fn info(user_id: Option<u64>, chat_id: i64) -> String {
    let user = user_id.map_or_else(|| "unknown".to_string(), |id| id.to_string());
    format!("User ID: {user}\nChat ID: {chat_id}")
}

pub fn confirmation(file_name: &str, size_bytes: u64) -> String {
    format!(
        "Are you sure you want to download the file?\n\n\
         📄 File name:   {file_name}\n\
         💾 File size:   {}",
        size_mb(size_bytes)
    )
}

pub fn conflict(conflict: &Conflict) -> String {
    format!("⛔ File already exists!\nError:\n{conflict}")
}

pub fn success(outcome: &TransferOutcome) -> String {
    format!(
        "✅ File downloaded successfully.\n\n\
         📄 File name:   {}\n\
         📂 File path:   {}\n\
         💾 File size:   {}\n\
         🔻 Retries:   {}\n\
         ⏱ Download Duration:   {}\n\
         ⏱ Moving Duration:   {}\n\
         ⏱ Total Duration:   {}",
        outcome.file_name,
        outcome.final_path.display(),
        size_mb(outcome.file_size),
        outcome.retry_count,
        duration(outcome.download_duration),
        duration(outcome.move_duration),
        duration(outcome.total_duration),
    )
}

pub fn failure(err: &TransferError) -> String {
    let message = match err {
        TransferError::Conflict(c) => format!("⛔ Error checking if file exists\n{c}"),
        TransferError::MaxRetriesExceeded {
            file_name,
            file_size,
            retry_count,
            elapsed,
            ..
        }
        | TransferError::NonTransientFetchError {
            file_name,
            file_size,
            retry_count,
            elapsed,
            ..
        } => format!(
            "⛔ Error downloading file\n\
             📄 File name:   {file_name}\n\
             💾 File size:   {}\n\
             🔻 Retries:   {retry_count}\n\
             ⏱ Duration:   {}\n\n\
             {err}",
            size_mb(*file_size),
            duration(*elapsed),
        ),
        TransferError::MoveFailed {
            source_path,
            destination_path,
            cause,
            ..
        } => format!(
            "⛔ Error moving file\n\
             📂 File path:   {}\n\
             📂 Move to path:   {}\n\n\
             {cause}",
            source_path.display(),
            destination_path.display(),
        ),
    };
    truncate(&message, MESSAGE_LIMIT)
}

/// Details of a failed update for the operator.
pub fn handler_error<E: std::fmt::Display + std::fmt::Debug>(error: &E) -> String {
    truncate(
        &format!("An exception was raised while handling an update\n\n{error}\n\n{error:?}"),
        MESSAGE_LIMIT,
    )
}

fn status_record(record: &TransferRecord) -> String {
    format!(
        "📄 File name:   {}\n\
         💾 File size:   {}\n\
         ⏰ Start time:   {}\n\
         ⏱ Duration:   {}\n\
         🔻 Retries:   {}\n\
         🔄 Status:   {}\n",
        record.file_name,
        size_mb(record.total_bytes),
        start_time(&record.started_at),
        duration(record.elapsed()),
        record.retry_count,
        record.status(),
    )
}

/// Split a registry snapshot into `/status` messages of `page_size`
/// records. The first page carries the title; later pages a "Page k"
/// header.
pub fn status_pages(records: &[TransferRecord], page_size: usize) -> Vec<String> {
    if records.is_empty() {
        return vec![NO_ACTIVE_TRANSFERS.to_string()];
    }

    records
        .chunks(page_size.max(1))
        .enumerate()
        .map(|(index, chunk)| {
            let header = if index == 0 {
                "Downloading files status:\nPage 1\n\n".to_string()
            } else {
                format!("Page {}\n\n", index + 1)
            };
            let body = chunk.iter().map(status_record).collect::<Vec<_>>().join("\n");
            truncate(&(header + &body), MESSAGE_LIMIT)
        })
        .collect()
}

pub fn progress(event: &ProgressEvent) -> String {
    let eta = event
        .eta()
        .map_or_else(|| "--:--".to_string(), |at| at.format("%H:%M").to_string());
    format!(
        "{DOWNLOAD_STARTED}\n\n\
         📄 File name:   {}\n\
         📊 Progress:   {:.2}%  ({} of {})\n\
         🔻 Retries:   {}\n\
         🕑 ETA:   {eta}",
        event.file_name,
        event.percent(),
        size_mb(event.received_bytes),
        size_mb(event.total_bytes),
        event.retry_count,
    )
}
