//! Message handlers for Telegram updates

pub mod error_handler;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::{
    CallbackQuery, Document, InlineKeyboardButton, InlineKeyboardMarkup, Message, MessageId,
    ReplyMarkup, ReplyParameters,
};
use tracing::{debug, error, info, warn};
use transfer_core::{progress, SystemFs, TransferExecutor, TransferRequest};

use crate::access::{Access, AccessPolicy, UNAUTHORIZED_REPLY};
use crate::fetch::TelegramFetcher;
use crate::format;
use crate::health::AppState;
use crate::status_updater::{self, TelegramStatus};

pub type Executor = TransferExecutor<TelegramFetcher, SystemFs>;

const CONFIRM: &str = "yes";
const CANCEL: &str = "no";

/// Pause between `/status` pages.
const PAGE_DELAY: Duration = Duration::from_millis(300);

/// Everything the handlers share.
#[derive(Clone)]
pub struct App {
    pub executor: Arc<Executor>,
    pub access: AccessPolicy,
    pub status_page_size: usize,
    pub progress_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Info,
    Status,
    Unknown(String),
}

impl Command {
    /// Parse `/name[@bot] args...`; `None` for anything that is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name).to_lowercase();

        Some(match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "info" => Command::Info,
            "status" => Command::Status,
            _ => Command::Unknown(name),
        })
    }

    /// Commands anyone may run, so an operator can discover their ids.
    pub fn is_open(&self) -> bool {
        matches!(self, Command::Start | Command::Help | Command::Info)
    }
}

/// Handle text messages
pub async fn handle_text_message(
    bot: Bot,
    msg: Message,
    app: App,
    health: AppState,
) -> ResponseResult<()> {
    health.increment_updates().await;

    let Some(command) = msg.text().and_then(Command::parse) else {
        debug!("Ignoring non-command text message");
        return Ok(());
    };
    info!("Received command: {:?}", command);

    if !command.is_open() && !authorize(&bot, &msg, &app, &health).await? {
        return Ok(());
    }

    match command {
        Command::Start => {
            let name = msg.from.as_ref().map(|u| u.first_name.as_str()).unwrap_or("there");
            bot.send_message(msg.chat.id, format::start(name)).await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, format::help(app.executor.destination_dir()))
                .await?;
        }
        Command::Info => {
            let user_id = msg.from.as_ref().map(|u| u.id.0);
            bot.send_message(msg.chat.id, format::info(user_id, msg.chat.id.0))
                .await?;
        }
        Command::Status => send_status(&bot, &msg, &app).await?,
        Command::Unknown(name) => debug!("Ignoring unknown command: {}", name),
    }

    Ok(())
}

async fn send_status(bot: &Bot, msg: &Message, app: &App) -> ResponseResult<()> {
    let records = app.executor.registry().snapshot();
    let pages = format::status_pages(&records, app.status_page_size);
    let count = pages.len();

    for (index, page) in pages.into_iter().enumerate() {
        bot.send_message(msg.chat.id, page).await?;
        if index + 1 < count {
            tokio::time::sleep(PAGE_DELAY).await;
        }
    }
    Ok(())
}

/// Handle document messages: check for conflicts, then ask for confirmation
pub async fn handle_document_message(
    bot: Bot,
    msg: Message,
    app: App,
    health: AppState,
) -> ResponseResult<()> {
    health.increment_updates().await;

    if !authorize(&bot, &msg, &app, &health).await? {
        return Ok(());
    }
    let Some(document) = msg.document() else {
        return Ok(());
    };

    let file_name = document_file_name(document.file_name.as_deref(), &document.file.unique_id);
    info!(file_name = %file_name, size = document.file.size, "Document received");

    if let Err(conflict) = app.executor.check(&document.file.id, &file_name) {
        warn!(%conflict, "Rejecting document");
        health.increment_rejected().await;
        let mut req = bot.send_message(msg.chat.id, format::conflict(&conflict));
        req.reply_parameters = Some(ReplyParameters::new(msg.id));
        req.await?;
        return Ok(());
    }

    let keyboard = InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("Yes", CONFIRM),
        InlineKeyboardButton::callback("No", CANCEL),
    ]]);
    let mut req = bot.send_message(
        msg.chat.id,
        format::confirmation(&file_name, u64::from(document.file.size)),
    );
    req.reply_parameters = Some(ReplyParameters::new(msg.id));
    req.reply_markup = Some(ReplyMarkup::InlineKeyboard(keyboard));
    req.await?;

    Ok(())
}

/// Handle the Yes/No answer to a confirmation prompt
pub async fn handle_callback_query(
    bot: Bot,
    query: CallbackQuery,
    app: App,
    health: AppState,
) -> ResponseResult<()> {
    health.increment_updates().await;

    let Some(prompt) = query.regular_message() else {
        warn!("Callback query without an accessible message");
        let mut req = bot.answer_callback_query(&query.id);
        req.text = Some(format::MISSING_DOCUMENT.to_string());
        req.show_alert = Some(true);
        req.await?;
        return Ok(());
    };
    bot.answer_callback_query(&query.id).await?;

    let access = app.access.check(Some(query.from.id), prompt.chat.id);
    if !access.is_allowed() {
        reject(&bot, prompt.chat.id, query.from.id.0, access, &health).await?;
        return Ok(());
    }

    if let Err(e) = bot.edit_message_reply_markup(prompt.chat.id, prompt.id).await {
        warn!("Failed to remove confirmation buttons: {}", e);
    }

    let (source, document) = match confirmed_document(prompt) {
        Ok(found) => found,
        Err(reason) => {
            warn!("Cannot confirm download: {}", reason);
            let mut req = bot.send_message(prompt.chat.id, format::MISSING_DOCUMENT);
            req.reply_parameters = Some(ReplyParameters::new(prompt.id));
            req.await?;
            return Ok(());
        }
    };

    match query.data.as_deref() {
        Some(CONFIRM) => {
            let request = transfer_request(document);
            info!(file_name = %request.file_name, "Download confirmed");

            let mut req = bot.send_message(source.chat.id, format::DOWNLOAD_STARTED);
            req.reply_parameters = Some(ReplyParameters::new(source.id));
            let status_message = req.await?;

            // The dispatcher handles one update per chat at a time; a
            // transfer can take hours.
            tokio::spawn(run_transfer(
                bot.clone(),
                app.clone(),
                health.clone(),
                source.chat.id,
                source.id,
                status_message.id,
                request,
            ));
        }
        _ => {
            info!("Download cancelled");
            let mut req = bot.send_message(source.chat.id, format::DOWNLOAD_CANCELLED);
            req.reply_parameters = Some(ReplyParameters::new(source.id));
            req.await?;
        }
    }

    Ok(())
}

async fn run_transfer(
    bot: Bot,
    app: App,
    health: AppState,
    chat_id: ChatId,
    document_message: MessageId,
    status_message: MessageId,
    request: TransferRequest,
) {
    let (tx, rx) = progress::channel();
    let sink = TelegramStatus::new(bot.clone(), chat_id, status_message);
    let updater = tokio::spawn(status_updater::run(rx, sink, app.progress_interval));

    health.increment_started().await;
    let result = app.executor.execute(&request, tx).await;
    if let Err(e) = updater.await {
        warn!("Status updater task failed: {}", e);
    }

    let text = match &result {
        Ok(outcome) => {
            health.increment_completed().await;
            format::truncate(&format::success(outcome), format::MESSAGE_LIMIT)
        }
        Err(e) if e.is_conflict() => {
            health.increment_rejected().await;
            format::failure(e)
        }
        Err(e) => {
            error!(file_name = %request.file_name, "Transfer failed: {}", e);
            health.increment_failed().await;
            format::failure(e)
        }
    };

    let mut req = bot.send_message(chat_id, text);
    req.reply_parameters = Some(ReplyParameters::new(document_message));
    if let Err(e) = req.await {
        error!("Failed to send transfer report: {}", e);
    }
}

/// Checks the sender of `msg`; replies and returns `false` if refused.
async fn authorize(bot: &Bot, msg: &Message, app: &App, health: &AppState) -> ResponseResult<bool> {
    let user = msg.from.as_ref().map(|u| u.id);
    let access = app.access.check(user, msg.chat.id);
    if access.is_allowed() {
        return Ok(true);
    }
    reject(bot, msg.chat.id, user.map(|u| u.0).unwrap_or(0), access, health).await?;
    Ok(false)
}

async fn reject(
    bot: &Bot,
    chat_id: ChatId,
    user_id: u64,
    access: Access,
    health: &AppState,
) -> ResponseResult<()> {
    warn!("Access denied ({:?}) for user {} in chat {}", access, user_id, chat_id.0);
    health.increment_unauthorized().await;
    bot.send_message(chat_id, UNAUTHORIZED_REPLY).await?;
    Ok(())
}

/// The document a confirmation prompt refers to, with the message that
/// carried it. `Err` names what is missing.
fn confirmed_document(prompt: &Message) -> Result<(&Message, &Document), &'static str> {
    let source = prompt
        .reply_to_message()
        .ok_or("prompt is not a reply to a document")?;
    let document = source.document().ok_or("replied-to message has no document")?;
    Ok((source, document))
}

fn transfer_request(document: &Document) -> TransferRequest {
    TransferRequest {
        remote_id: document.file.id.clone(),
        file_name: document_file_name(document.file_name.as_deref(), &document.file.unique_id),
        declared_size: u64::from(document.file.size),
        mime_type: document.mime_type.as_ref().map(|m| m.to_string()),
    }
}

/// Final path component of the sender's file name, or
/// `unnamed_<unique_id>` so every look at one document yields one name.
pub fn document_file_name(name: Option<&str>, unique_id: &str) -> String {
    let base = name
        .and_then(|n| n.rsplit(['/', '\\']).next())
        .map(str::trim)
        .unwrap_or_default();
    if base.is_empty() || base == "." || base == ".." || Path::new(base).components().count() != 1 {
        return format!("unnamed_{}", unique_id);
    }
    base.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/help extra args"), Some(Command::Help));
        assert_eq!(Command::parse("/INFO"), Some(Command::Info));
        assert_eq!(Command::parse("/status@downloader_bot"), Some(Command::Status));
        assert_eq!(
            Command::parse("/storage"),
            Some(Command::Unknown("storage".to_string()))
        );
    }

    #[test]
    fn test_parse_non_commands() {
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("   "), None);
    }

    #[test]
    fn test_open_commands() {
        assert!(Command::Start.is_open());
        assert!(Command::Help.is_open());
        assert!(Command::Info.is_open());
        assert!(!Command::Status.is_open());
        assert!(!Command::Unknown("x".to_string()).is_open());
    }

    #[test]
    fn test_document_file_name_keeps_plain_names() {
        assert_eq!(document_file_name(Some("movie.mkv"), "AgADxyz"), "movie.mkv");
        assert_eq!(document_file_name(Some("  spaced.txt "), "AgADxyz"), "spaced.txt");
    }

    #[test]
    fn test_document_file_name_strips_directories() {
        assert_eq!(document_file_name(Some("../../etc/passwd"), "AgADxyz"), "passwd");
        assert_eq!(
            document_file_name(Some("C:\\Users\\me\\report.pdf"), "AgADxyz"),
            "report.pdf"
        );
    }

    #[test]
    fn test_document_file_name_falls_back_to_unnamed() {
        assert_eq!(document_file_name(None, "AgADxyz"), "unnamed_AgADxyz");
        assert_eq!(document_file_name(Some(""), "AgAD5"), "unnamed_AgAD5");
        assert_eq!(document_file_name(Some("dir/"), "AgAD5"), "unnamed_AgAD5");
        assert_eq!(document_file_name(Some(".."), "AgAD5"), "unnamed_AgAD5");
    }

    #[test]
    fn test_unnamed_documents_get_distinct_stable_names() {
        let first = document_file_name(None, "AgADaaa");
        let second = document_file_name(None, "AgADbbb");
        assert_ne!(first, second);
        // Arrival check and confirmation see the same name
        assert_eq!(first, document_file_name(None, "AgADaaa"));
    }

    fn message(json: serde_json::Value) -> Message {
        serde_json::from_value(json).unwrap()
    }

    fn chat() -> serde_json::Value {
        serde_json::json!({"id": 42, "type": "private", "first_name": "Operator"})
    }

    fn prompt_replying_to(source: serde_json::Value) -> Message {
        message(serde_json::json!({
            "message_id": 2,
            "date": 1700000000,
            "chat": chat(),
            "from": {"id": 7, "is_bot": true, "first_name": "downloader"},
            "text": "Are you sure you want to download the file?",
            "reply_to_message": source,
        }))
    }

    #[test]
    fn test_confirmed_document_found() {
        let prompt = prompt_replying_to(serde_json::json!({
            "message_id": 1,
            "date": 1700000000,
            "chat": chat(),
            "from": {"id": 42, "is_bot": false, "first_name": "Operator"},
            "document": {
                "file_id": "BQACAgIAAxkBAAIB",
                "file_unique_id": "AgADxyz",
                "file_name": "movie.mkv",
                "file_size": 1000
            }
        }));

        let (source, document) = confirmed_document(&prompt).unwrap();
        assert_eq!(source.id, MessageId(1));
        assert_eq!(document.file_name.as_deref(), Some("movie.mkv"));

        let request = transfer_request(document);
        assert_eq!(request.remote_id, "BQACAgIAAxkBAAIB");
        assert_eq!(request.file_name, "movie.mkv");
        assert_eq!(request.declared_size, 1000);
    }

    #[test]
    fn test_confirmed_document_missing_reply() {
        let prompt = message(serde_json::json!({
            "message_id": 2,
            "date": 1700000000,
            "chat": chat(),
            "text": "Are you sure you want to download the file?",
        }));
        assert_eq!(
            confirmed_document(&prompt).unwrap_err(),
            "prompt is not a reply to a document"
        );
    }

    #[test]
    fn test_confirmed_document_reply_without_document() {
        let prompt = prompt_replying_to(serde_json::json!({
            "message_id": 1,
            "date": 1700000000,
            "chat": chat(),
            "from": {"id": 42, "is_bot": false, "first_name": "Operator"},
            "text": "just text"
        }));
        assert_eq!(
            confirmed_document(&prompt).unwrap_err(),
            "replied-to message has no document"
        );
    }
}
