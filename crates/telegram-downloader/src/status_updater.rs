//! Live progress for one transfer, shown by editing the "Downloading"
//! message in place.
//!
//! Telegram rate-limits edits, so updates go out at most once per
//! interval. The newest event is always shown once the transfer ends.

use std::future::Future;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::MessageId;
use tokio::time::Instant;
use tracing::{debug, warn};
use transfer_core::{ProgressEvent, ProgressReceiver, Throttle};

use crate::format;

/// Somewhere to show the current status text.
pub trait StatusSink: Send + Sync + 'static {
    fn show(&self, text: String) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Edits one message in a chat.
#[derive(Clone)]
pub struct TelegramStatus {
    bot: Bot,
    chat_id: ChatId,
    message_id: MessageId,
}

impl TelegramStatus {
    pub fn new(bot: Bot, chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            bot,
            chat_id,
            message_id,
        }
    }
}

impl StatusSink for TelegramStatus {
    async fn show(&self, text: String) -> anyhow::Result<()> {
        self.bot
            .edit_message_text(self.chat_id, self.message_id, text)
            .await?;
        Ok(())
    }
}

/// Mirror `updates` into `sink` until the sending side is dropped.
pub async fn run<S: StatusSink>(mut updates: ProgressReceiver, sink: S, interval: Duration) {
    let mut throttle = Throttle::new(interval);
    let mut pending: Option<ProgressEvent> = None;
    let mut last_shown: Option<String> = None;

    loop {
        let due = pending.as_ref().and_then(|_| throttle.next_ready());

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(event) = updates.borrow_and_update().clone() {
                    pending = Some(event);
                }
            }
            _ = sleep_until(due) => {}
        }

        if pending.is_some() && throttle.ready(Instant::now()) {
            if let Some(event) = pending.take() {
                show(&sink, &event, &mut last_shown).await;
            }
        }
    }

    let last = updates.borrow().clone().or(pending);
    if let Some(event) = last {
        show(&sink, &event, &mut last_shown).await;
    }
    debug!("status updater finished");
}

async fn show<S: StatusSink>(sink: &S, event: &ProgressEvent, last_shown: &mut Option<String>) {
    let text = format::truncate(&format::progress(event), format::MESSAGE_LIMIT);
    if last_shown.as_deref() == Some(text.as_str()) {
        return;
    }
    match sink.show(text.clone()).await {
        Ok(()) => *last_shown = Some(text),
        Err(e) => warn!(
            file_name = %event.file_name,
            error = %e,
            "failed to update status message"
        ),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
