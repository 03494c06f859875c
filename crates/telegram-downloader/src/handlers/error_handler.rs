//! Dispatcher-level error handler

use std::fmt::{Debug, Display};
use std::sync::Arc;

use futures::future::BoxFuture;
use teloxide::error_handlers::ErrorHandler;
use teloxide::prelude::*;
use teloxide::types::{ChatId, UserId};
use tracing::error;

use crate::config::AccessConfig;
use crate::format;

/// Logs every error a handler returns, sends the details to the operator
/// and a short notice to the operator's chat.
pub struct NotifyOperator {
    bot: Bot,
    user_id: UserId,
    chat_id: ChatId,
}

impl NotifyOperator {
    pub fn new(bot: Bot, access: &AccessConfig) -> Arc<Self> {
        Arc::new(Self {
            bot,
            user_id: UserId(access.user_id),
            chat_id: ChatId(access.chat_id),
        })
    }
}

impl<E> ErrorHandler<E> for NotifyOperator
where
    E: Display + Debug + Send + 'static,
{
    fn handle_error(self: Arc<Self>, error: E) -> BoxFuture<'static, ()> {
        error!("Error while handling an update: {:?}", error);
        let details = format::handler_error(&error);

        Box::pin(async move {
            if let Err(e) = self.bot.send_message(self.user_id, details).await {
                error!("Failed to send error details to operator: {}", e);
            }
            if let Err(e) = self
                .bot
                .send_message(self.chat_id, format::HANDLER_ERROR_REPLY)
                .await
            {
                error!("Failed to send error notice to chat {}: {}", self.chat_id, e);
            }
        })
    }
}
