//! Operator authorization.
//!
//! The bot serves exactly one user in exactly one chat. Handlers call
//! [`AccessPolicy::check`] before doing anything privileged.

use teloxide::types::{ChatId, UserId};

use crate::config::AccessConfig;

pub const UNAUTHORIZED_REPLY: &str = "Unauthorized user or chat.\n\
     Please verify the values of USER_ID and CHAT_ID in the configuration.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    UnauthorizedUser,
    UnauthorizedChat,
}

impl Access {
    pub fn is_allowed(self) -> bool {
        self == Access::Allowed
    }
}

#[derive(Debug, Clone)]
pub struct AccessPolicy {
    user_id: UserId,
    chat_id: ChatId,
}

impl AccessPolicy {
    pub fn new(user_id: UserId, chat_id: ChatId) -> Self {
        Self { user_id, chat_id }
    }

    /// `user` is `None` for updates without a sender, e.g. channel posts.
    pub fn check(&self, user: Option<UserId>, chat: ChatId) -> Access {
        if user != Some(self.user_id) {
            return Access::UnauthorizedUser;
        }
        if chat != self.chat_id {
            return Access::UnauthorizedChat;
        }
        Access::Allowed
    }
}

impl From<&AccessConfig> for AccessPolicy {
    fn from(config: &AccessConfig) -> Self {
        Self::new(UserId(config.user_id), ChatId(config.chat_id))
    }
}
