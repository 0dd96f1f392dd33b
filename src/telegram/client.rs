use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{ChatId, UserId};

use crate::moderation::{ModerationError, Moderator, Profile, ProfileLookup};

/// Moderation and profile calls backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn map_error(err: RequestError) -> ModerationError {
    match err {
        RequestError::MigrateToChatId(chat_id) => ModerationError::Migrated { chat_id: chat_id.0 },
        other => ModerationError::Request(other.to_string()),
    }
}

#[async_trait]
impl Moderator for TelegramClient {
    async fn ban_member(
        &self,
        chat_id: i64,
        member_id: u64,
        until: DateTime<Utc>,
    ) -> Result<(), ModerationError> {
        self.bot
            .ban_chat_member(ChatId(chat_id), UserId(member_id))
            .until_date(until)
            .await
            .map_err(map_error)?;
        Ok(())
    }
}

#[async_trait]
impl ProfileLookup for TelegramClient {
    async fn profile(&self, member_id: u64) -> Result<Profile, ModerationError> {
        let chat = self
            .bot
            .get_chat(ChatId(member_id as i64))
            .await
            .map_err(map_error)?;

        Ok(Profile {
            username: chat.username().map(str::to_string),
            first_name: chat.first_name().map(str::to_string),
            last_name: chat.last_name().map(str::to_string),
        })
    }
}
