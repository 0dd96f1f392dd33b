use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

/// Bans longer than 366 days are treated by Telegram as permanent.
const PERMANENT_BAN_DAYS: i64 = 367;

#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    /// The group was upgraded to a supergroup; requests must target `chat_id`.
    #[error("chat migrated to {chat_id}")]
    Migrated { chat_id: i64 },
    #[error("request error: {0}")]
    Request(String),
}

/// Display profile of a member, used for diagnostics only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[async_trait]
pub trait Moderator: Send + Sync {
    async fn ban_member(
        &self,
        chat_id: i64,
        member_id: u64,
        until: DateTime<Utc>,
    ) -> Result<(), ModerationError>;
}

#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn profile(&self, member_id: u64) -> Result<Profile, ModerationError>;
}

/// Ban date far enough ahead that the platform treats the ban as forever.
pub fn permanent_ban_until(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(PERMANENT_BAN_DAYS)
}

/// Ban `member_id` from `chat_id`, following a single migration redirect.
///
/// The redirected chat id is not remembered; the next call hits the old id again.
pub async fn ban_with_migration_fallback(
    moderator: &dyn Moderator,
    chat_id: i64,
    member_id: u64,
    until: DateTime<Utc>,
) -> Result<(), ModerationError> {
    match moderator.ban_member(chat_id, member_id, until).await {
        Err(ModerationError::Migrated { chat_id: migrated }) if migrated != 0 => {
            warn!(member_id, from = chat_id, to = migrated, "chat migrated, retrying ban");
            moderator.ban_member(migrated, member_id, until).await
        }
        result => result,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeModerator;
    use super::*;

    const CHAT: i64 = -100;

    fn until() -> DateTime<Utc> {
        permanent_ban_until(DateTime::from_timestamp(1_700_000_000, 0).unwrap())
    }

    #[tokio::test]
    async fn successful_ban_is_not_retried() {
        let moderator = FakeModerator::default();
        ban_with_migration_fallback(&moderator, CHAT, 5, until()).await.unwrap();

        assert_eq!(moderator.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn migration_retries_once_against_new_chat() {
        let moderator = FakeModerator::scripted(vec![
            Err(ModerationError::Migrated { chat_id: 999 }),
            Ok(()),
        ]);

        ban_with_migration_fallback(&moderator, CHAT, 5, until()).await.unwrap();

        let calls = moderator.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, CHAT);
        assert_eq!((calls[1].0, calls[1].1, calls[1].2), (999, 5, until()));
    }

    #[tokio::test]
    async fn retry_result_is_returned() {
        let moderator = FakeModerator::scripted(vec![
            Err(ModerationError::Migrated { chat_id: 999 }),
            Err(ModerationError::Request("Forbidden".into())),
        ]);

        let err = ban_with_migration_fallback(&moderator, CHAT, 5, until())
            .await
            .unwrap_err();

        assert!(matches!(err, ModerationError::Request(ref m) if m == "Forbidden"));
        assert_eq!(moderator.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn second_migration_is_not_followed() {
        let moderator = FakeModerator::scripted(vec![
            Err(ModerationError::Migrated { chat_id: 999 }),
            Err(ModerationError::Migrated { chat_id: 1234 }),
        ]);

        let err = ban_with_migration_fallback(&moderator, CHAT, 5, until())
            .await
            .unwrap_err();

        assert!(matches!(err, ModerationError::Migrated { chat_id: 1234 }));
        assert_eq!(moderator.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn plain_failure_is_returned_without_retry() {
        let moderator = FakeModerator::scripted(vec![Err(ModerationError::Request(
            "Bad Request: not enough rights".into(),
        ))]);

        let err = ban_with_migration_fallback(&moderator, CHAT, 5, until())
            .await
            .unwrap_err();

        assert!(matches!(err, ModerationError::Request(_)));
        assert_eq!(moderator.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn zero_migration_target_is_not_followed() {
        let moderator =
            FakeModerator::scripted(vec![Err(ModerationError::Migrated { chat_id: 0 })]);

        let err = ban_with_migration_fallback(&moderator, CHAT, 5, until())
            .await
            .unwrap_err();

        assert!(matches!(err, ModerationError::Migrated { chat_id: 0 }));
        assert_eq!(moderator.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn permanent_ban_is_beyond_a_year() {
        let now = DateTime::from_timestamp(0, 0).unwrap();
        assert_eq!(permanent_ban_until(now).timestamp(), 367 * 24 * 3600);
    }
}
