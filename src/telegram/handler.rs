use chrono::Utc;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::BotCommand;
use tracing::{error, info};

use crate::db::ActivityStore;
use crate::watcher::{ChatEvent, Recorder, build_report};

use super::client::TelegramClient;
use super::formatter::{MAX_MESSAGE_LEN, split_message};

pub struct AppState {
    pub recorder: Recorder,
    pub store: Arc<dyn ActivityStore>,
    pub client: TelegramClient,
}

/// Consume chat updates until the process exits, recording member activity.
pub async fn run_bot(bot: Bot, state: Arc<AppState>) {
    let commands = vec![BotCommand::new(
        "when",
        "Show the list of users and time since their last message",
    )];
    if let Err(e) = bot.set_my_commands(commands).await {
        error!("Failed to set bot commands: {e}");
    } else {
        info!("Bot commands menu registered");
    }

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;
}

fn is_report_command(text: Option<&str>) -> bool {
    match text.map(str::trim) {
        Some("q") => true,
        Some(t) => t
            .split_whitespace()
            .next()
            .and_then(|cmd| cmd.split('@').next())
            .is_some_and(|cmd| cmd == "/when"),
        None => false,
    }
}

async fn handle_message(
    msg: teloxide::types::Message,
    bot: Bot,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    if is_report_command(msg.text()) {
        return send_report(&msg, &bot, &state).await;
    }

    if let Some(event) = event_from_message(&msg) {
        state.recorder.handle(&event, Utc::now().timestamp());
    }

    Ok(())
}

fn event_from_message(msg: &teloxide::types::Message) -> Option<ChatEvent> {
    let left = msg.left_chat_member().map(|u| u.id.0);
    let joined: Vec<u64> = msg
        .new_chat_members()
        .map(|members| members.iter().map(|u| u.id.0).collect())
        .unwrap_or_default();
    let sender = msg.from.as_ref().map(|u| u.id.0);

    ChatEvent::classify(left, &joined, sender)
}

/// Reply to the command sender in private with the activity report.
async fn send_report(
    msg: &teloxide::types::Message,
    bot: &Bot,
    state: &AppState,
) -> ResponseResult<()> {
    let Some(sender) = msg.from.as_ref() else {
        return Ok(());
    };

    let report = match build_report(state.store.as_ref(), &state.client, Utc::now()).await {
        Ok(r) if r.is_empty() => "No activity recorded yet.".to_string(),
        Ok(r) => r,
        Err(e) => {
            error!(op = "report", member_id = sender.id.0, "failed to build report: {e}");
            return Ok(());
        }
    };

    let to = ChatId(sender.id.0 as i64);
    for chunk in split_message(&report, MAX_MESSAGE_LEN) {
        bot.send_message(to, chunk).await?;
    }
    Ok(())
}
