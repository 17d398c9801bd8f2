//! Telegram bot client - simple polling version.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;

use crate::bot::commands::CommandTable;
use crate::bot::RosiBot;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::messages::Messages;
use crate::store::SqliteStore;
use crate::transport::Transport;

use super::handler::inbound_from;

/// Sends group messages through the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, group_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(group_id), text)
            .await
            .map_err(|e| Error::Telegram(e.to_string()))?;
        Ok(())
    }
}

/// Run the bot until Ctrl+C: heartbeat plus inbound command polling.
pub async fn run_telegram_daemon(settings: Settings) -> Result<()> {
    tracing::info!("Starting Telegram bot...");

    let (token, group_id) = settings.telegram_credentials()?;
    let messages = Messages::load(&settings.messages_path()?)?;
    let commands = CommandTable::standard()?;
    let store = Arc::new(SqliteStore::open(&settings.database_path()?)?);

    let telegram = Bot::new(token);
    let rosi = Arc::new(RosiBot::new(
        group_id,
        Arc::new(TelegramTransport::new(telegram.clone())),
        store,
        messages,
        commands,
    )?);

    if settings.debug {
        tracing::warn!(
            "DEBUG MODE ENABLED. WILL CLEAR WEEKLY STATE. \
             THIS RESULTS IN ALL PERIODIC MESSAGES BEING RESENT. \
             BE CAREFUL TO AVOID SPAM"
        );
        rosi.reset_current_week().await?;
    }

    rosi.start(settings.interval())?;
    tracing::info!("Listening for commands in group {}", group_id);

    let handler_bot = rosi.clone();
    teloxide::repl(telegram, move |msg: Message| {
        let rosi = handler_bot.clone();
        async move {
            if let Some(inbound) = inbound_from(&msg) {
                rosi.handle(&inbound).await;
            }
            respond(())
        }
    })
    .await;

    rosi.stop().await;
    Ok(())
}
