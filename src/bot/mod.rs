//! The maintenance bot service.
//!
//! [`RosiBot`] owns the weekly cycle. Command handlers and the heartbeat both
//! go through [`RosiBot::advance`], which holds the week's lock while it reads
//! the stored state, evaluates the transition, commits it and finally sends
//! the resulting message. Sending happens only after the commit, and a send
//! that fails reverts the commit.

pub mod commands;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::heartbeat::{HeartbeatDaemon, HeartbeatHandle};
use crate::messages::{self, Messages, WEEKLY_FRIDAY, WEEKLY_MONDAY};
use crate::state::{evaluate, Outbound, Trigger, WeeklyState};
use crate::store::{StateStore, WeekLocks};
use crate::transport::{InboundMessage, Transport};
use crate::week::{Clock, SystemClock, WeekContext, WeekKey};

use commands::{CommandTable, DONE_COMMAND, HELP_COMMAND};

/// Prepended to every outbound message.
pub const ROSIBOT_PREFIX: &str = "[ROSIBOT]: ";

/// Conditional writes retried before giving up on a contended week.
const MAX_COMMIT_ATTEMPTS: usize = 3;

pub struct RosiBot {
    group_id: i64,
    transport: Arc<dyn Transport>,
    store: Arc<dyn StateStore>,
    messages: Messages,
    commands: CommandTable,
    clock: Arc<dyn Clock>,
    locks: WeekLocks,
    heartbeat: Mutex<Option<HeartbeatHandle>>,
}

impl RosiBot {
    /// Create the bot. Fails if a template required by `commands` or by the
    /// weekly reminders is missing.
    pub fn new(
        group_id: i64,
        transport: Arc<dyn Transport>,
        store: Arc<dyn StateStore>,
        messages: Messages,
        commands: CommandTable,
    ) -> Result<Self> {
        messages.validate(commands.names())?;

        Ok(Self {
            group_id,
            transport,
            store,
            messages,
            commands,
            clock: Arc::new(SystemClock),
            locks: WeekLocks::new(),
            heartbeat: Mutex::new(None),
        })
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Spawn the heartbeat. Fails if it is already running.
    pub fn start(self: &Arc<Self>, interval: Duration) -> Result<()> {
        let mut heartbeat = self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner);
        if heartbeat.is_some() {
            return Err(Error::Other("Heartbeat already running".to_string()));
        }
        *heartbeat = Some(HeartbeatDaemon::spawn(self, interval));
        tracing::info!("RosiBot started for group {}", self.group_id);
        Ok(())
    }

    /// Stop the heartbeat after its current iteration.
    pub async fn stop(&self) {
        let handle = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match handle {
            Some(handle) => {
                handle.shutdown().await;
                tracing::info!("RosiBot stopped");
            }
            None => tracing::debug!("RosiBot heartbeat was not running"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Handle a message from the chat transport.
    pub async fn handle(&self, inbound: &InboundMessage) {
        if inbound.group_id != self.group_id {
            tracing::debug!(
                "Ignoring message from {} in unregistered group {}",
                inbound.sender,
                inbound.group_id
            );
            return;
        }
        tracing::debug!("Message from {}", inbound.sender);
        self.handle_text(&inbound.text).await;
    }

    /// Route command text. Unknown or malformed commands are dropped silently.
    pub async fn handle_text(&self, text: &str) {
        let (command, action) = match self.commands.resolve(text) {
            Ok(Some(route)) => route,
            Ok(None) => return,
            Err(e) => {
                tracing::error!("Invalid bot command. {}", e);
                return;
            }
        };

        let week = self.clock.week();
        if let Err(e) = self.run(action.trigger(), Some(command), &week).await {
            tracing::error!("Bot command {} failed: {}", command, e);
        }
    }

    /// Feed `trigger` for `week` into the state machine, commit and send.
    ///
    /// Returns the message that was due. If sending it fails the state change
    /// is reverted and the error returned, so the same trigger fires again.
    pub async fn advance(&self, trigger: Trigger, week: &WeekContext) -> Result<Option<Outbound>> {
        self.run(trigger, None, week).await
    }

    async fn run(
        &self,
        trigger: Trigger,
        command: Option<&str>,
        week: &WeekContext,
    ) -> Result<Option<Outbound>> {
        if !trigger.is_stateful() {
            let message = evaluate(WeeklyState::None, trigger).message;
            if let Some(outbound) = message {
                self.deliver(outbound, command, week).await?;
            }
            return Ok(message);
        }

        let key = week.key();
        let _guard = self.locks.lock(key).await;

        let mut attempt = 0;
        let (transition, commit) = loop {
            attempt += 1;

            let raw = self.store.get(&key).await?;
            let current = WeeklyState::decode_or_fresh(raw.as_deref());
            let transition = evaluate(current, trigger);

            let Some(value) = transition.next.encode().filter(|_| transition.next != current)
            else {
                tracing::debug!("Week {} stays {} on {:?}", key, current, trigger);
                break (transition, None);
            };

            if self
                .store
                .compare_and_set(&key, raw.as_deref(), &value)
                .await?
            {
                tracing::info!(
                    "Week {}: {} -> {} on {:?}",
                    key,
                    current,
                    transition.next,
                    trigger
                );
                break (transition, Some((raw, value)));
            }

            if attempt >= MAX_COMMIT_ATTEMPTS {
                return Err(Error::Store(format!(
                    "state of {} changed concurrently {} times, giving up",
                    key, attempt
                )));
            }
            tracing::warn!("State of {} changed while evaluating {:?}. Retrying", key, trigger);
        };

        if transition.anomaly {
            tracing::warn!(
                "It's Friday and no weekly maintenance message was sent for {} yet. \
                 This should not happen. Sending the regular maintenance message",
                key
            );
        }

        let Some(outbound) = transition.message else {
            return Ok(None);
        };
        if let Err(e) = self.deliver(outbound, command, week).await {
            if let Some((previous, committed)) = commit {
                self.revert(&key, previous.as_deref(), &committed).await;
            }
            return Err(e);
        }
        Ok(Some(outbound))
    }

    /// Undo a commit whose message never went out, so the next tick retries.
    async fn revert(&self, key: &WeekKey, previous: Option<&str>, committed: &str) {
        let reverted = match previous {
            Some(previous) => self.store.compare_and_set(key, Some(committed), previous).await,
            None => self.store.compare_and_delete(key, committed).await,
        };
        match reverted {
            Ok(true) => tracing::warn!(
                "Message for {} not sent. Reverted state to {:?}",
                key,
                previous
            ),
            Ok(false) => tracing::warn!("State of {} changed before it could be reverted", key),
            Err(e) => tracing::error!("Failed to revert state of {}: {}", key, e),
        }
    }

    /// State of the current week.
    pub async fn current_state(&self) -> Result<(WeekKey, WeeklyState)> {
        let key = self.clock.week().key();
        let raw = self.store.get(&key).await?;
        Ok((key, WeeklyState::decode_or_fresh(raw.as_deref())))
    }

    /// Forget the current week's state so reminders are sent again.
    pub async fn reset_current_week(&self) -> Result<bool> {
        let key = self.clock.week().key();
        let _guard = self.locks.lock(key).await;
        let removed = self.store.delete(&key).await?;
        tracing::warn!("Cleared weekly state for {} (existed: {})", key, removed);
        Ok(removed)
    }

    async fn deliver(
        &self,
        outbound: Outbound,
        command: Option<&str>,
        week: &WeekContext,
    ) -> Result<()> {
        let text = match self.render(outbound, command, week) {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::debug!("No template configured for {:?}. Do nothing", outbound);
                return Ok(());
            }
            Err(e) => {
                tracing::error!("{}. Skipping {:?} message", e, outbound);
                return Ok(());
            }
        };

        self.send(&text).await.map_err(|e| {
            tracing::error!("Failed to send {:?} message: {}", outbound, e);
            e
        })
    }

    fn render(
        &self,
        outbound: Outbound,
        command: Option<&str>,
        week: &WeekContext,
    ) -> Result<Option<String>> {
        let template = match outbound {
            Outbound::MondayReminder => Some(self.messages.get_periodic_message(WEEKLY_MONDAY)?),
            Outbound::FridayReminder => Some(self.messages.get_periodic_message(WEEKLY_FRIDAY)?),
            Outbound::Help => {
                let command = command.unwrap_or(HELP_COMMAND);
                Some(self.messages.get_command_message(command)?.0)
            }
            Outbound::DoneSuccess => {
                let command = command.unwrap_or(DONE_COMMAND);
                Some(self.messages.get_command_message(command)?.0)
            }
            Outbound::AlreadyDone => {
                let command = command.unwrap_or(DONE_COMMAND);
                self.messages.get_command_message(command)?.1
            }
        };
        Ok(template.map(|t| messages::render(t, week)))
    }

    /// Send text to the group with the bot prefix.
    pub async fn send(&self, message: &str) -> Result<()> {
        self.transport
            .send(self.group_id, &format!("{}{}", ROSIBOT_PREFIX, message))
            .await
    }
}

impl std::fmt::Debug for RosiBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RosiBot")
            .field("group_id", &self.group_id)
            .field("commands", &self.commands)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn week_34_scenario() {
        let h = Harness::new();
        let bot = &h.bot;

        // Monday 09:00
        h.clock.set(date(2024, 8, 19));
        let week = bot.clock().week();
        bot.advance(Trigger::MondayTick, &week).await.unwrap();
        assert_eq!(bot.current_state().await.unwrap().1, WeeklyState::Fresh);
        assert_eq!(
            h.transport.sent(),
            vec!["[ROSIBOT]: Neue Woche, KW 34: bitte Wand putzen".to_string()]
        );

        // Wednesday: nothing happens.
        h.clock.set(date(2024, 8, 21));
        let week = bot.clock().week();
        assert_eq!(bot.advance(Trigger::OtherDayTick, &week).await.unwrap(), None);
        assert_eq!(bot.current_state().await.unwrap().1, WeeklyState::Fresh);
        assert_eq!(h.transport.sent().len(), 1);

        // Friday reminder.
        h.clock.set(date(2024, 8, 23));
        let week = bot.clock().week();
        assert_eq!(
            bot.advance(Trigger::FridayTick, &week).await.unwrap(),
            Some(Outbound::FridayReminder)
        );
        assert_eq!(bot.current_state().await.unwrap().1, WeeklyState::ReminderSent);

        bot.handle_text("!erledigt").await;
        assert_eq!(bot.current_state().await.unwrap().1, WeeklyState::Done);

        bot.handle_text("!erledigt").await;
        assert_eq!(bot.current_state().await.unwrap().1, WeeklyState::Done);

        assert_eq!(
            h.transport.sent(),
            vec![
                "[ROSIBOT]: Neue Woche, KW 34: bitte Wand putzen".to_string(),
                "[ROSIBOT]: Freitag! Ist die Wand schon sauber?".to_string(),
                "[ROSIBOT]: Danke fürs Putzen!".to_string(),
                "[ROSIBOT]: Diese Woche ist schon erledigt.".to_string(),
            ]
        );
        assert!(h.transport.sent_to().iter().all(|(group, _)| *group == GROUP_ID));
    }

    #[tokio::test]
    async fn done_twice_without_fail_template_is_silent() {
        let h = Harness::with_messages(MESSAGES_WITHOUT_FAIL);

        h.bot.handle_text("!erledigt").await;
        h.bot.handle_text("!erledigt").await;

        assert_eq!(h.bot.current_state().await.unwrap().1, WeeklyState::Done);
        assert_eq!(h.transport.sent(), vec!["[ROSIBOT]: Danke fürs Putzen!".to_string()]);
    }

    #[tokio::test]
    async fn repeated_monday_ticks_send_once() {
        let h = Harness::new();
        let week = h.bot.clock().week();

        for _ in 0..5 {
            h.bot.advance(Trigger::MondayTick, &week).await.unwrap();
        }
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn friday_recovers_missing_monday() {
        let h = Harness::new();
        h.clock.set(date(2024, 8, 23));
        let week = h.bot.clock().week();

        let sent = h.bot.advance(Trigger::FridayTick, &week).await.unwrap();
        assert_eq!(sent, Some(Outbound::MondayReminder));
        assert_eq!(h.bot.current_state().await.unwrap().1, WeeklyState::ReminderSent);

        h.bot.advance(Trigger::FridayTick, &week).await.unwrap();
        assert_eq!(
            h.transport.sent(),
            vec!["[ROSIBOT]: Neue Woche, KW 34: bitte Wand putzen".to_string()]
        );
    }

    #[tokio::test]
    async fn help_never_touches_state() {
        let store = Arc::new(CountingStore::default());
        let h = Harness::with_store(store.clone());

        h.bot.handle_text("!hilfe").await;
        h.bot.handle_text("!hilfe").await;

        assert_eq!(store.calls(), 0);
        assert_eq!(h.transport.sent().len(), 2);
        assert_eq!(h.transport.sent()[0], "[ROSIBOT]: Befehle: !hilfe, !erledigt");
    }

    #[tokio::test]
    async fn ignored_input_sends_nothing() {
        let h = Harness::new();

        h.bot.handle_text("hallo zusammen").await;
        h.bot.handle_text("!unbekannt").await;
        h.bot.handle_text(&format!("!erledigt{}", " ".repeat(120))).await;
        h.bot
            .handle(&InboundMessage::new("mallory", "!erledigt", GROUP_ID + 1))
            .await;

        assert!(h.transport.sent().is_empty());
        assert_eq!(h.bot.current_state().await.unwrap().1, WeeklyState::None);

        // Within the cap the same command still works.
        h.bot.handle(&InboundMessage::new("alice", "!erledigt  ", GROUP_ID)).await;
        assert_eq!(h.bot.current_state().await.unwrap().1, WeeklyState::Done);
    }

    #[tokio::test]
    async fn malformed_state_is_treated_as_fresh() {
        let store = Arc::new(InMemoryStore::new());
        let h = Harness::with_store(store.clone());
        let week = h.bot.clock().week();
        store.set(&week.key(), "kaputt").await.unwrap();

        // Monday must not re-send.
        h.bot.advance(Trigger::MondayTick, &week).await.unwrap();
        assert!(h.transport.sent().is_empty());

        h.clock.set(date(2024, 8, 23));
        let friday = h.bot.clock().week();
        assert_eq!(
            h.bot.advance(Trigger::FridayTick, &friday).await.unwrap(),
            Some(Outbound::FridayReminder)
        );
        assert_eq!(store.get(&week.key()).await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn store_outage_is_reported_and_nothing_sent() {
        let h = Harness::with_store(Arc::new(FailingStore));
        let week = h.bot.clock().week();

        assert!(matches!(
            h.bot.advance(Trigger::MondayTick, &week).await,
            Err(Error::Store(_))
        ));
        h.bot.handle_text("!erledigt").await;
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_send_reverts_state() {
        let h = Harness::new();
        let week = h.bot.clock().week();
        h.transport.set_failing(true);

        assert!(matches!(
            h.bot.advance(Trigger::MondayTick, &week).await,
            Err(Error::Telegram(_))
        ));
        assert_eq!(h.bot.current_state().await.unwrap().1, WeeklyState::None);

        h.transport.set_failing(false);
        assert_eq!(
            h.bot.advance(Trigger::MondayTick, &week).await.unwrap(),
            Some(Outbound::MondayReminder)
        );
        assert_eq!(h.bot.current_state().await.unwrap().1, WeeklyState::Fresh);
        assert_eq!(
            h.transport.sent(),
            vec!["[ROSIBOT]: Neue Woche, KW 34: bitte Wand putzen".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_friday_and_done_replies_revert_to_previous_state() {
        let store = Arc::new(InMemoryStore::new());
        let h = Harness::with_store(store.clone());
        h.clock.set(date(2024, 8, 23));
        let week = h.bot.clock().week();
        store.set(&week.key(), "0").await.unwrap();

        h.transport.set_failing(true);
        assert!(h.bot.advance(Trigger::FridayTick, &week).await.is_err());
        assert_eq!(store.get(&week.key()).await.unwrap().as_deref(), Some("0"));

        h.bot.handle_text("!erledigt").await;
        assert_eq!(h.bot.current_state().await.unwrap().1, WeeklyState::Fresh);

        h.transport.set_failing(false);
        h.bot.advance(Trigger::FridayTick, &week).await.unwrap();
        h.bot.handle_text("!erledigt").await;
        assert_eq!(h.bot.current_state().await.unwrap().1, WeeklyState::Done);
        assert_eq!(
            h.transport.sent(),
            vec![
                "[ROSIBOT]: Freitag! Ist die Wand schon sauber?".to_string(),
                "[ROSIBOT]: Danke fürs Putzen!".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn conflicting_writer_is_reconciled() {
        // Another process marks the week done between our read and write.
        let store = Arc::new(RacingStore::new("2"));
        let h = Harness::with_store(store.clone());
        let week = h.bot.clock().week();

        let due = h.bot.advance(Trigger::MondayTick, &week).await.unwrap();
        assert_eq!(due, None);
        assert_eq!(h.bot.current_state().await.unwrap().1, WeeklyState::Done);
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_done_and_monday_tick() {
        for _ in 0..25 {
            let h = Harness::new();
            let week = h.bot.clock().week();

            let done = {
                let bot = h.bot.clone();
                tokio::spawn(async move { bot.handle_text("!erledigt").await })
            };
            let tick = {
                let bot = h.bot.clone();
                tokio::spawn(async move { bot.advance(Trigger::MondayTick, &week).await })
            };
            done.await.unwrap();
            tick.await.unwrap().unwrap();

            assert_eq!(h.bot.current_state().await.unwrap().1, WeeklyState::Done);

            let sent = h.transport.sent();
            let thanks = sent.iter().filter(|m| m.contains("Danke")).count();
            let mondays = sent.iter().filter(|m| m.contains("Neue Woche")).count();
            assert_eq!(thanks, 1);
            assert!(mondays <= 1);
            // Monday reminder, if any, was sent before the week was done.
            if mondays == 1 {
                assert!(sent[0].contains("Neue Woche"));
            }
        }
    }

    #[tokio::test]
    async fn reset_clears_current_week() {
        let h = Harness::new();
        let week = h.bot.clock().week();
        h.bot.advance(Trigger::MondayTick, &week).await.unwrap();

        assert!(h.bot.reset_current_week().await.unwrap());
        assert!(!h.bot.reset_current_week().await.unwrap());

        h.bot.advance(Trigger::MondayTick, &week).await.unwrap();
        assert_eq!(h.transport.sent().len(), 2);
    }

    #[test]
    fn missing_templates_are_fatal() {
        let messages =
            Messages::from_json(r#"{"periodic": {"WEEKLY_MONDAY": "x", "WEEKLY_FRIDAY": "y"}}"#)
                .unwrap();
        let result = RosiBot::new(
            GROUP_ID,
            Arc::new(crate::transport::RecordingTransport::default()),
            Arc::new(InMemoryStore::new()),
            messages,
            CommandTable::standard().unwrap(),
        );
        assert!(matches!(result, Err(Error::MessageNotFound(_))));
    }
}
