//! Heartbeat daemon that drives the weekly reminders.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::bot::RosiBot;
use crate::state::Trigger;
use crate::week::WeekKey;

/// Running heartbeat task.
pub struct HeartbeatHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Signal the loop and wait until it has finished its current iteration.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Heartbeat task ended abnormally: {}", e);
        }
    }
}

/// Wakes every `interval` and feeds the day's tick into the bot.
pub struct HeartbeatDaemon {
    bot: Weak<RosiBot>,
    interval: Duration,
    /// Last (week, tick) that was evaluated successfully.
    settled: Option<(WeekKey, Trigger)>,
    iteration: u64,
}

impl HeartbeatDaemon {
    pub fn new(bot: &Arc<RosiBot>, interval: Duration) -> Self {
        Self {
            bot: Arc::downgrade(bot),
            interval,
            settled: None,
            iteration: 0,
        }
    }

    /// Spawn the loop on the current runtime.
    pub fn spawn(bot: &Arc<RosiBot>, interval: Duration) -> HeartbeatHandle {
        let (shutdown, rx) = watch::channel(false);
        let daemon = Self::new(bot, interval);
        let task = tokio::spawn(daemon.run(rx));
        HeartbeatHandle { shutdown, task }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Heartbeat daemon started (interval {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                // Also fires when the handle is dropped.
                _ = shutdown.changed() => break,
            }

            let Some(bot) = self.bot.upgrade() else {
                tracing::info!("Bot is gone, heartbeat stopping");
                break;
            };
            self.beat(&bot).await;
        }

        tracing::info!("Heartbeat daemon stopped");
    }

    /// Run one iteration. Returns whether the bot's state was consulted.
    pub async fn beat(&mut self, bot: &RosiBot) -> bool {
        tracing::debug!("Running heartbeat iteration {}", self.iteration);
        self.iteration += 1;

        let week = bot.clock().week();
        let tick = week.tick();
        if !tick.is_stateful() {
            return false;
        }

        let key = week.key();
        if self.settled == Some((key, tick)) {
            tracing::debug!("{:?} for {} already handled. Do nothing", tick, key);
            return false;
        }

        match bot.advance(tick, &week).await {
            Ok(_) => self.settled = Some((key, tick)),
            Err(e) => tracing::error!(
                "Heartbeat {:?} for {} failed: {}. Retrying next wake",
                tick,
                key,
                e
            ),
        }
        true
    }
}
