//! Shared fixtures for bot and heartbeat tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::messages::Messages;
use crate::store::{InMemoryStore, StateStore};
use crate::transport::RecordingTransport;
use crate::week::{FixedClock, WeekKey};

use super::commands::CommandTable;
use super::RosiBot;

pub const GROUP_ID: i64 = -1001234567890;

pub const MESSAGES: &str = r#"{
    "periodic": {
        "WEEKLY_MONDAY": "Neue Woche, {KW}: bitte Wand putzen",
        "WEEKLY_FRIDAY": "Freitag! Ist die Wand schon sauber?"
    },
    "commands": {
        "!hilfe": "Befehle: !hilfe, !erledigt",
        "!erledigt": { "SUCCESS": "Danke fürs Putzen!", "FAIL": "Diese Woche ist schon erledigt." }
    }
}"#;

pub const MESSAGES_WITHOUT_FAIL: &str = r#"{
    "periodic": {
        "WEEKLY_MONDAY": "Neue Woche, {KW}: bitte Wand putzen",
        "WEEKLY_FRIDAY": "Freitag! Ist die Wand schon sauber?"
    },
    "commands": {
        "!hilfe": "Befehle: !hilfe, !erledigt",
        "!erledigt": "Danke fürs Putzen!"
    }
}"#;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Bot wired to a recording transport and a clock set to Monday of KW 34/2024.
pub struct Harness {
    pub bot: Arc<RosiBot>,
    pub transport: Arc<RecordingTransport>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Arc::new(InMemoryStore::new()), MESSAGES)
    }

    pub fn with_store(store: Arc<dyn StateStore>) -> Self {
        Self::build(store, MESSAGES)
    }

    pub fn with_messages(messages: &str) -> Self {
        Self::build(Arc::new(InMemoryStore::new()), messages)
    }

    fn build(store: Arc<dyn StateStore>, messages: &str) -> Self {
        let transport = Arc::new(RecordingTransport::default());
        let clock = Arc::new(FixedClock::new(date(2024, 8, 19)));
        let bot = RosiBot::new(
            GROUP_ID,
            transport.clone(),
            store,
            Messages::from_json(messages).unwrap(),
            CommandTable::standard().unwrap(),
        )
        .unwrap()
        .with_clock(clock.clone());

        Self {
            bot: Arc::new(bot),
            transport,
            clock,
        }
    }
}

/// Store that is always down.
pub struct FailingStore;

#[async_trait]
impl StateStore for FailingStore {
    async fn get(&self, _key: &WeekKey) -> Result<Option<String>> {
        Err(Error::Store("connection refused".to_string()))
    }

    async fn set(&self, _key: &WeekKey, _value: &str) -> Result<()> {
        Err(Error::Store("connection refused".to_string()))
    }

    async fn compare_and_set(
        &self,
        _key: &WeekKey,
        _expected: Option<&str>,
        _value: &str,
    ) -> Result<bool> {
        Err(Error::Store("connection refused".to_string()))
    }

    async fn compare_and_delete(&self, _key: &WeekKey, _expected: &str) -> Result<bool> {
        Err(Error::Store("connection refused".to_string()))
    }

    async fn delete(&self, _key: &WeekKey) -> Result<bool> {
        Err(Error::Store("connection refused".to_string()))
    }
}

/// In-memory store that counts every call.
#[derive(Default)]
pub struct CountingStore {
    inner: InMemoryStore,
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for CountingStore {
    async fn get(&self, key: &WeekKey) -> Result<Option<String>> {
        self.count();
        self.inner.get(key).await
    }

    async fn set(&self, key: &WeekKey, value: &str) -> Result<()> {
        self.count();
        self.inner.set(key, value).await
    }

    async fn compare_and_set(
        &self,
        key: &WeekKey,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool> {
        self.count();
        self.inner.compare_and_set(key, expected, value).await
    }

    async fn compare_and_delete(&self, key: &WeekKey, expected: &str) -> Result<bool> {
        self.count();
        self.inner.compare_and_delete(key, expected).await
    }

    async fn delete(&self, key: &WeekKey) -> Result<bool> {
        self.count();
        self.inner.delete(key).await
    }
}

/// Store where another writer sneaks in `foreign` right before the first
/// conditional write.
pub struct RacingStore {
    inner: InMemoryStore,
    foreign: String,
    raced: AtomicBool,
}

impl RacingStore {
    pub fn new(foreign: &str) -> Self {
        Self {
            inner: InMemoryStore::new(),
            foreign: foreign.to_string(),
            raced: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StateStore for RacingStore {
    async fn get(&self, key: &WeekKey) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &WeekKey, value: &str) -> Result<()> {
        self.inner.set(key, value).await
    }

    async fn compare_and_set(
        &self,
        key: &WeekKey,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.set(key, &self.foreign).await?;
        }
        self.inner.compare_and_set(key, expected, value).await
    }

    async fn compare_and_delete(&self, key: &WeekKey, expected: &str) -> Result<bool> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn delete(&self, key: &WeekKey) -> Result<bool> {
        self.inner.delete(key).await
    }
}
