//! Persistence of weekly state.
//!
//! Stores map a [`WeekKey`] to a raw state value. Decoding the value into a
//! [`WeeklyState`](crate::state::WeeklyState) is the caller's job so a store
//! never has to know about the state machine.

pub mod inmem;
pub mod lock;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::week::WeekKey;

pub use inmem::InMemoryStore;
pub use lock::WeekLocks;
pub use sqlite::SqliteStore;

/// Key-value store for weekly state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Raw value for `key`, or `None` if never written.
    async fn get(&self, key: &WeekKey) -> Result<Option<String>>;

    /// Unconditional overwrite.
    async fn set(&self, key: &WeekKey, value: &str) -> Result<()>;

    /// Write `value` only if the current raw value equals `expected`
    /// (`None` meaning no entry). Returns whether the write happened.
    async fn compare_and_set(
        &self,
        key: &WeekKey,
        expected: Option<&str>,
        value: &str,
    ) -> Result<bool>;

    /// Remove the entry only if its raw value equals `expected`. Returns
    /// whether the entry was removed.
    async fn compare_and_delete(&self, key: &WeekKey, expected: &str) -> Result<bool>;

    /// Remove the entry. Returns whether one existed.
    async fn delete(&self, key: &WeekKey) -> Result<bool>;
}
