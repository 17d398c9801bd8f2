//! Error types for RosiBot.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("State store error: {0}")]
    Store(String),

    #[error("Telegram error: {0}")]
    Telegram(String),

    #[error("Could not decode weekly state {0:?}")]
    StateDecode(String),

    #[error("No message template for {0}")]
    MessageNotFound(String),

    #[error("Bot command length {len} exceeds allowed length of {max}")]
    CommandTooLong { len: usize, max: usize },

    #[error("Command {0} is already registered")]
    DuplicateCommand(String),

    #[error("{0}")]
    Other(String),
}
