//! RosiBot library root.

pub mod bot;
pub mod cli;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod logging;
pub mod messages;
pub mod state;
pub mod store;
pub mod telegram;
pub mod transport;
pub mod week;

pub use bot::RosiBot;
pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use error::{Error, Result};
pub use messages::Messages;
pub use state::{evaluate, Outbound, Transition, Trigger, WeeklyState};
pub use store::{InMemoryStore, SqliteStore, StateStore};
pub use transport::{InboundMessage, Transport};
pub use week::{Clock, SystemClock, WeekContext, WeekKey};
