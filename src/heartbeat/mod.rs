//! Periodic reminders.

pub mod daemon;

pub use daemon::{HeartbeatDaemon, HeartbeatHandle};
