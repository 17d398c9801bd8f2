//! Message templates for command replies and periodic reminders.
//!
//! Templates are loaded once from a JSON file:
//!
//! ```json
//! {
//!   "periodic": { "WEEKLY_MONDAY": "Wartung {KW} ...", "WEEKLY_FRIDAY": "..." },
//!   "commands": {
//!     "!hilfe": "...",
//!     "!erledigt": { "SUCCESS": "...", "FAIL": "..." }
//!   }
//! }
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::week::WeekContext;

/// Periodic message sent on Mondays (and as Friday fallback).
pub const WEEKLY_MONDAY: &str = "WEEKLY_MONDAY";

/// Periodic message sent on Fridays.
pub const WEEKLY_FRIDAY: &str = "WEEKLY_FRIDAY";

/// Placeholder replaced with the week label.
pub const WEEK_PLACEHOLDER: &str = "{KW}";

/// Reply to a command. The failure text is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    pub command: String,
    pub success: String,
    pub fail: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandEntry {
    Plain(String),
    Full {
        #[serde(rename = "SUCCESS")]
        success: String,
        #[serde(rename = "FAIL", default)]
        fail: Option<String>,
    },
}

#[derive(Deserialize, Default)]
struct MessageFile {
    #[serde(default)]
    periodic: HashMap<String, serde_json::Value>,
    #[serde(default)]
    commands: HashMap<String, serde_json::Value>,
}

/// All templates known to the bot.
#[derive(Debug, Clone, Default)]
pub struct Messages {
    periodic: HashMap<String, String>,
    commands: HashMap<String, CommandMessage>,
}

impl Messages {
    /// Load templates from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Could not read messages from {}: {}", path.display(), e))
        })?;
        let messages = Self::from_json(&content)?;
        tracing::debug!(
            "Loaded {} periodic and {} command messages from {}",
            messages.periodic.len(),
            messages.commands.len(),
            path.display()
        );
        Ok(messages)
    }

    /// Parse templates from JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        let is_empty = value.as_object().map_or(true, |o| o.is_empty());
        if is_empty {
            tracing::warn!("No messages could be retrieved from message file");
            return Ok(Self::default());
        }

        let file: MessageFile = serde_json::from_value(value)?;
        let mut messages = Self::default();

        for (id, template) in file.periodic {
            match template {
                serde_json::Value::String(text) => {
                    messages.periodic.insert(id, text);
                }
                other => {
                    tracing::warn!(
                        "Skipping periodic message {}: expected string, got {}",
                        id,
                        other
                    );
                }
            }
        }

        for (command, entry) in file.commands {
            let entry: CommandEntry = serde_json::from_value(entry).map_err(|e| {
                Error::Config(format!("Could not parse message for command {}: {}", command, e))
            })?;
            let (success, fail) = match entry {
                CommandEntry::Plain(success) => (success, None),
                CommandEntry::Full { success, fail } => (success, fail),
            };
            messages.commands.insert(
                command.clone(),
                CommandMessage {
                    command,
                    success,
                    fail,
                },
            );
        }

        Ok(messages)
    }

    /// Template of a periodic message.
    pub fn get_periodic_message(&self, message_id: &str) -> Result<&str> {
        self.periodic
            .get(message_id)
            .map(String::as_str)
            .ok_or_else(|| Error::MessageNotFound(format!("periodic message {}", message_id)))
    }

    /// Success and optional failure template of a command.
    pub fn get_command_message(&self, command: &str) -> Result<(&str, Option<&str>)> {
        self.commands
            .get(command)
            .map(|m| (m.success.as_str(), m.fail.as_deref()))
            .ok_or_else(|| Error::MessageNotFound(format!("command {}", command)))
    }

    /// Check that every periodic message and every given command has a template.
    pub fn validate<'a>(&self, commands: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for id in [WEEKLY_MONDAY, WEEKLY_FRIDAY] {
            self.get_periodic_message(id)?;
        }
        for command in commands {
            self.get_command_message(command)?;
        }
        Ok(())
    }
}

/// Substitute the week label into a template.
pub fn render(template: &str, week: &WeekContext) -> String {
    template.replace(WEEK_PLACEHOLDER, &week.label())
}
