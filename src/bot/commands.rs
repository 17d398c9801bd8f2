//! Bot command table and inbound text routing.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::state::Trigger;

/// Every bot command starts with this character.
pub const BOT_COMMAND_DELIMITER: char = '!';

/// Longest accepted inbound command, in characters.
pub const MAX_COMMAND_LENGTH: usize = 128;

pub const HELP_COMMAND: &str = "!hilfe";
pub const DONE_COMMAND: &str = "!erledigt";

/// What a registered command does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    Help,
    MaintenanceDone,
}

impl CommandAction {
    pub fn trigger(self) -> Trigger {
        match self {
            CommandAction::Help => Trigger::HelpCommand,
            CommandAction::MaintenanceDone => Trigger::DoneCommand,
        }
    }
}

/// Mapping from exact command text to its action, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    commands: BTreeMap<String, CommandAction>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bot's built-in commands.
    pub fn standard() -> Result<Self> {
        let mut table = Self::new();
        table.register(HELP_COMMAND, CommandAction::Help)?;
        table.register(DONE_COMMAND, CommandAction::MaintenanceDone)?;
        Ok(table)
    }

    /// Add a command. A name may only be registered once.
    pub fn register(&mut self, command: &str, action: CommandAction) -> Result<()> {
        if let Some(existing) = self.commands.get(command) {
            return Err(Error::DuplicateCommand(format!(
                "{} (already bound to {:?})",
                command, existing
            )));
        }
        self.commands.insert(command.to_string(), action);
        Ok(())
    }

    pub fn get(&self, command: &str) -> Option<CommandAction> {
        self.commands.get(command).copied()
    }

    /// Registered command names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Route inbound text to a command.
    ///
    /// Non-commands and unknown commands yield `Ok(None)`; input over
    /// [`MAX_COMMAND_LENGTH`] is an error. Neither produces a chat reply.
    pub fn resolve<'a>(&self, text: &'a str) -> Result<Option<(&'a str, CommandAction)>> {
        if !text.starts_with(BOT_COMMAND_DELIMITER) {
            tracing::debug!("Received message that does not appear to be a command. Do nothing");
            return Ok(None);
        }

        let len = text.chars().count();
        if len > MAX_COMMAND_LENGTH {
            return Err(Error::CommandTooLong {
                len,
                max: MAX_COMMAND_LENGTH,
            });
        }

        let command = text.trim();
        tracing::debug!("Received bot command: {}", command);
        match self.get(command) {
            Some(action) => Ok(Some((command, action))),
            None => {
                tracing::warn!("Received unknown bot command '{}'. Ignore", command);
                Ok(None)
            }
        }
    }
}
