//! CLI commands for RosiBot using clap.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::bot::commands::CommandTable;
use crate::config::{load_settings, load_settings_from, Settings, SettingsOverrides};
use crate::messages::Messages;
use crate::state::WeeklyState;
use crate::store::{SqliteStore, StateStore};
use crate::telegram::run_telegram_daemon;
use crate::week::{Clock, SystemClock, WeekKey};

/// RosiBot - weekly maintenance reminders for the Riesige Rosi boulder wall.
#[derive(Parser, Debug)]
#[command(name = "rosibot")]
#[command(version)]
#[command(about = "RosiBot - weekly maintenance reminders for a Telegram group", long_about = None)]
pub struct Commands {
    /// Settings file (default: ~/.rosibot/settings.json)
    #[arg(long, global = true, env = "ROSIBOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bot until Ctrl+C
    Start(StartArgs),

    /// Show the state of the current week
    Status,

    /// Forget a week's state so its reminders are sent again
    Reset {
        /// Week to reset, e.g. 2024-W34 (default: current week)
        #[arg(long)]
        week: Option<WeekKey>,
    },

    /// Validate settings and message templates
    Check,
}

#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Telegram bot token
    #[arg(long, env = "ROSIBOT_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Chat id of the maintenance group
    #[arg(long, env = "ROSIBOT_GROUP_ID", allow_hyphen_values = true)]
    pub group_id: Option<i64>,

    /// Clear this week's state on startup (resends reminders)
    #[arg(long, env = "ROSIBOT_DEBUG")]
    pub debug: bool,

    /// Heartbeat interval in seconds
    #[arg(long, env = "ROSIBOT_INTERVAL")]
    pub interval: Option<u64>,

    /// Message template file
    #[arg(long, env = "ROSIBOT_MESSAGES")]
    pub messages: Option<PathBuf>,

    /// SQLite state database
    #[arg(long, env = "ROSIBOT_DATABASE")]
    pub database: Option<PathBuf>,
}

impl From<&StartArgs> for SettingsOverrides {
    fn from(args: &StartArgs) -> Self {
        Self {
            bot_token: args.bot_token.clone(),
            group_id: args.group_id,
            debug: args.debug,
            interval_seconds: args.interval,
            messages_file: args.messages.clone(),
            database: args.database.clone(),
        }
    }
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        let settings = self.settings()?;

        match &self.command {
            Command::Start(args) => cmd_start(settings, args).await,
            Command::Status => cmd_status(&settings).await,
            Command::Reset { week } => cmd_reset(&settings, *week).await,
            Command::Check => cmd_check(&settings),
        }
    }

    fn settings(&self) -> Result<Settings> {
        let settings = match &self.config {
            Some(path) => load_settings_from(path),
            None => load_settings(),
        };
        settings.context("Failed to load settings")
    }
}

async fn cmd_start(mut settings: Settings, args: &StartArgs) -> Result<()> {
    settings.apply(args.into())?;
    run_telegram_daemon(settings).await?;
    Ok(())
}

async fn cmd_status(settings: &Settings) -> Result<()> {
    let store = open_store(settings)?;
    let week = SystemClock.week();
    let key = week.key();

    let raw = store.get(&key).await?;
    let state = WeeklyState::decode_or_fresh(raw.as_deref());

    println!("Week:  {} ({}, {})", key, week.label(), week.weekday);
    println!("State: {}", state);
    if let Some(raw) = raw {
        println!("Raw:   {}", raw);
    }
    Ok(())
}

async fn cmd_reset(settings: &Settings, week: Option<WeekKey>) -> Result<()> {
    let store = open_store(settings)?;
    let key = week.unwrap_or_else(|| SystemClock.week().key());

    if store.delete(&key).await? {
        tracing::warn!("Cleared weekly state for {}", key);
        println!("Cleared state for {}. Reminders for this week will be sent again.", key);
    } else {
        println!("No state stored for {}.", key);
    }
    Ok(())
}

fn cmd_check(settings: &Settings) -> Result<()> {
    let path = settings.messages_path()?;
    let messages = Messages::load(&path)?;
    let commands = CommandTable::standard()?;
    messages
        .validate(commands.names())
        .with_context(|| format!("Templates in {} are incomplete", path.display()))?;

    println!("Messages:  {} OK", path.display());
    println!("Commands:  {}", commands.names().collect::<Vec<_>>().join(", "));
    println!("Database:  {}", settings.database_path()?.display());
    println!("Interval:  {}s", settings.scheduler.interval_seconds);
    match settings.telegram_credentials() {
        Ok((_, group_id)) => println!("Telegram:  group {}", group_id),
        Err(e) => println!("Telegram:  not configured ({})", e),
    }
    if settings.debug {
        println!("Debug:     on (current week is cleared on start)");
    }
    Ok(())
}

fn open_store(settings: &Settings) -> Result<SqliteStore> {
    let path = settings.database_path()?;
    SqliteStore::open(&path).with_context(|| format!("Failed to open {}", path.display()))
}
