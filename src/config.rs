//! Configuration loading for RosiBot.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Get the RosiBot home directory (~/.rosibot).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".rosibot"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.rosibot/settings.json, or defaults if there is none.
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&get_settings_path()?)
}

/// Load settings from `path`, or defaults if the file does not exist.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        tracing::debug!("No settings file at {}, using defaults", path.display());
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    settings.validate()?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Telegram connection.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    /// Chat id of the maintenance group.
    pub group_id: Option<i64>,
}

/// Heartbeat configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
}

fn default_interval_seconds() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
        }
    }
}

/// RosiBot settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Clears the current week's state at startup. Resends reminders.
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Message template file. Defaults to ~/.rosibot/messages.json.
    pub messages_file: Option<PathBuf>,

    /// SQLite state database. Defaults to ~/.rosibot/state.db.
    pub database: Option<PathBuf>,
}

/// Values given on the command line or through the environment.
#[derive(Clone, Debug, Default)]
pub struct SettingsOverrides {
    pub bot_token: Option<String>,
    pub group_id: Option<i64>,
    pub debug: bool,
    pub interval_seconds: Option<u64>,
    pub messages_file: Option<PathBuf>,
    pub database: Option<PathBuf>,
}

impl Settings {
    /// Apply overrides on top of the file settings.
    pub fn apply(&mut self, overrides: SettingsOverrides) -> Result<()> {
        if let Some(token) = overrides.bot_token {
            self.telegram.bot_token = Some(token);
        }
        if let Some(group_id) = overrides.group_id {
            self.telegram.group_id = Some(group_id);
        }
        if overrides.debug {
            self.debug = true;
        }
        if let Some(interval) = overrides.interval_seconds {
            self.scheduler.interval_seconds = interval;
        }
        if let Some(path) = overrides.messages_file {
            self.messages_file = Some(path);
        }
        if let Some(path) = overrides.database {
            self.database = Some(path);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.interval_seconds == 0 {
            return Err(Error::Config(
                "scheduler.interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.telegram.bot_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(Error::Config("telegram.bot_token is empty".to_string()));
        }
        Ok(())
    }

    /// Bot token and group id, both required to connect.
    pub fn telegram_credentials(&self) -> Result<(String, i64)> {
        let token = self.telegram.bot_token.clone().ok_or_else(|| {
            Error::Config(
                "No bot token configured (telegram.bot_token or ROSIBOT_BOT_TOKEN)".to_string(),
            )
        })?;
        let group_id = self.telegram.group_id.ok_or_else(|| {
            Error::Config(
                "No group configured (telegram.group_id or ROSIBOT_GROUP_ID)".to_string(),
            )
        })?;
        Ok((token, group_id))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.interval_seconds)
    }

    pub fn messages_path(&self) -> Result<PathBuf> {
        match &self.messages_file {
            Some(path) => Ok(path.clone()),
            None => Ok(get_home_dir()?.join("messages.json")),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => Ok(get_home_dir()?.join("state.db")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = load_settings_from(&temp_dir.path().join("settings.json")).unwrap();
        assert!(!settings.debug);
        assert_eq!(settings.interval(), Duration::from_secs(60));
        assert!(settings.telegram_credentials().is_err());
    }

    #[test]
    fn test_load_settings() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "telegram": { "bot_token": "123:abc", "group_id": -10042 },
                "debug": true,
                "scheduler": { "interval_seconds": 5 },
                "database": "/var/lib/rosibot/state.db"
            }"#,
        )
        .unwrap();

        let settings = load_settings_from(&path).unwrap();
        assert!(settings.debug);
        assert_eq!(settings.interval(), Duration::from_secs(5));
        assert_eq!(
            settings.telegram_credentials().unwrap(),
            ("123:abc".to_string(), -10042)
        );
        assert_eq!(
            settings.database_path().unwrap(),
            PathBuf::from("/var/lib/rosibot/state.db")
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{"scheduler": {"interval_seconds": 0}}"#).unwrap();
        assert!(matches!(load_settings_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_overrides() {
        let mut settings = Settings::default();
        settings
            .apply(SettingsOverrides {
                bot_token: Some("t".to_string()),
                group_id: Some(7),
                debug: true,
                interval_seconds: Some(10),
                ..Default::default()
            })
            .unwrap();

        assert!(settings.debug);
        assert_eq!(settings.telegram_credentials().unwrap(), ("t".to_string(), 7));
        assert_eq!(settings.interval(), Duration::from_secs(10));

        // A flag that is not set keeps the file value.
        settings.apply(SettingsOverrides::default()).unwrap();
        assert!(settings.debug);

        assert!(settings
            .apply(SettingsOverrides {
                interval_seconds: Some(0),
                ..Default::default()
            })
            .is_err());
    }
}
