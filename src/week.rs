//! Calendar helpers: ISO week context, week keys and the clock seam.

use chrono::{Datelike, NaiveDate, Weekday};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::state::Trigger;

/// Date information the weekly cycle runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekContext {
    /// ISO week-numbering year.
    pub year: i32,
    pub weekday: Weekday,
    pub iso_week: u32,
}

impl WeekContext {
    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            weekday: date.weekday(),
            iso_week: iso.week(),
        }
    }

    /// Store key of the maintenance cycle this date belongs to.
    pub fn key(&self) -> WeekKey {
        WeekKey::new(self.year, self.iso_week)
    }

    /// Human label substituted for `{KW}` in templates.
    pub fn label(&self) -> String {
        format!("KW {}", self.iso_week)
    }

    /// Classify a scheduler wake on this day.
    pub fn tick(&self) -> Trigger {
        match self.weekday {
            Weekday::Mon => Trigger::MondayTick,
            Weekday::Fri => Trigger::FridayTick,
            _ => Trigger::OtherDayTick,
        }
    }
}

/// Identifies one ISO calendar week, e.g. `2024-W34`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekKey {
    year: i32,
    week: u32,
}

impl WeekKey {
    pub fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }

}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

impl FromStr for WeekKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::Config(format!("Invalid week '{}'. Use YYYY-Www", s));

        let (year, week) = s.trim().split_once("-W").ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let week: u32 = week.parse().map_err(|_| invalid())?;

        // Week 53 only exists in some years.
        if NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).is_none() {
            return Err(invalid());
        }

        Ok(Self::new(year, week))
    }
}

/// Source of "today" for the bot and scheduler.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    fn week(&self) -> WeekContext {
        WeekContext::from_date(self.today())
    }
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// Settable clock for tests.
#[cfg(test)]
pub struct FixedClock {
    date: std::sync::Mutex<NaiveDate>,
}

#[cfg(test)]
impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: std::sync::Mutex::new(date),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        *self.date.lock().unwrap() = date;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.date.lock().unwrap()
    }
}
