//! Weekly maintenance state machine.
//!
//! Everything here is pure: the bot reads the persisted state, asks
//! [`evaluate`] what to do and then commits and sends on its own.

use crate::error::Error;

/// Progress of one maintenance week.
///
/// Variant order is the monotonic order of the cycle; `Done` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WeeklyState {
    /// No record exists for the week.
    None,
    /// Monday reminder sent.
    Fresh,
    /// Friday reminder sent.
    ReminderSent,
    /// Maintenance acknowledged.
    Done,
}

impl WeeklyState {
    /// Stored integer tag. `None` is never written.
    pub fn code(self) -> Option<i64> {
        match self {
            WeeklyState::None => None,
            WeeklyState::Fresh => Some(0),
            WeeklyState::ReminderSent => Some(1),
            WeeklyState::Done => Some(2),
        }
    }

    /// Raw store value for this state.
    pub fn encode(self) -> Option<String> {
        self.code().map(|c| c.to_string())
    }

    /// Decode a raw store value. Absent means `None`.
    pub fn decode(raw: Option<&str>) -> Result<Self, Error> {
        let Some(raw) = raw else {
            return Ok(WeeklyState::None);
        };

        match raw.trim().parse::<i64>() {
            // Older deployments wrote -1 for "no state".
            Ok(-1) => Ok(WeeklyState::None),
            Ok(0) => Ok(WeeklyState::Fresh),
            Ok(1) => Ok(WeeklyState::ReminderSent),
            Ok(2) => Ok(WeeklyState::Done),
            _ => Err(Error::StateDecode(raw.to_string())),
        }
    }

    /// Decode, falling back to `Fresh` on garbage so neither the Monday
    /// reminder is repeated nor the week is claimed done.
    pub fn decode_or_fresh(raw: Option<&str>) -> Self {
        Self::decode(raw).unwrap_or_else(|e| {
            tracing::error!("{}. Falling back to {:?}", e, WeeklyState::Fresh);
            WeeklyState::Fresh
        })
    }
}

impl std::fmt::Display for WeeklyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeeklyState::None => write!(f, "none"),
            WeeklyState::Fresh => write!(f, "fresh"),
            WeeklyState::ReminderSent => write!(f, "reminder_sent"),
            WeeklyState::Done => write!(f, "done"),
        }
    }
}

/// Event fed into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    MondayTick,
    FridayTick,
    OtherDayTick,
    DoneCommand,
    HelpCommand,
}

impl Trigger {
    /// Whether evaluating this trigger needs the persisted state at all.
    pub fn is_stateful(self) -> bool {
        !matches!(self, Trigger::OtherDayTick | Trigger::HelpCommand)
    }
}

/// Message the caller should send after committing the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outbound {
    MondayReminder,
    FridayReminder,
    DoneSuccess,
    /// Only sent when a failure template is configured.
    AlreadyDone,
    Help,
}

/// Result of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: WeeklyState,
    pub message: Option<Outbound>,
    /// Set for the recovery path where Friday finds no record for the week.
    pub anomaly: bool,
}

impl Transition {
    fn to(next: WeeklyState, message: Outbound) -> Self {
        Self {
            next,
            message: Some(message),
            anomaly: false,
        }
    }

    fn stay(current: WeeklyState) -> Self {
        Self {
            next: current,
            message: None,
            anomaly: false,
        }
    }
}

/// Decide the next state and outbound message for `trigger`.
pub fn evaluate(current: WeeklyState, trigger: Trigger) -> Transition {
    use WeeklyState as S;

    match (current, trigger) {
        (S::None, Trigger::MondayTick) => Transition::to(S::Fresh, Outbound::MondayReminder),
        (_, Trigger::MondayTick) => Transition::stay(current),

        (S::None, Trigger::FridayTick) => Transition {
            next: S::ReminderSent,
            message: Some(Outbound::MondayReminder),
            anomaly: true,
        },
        (S::Fresh, Trigger::FridayTick) => {
            Transition::to(S::ReminderSent, Outbound::FridayReminder)
        }
        (_, Trigger::FridayTick) => Transition::stay(current),

        (S::Done, Trigger::DoneCommand) => Transition {
            next: S::Done,
            message: Some(Outbound::AlreadyDone),
            anomaly: false,
        },
        (_, Trigger::DoneCommand) => Transition::to(S::Done, Outbound::DoneSuccess),

        (_, Trigger::HelpCommand) => Transition {
            next: current,
            message: Some(Outbound::Help),
            anomaly: false,
        },

        (_, Trigger::OtherDayTick) => Transition::stay(current),
    }
}
