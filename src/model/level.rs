use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::error::LogError;

/// Priority assigned to level names outside the severity table.
pub const UNKNOWN_PRIORITY: u8 = 99;

/// Severity levels, most severe first. The discriminant is the priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Level {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl Level {
    pub const ALL: [Level; 8] = [
        Level::Emergency,
        Level::Alert,
        Level::Critical,
        Level::Error,
        Level::Warning,
        Level::Notice,
        Level::Info,
        Level::Debug,
    ];

    pub fn priority(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Emergency => "emergency",
            Level::Alert => "alert",
            Level::Critical => "critical",
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Notice => "notice",
            Level::Info => "info",
            Level::Debug => "debug",
        }
    }

    pub fn from_priority(priority: u8) -> Option<Level> {
        Level::ALL.into_iter().find(|level| level.priority() == priority)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| LogError::InvalidOption(format!("unknown level: {}", s)))
    }
}

impl TryFrom<String> for Level {
    type Error = LogError;

    fn try_from(value: String) -> Result<Self, LogError> {
        value.parse()
    }
}

/// Resolves a level name to its priority. Matching ignores case; names
/// outside the table resolve to [`UNKNOWN_PRIORITY`].
pub fn priority_of(level: &str) -> u8 {
    level
        .parse::<Level>()
        .map(Level::priority)
        .unwrap_or(UNKNOWN_PRIORITY)
}

/// Reverse lookup of a priority; `"unknown"` when nothing matches.
pub fn level_name(priority: u8) -> &'static str {
    Level::from_priority(priority).map_or("unknown", Level::as_str)
}
