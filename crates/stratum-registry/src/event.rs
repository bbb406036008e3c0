//! Event kinds recorded in the ledger's audit trail.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three outcomes the event log records for a change.
///
/// The string representation is the lowercase form stored in the
/// `events.event` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// The change was deployed; `changes`/`tags`/`dependencies` rows were
    /// written alongside this event.
    Deploy,
    /// The change was reverted; its projection rows were deleted and their
    /// content captured into this event.
    Revert,
    /// The deploy script failed; nothing but this event was written.
    Fail,
}

/// Error returned when parsing an unknown event kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event kind \"{}\": expected one of deploy, revert, fail",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventKind {}

impl EventKind {
    /// All kinds, in the order deploy/revert/fail.
    pub const ALL: [Self; 3] = [Self::Deploy, Self::Revert, Self::Fail];

    /// The lowercase column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Revert => "revert",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deploy" => Ok(Self::Deploy),
            "revert" => Ok(Self::Revert),
            "fail" => Ok(Self::Fail),
            other => Err(UnknownEventKind { raw: other.into() }),
        }
    }
}
