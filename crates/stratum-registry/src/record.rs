//! Decoded ledger rows returned by state and event queries.
//!
//! These are typed snapshots read back out of the ledger tables, never raw
//! rows. Timestamps arrive decoded through the dialect; the comma-joined
//! audit columns of `events` are split back into lists.

use chrono::{DateTime, Utc};
use serde::Serialize;
use stratum_plan::Identity;

use crate::event::EventKind;

/// One currently-deployed change from the `changes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRow {
    pub change_id: String,
    /// Display name.
    pub change: String,
    pub project: String,
    pub note: String,
    /// Deployment time; defines deployment order within the project.
    pub committed_at: DateTime<Utc>,
    pub committer: Identity,
    /// Original authoring time from the plan.
    pub planned_at: DateTime<Utc>,
    pub planner: Identity,
}

/// One tag row currently attached to a deployed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRow {
    pub tag_id: String,
    /// Display name without the `@` sigil.
    pub tag: String,
    pub project: String,
    pub change_id: String,
    pub note: String,
    pub committed_at: DateTime<Utc>,
    pub committer: Identity,
    pub planned_at: DateTime<Utc>,
    pub planner: Identity,
}

/// The most recently deployed change for a project, with its tag names in
/// commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedState {
    pub change: ChangeRow,
    pub tags: Vec<String>,
}

/// One decoded row from the append-only event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub event: EventKind,
    pub change_id: String,
    pub change: String,
    pub project: String,
    pub note: String,
    /// Require specs as they stood when the event was logged.
    pub requires: Vec<String>,
    /// Conflict specs as they stood when the event was logged.
    pub conflicts: Vec<String>,
    /// Tag names as they stood when the event was logged.
    pub tags: Vec<String>,
    pub committed_at: DateTime<Utc>,
    pub committer: Identity,
    pub planned_at: DateTime<Utc>,
    pub planner: Identity,
}

/// A deployed change that requires some other change, annotated with the
/// nearest tag at or after its own commit position for display purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequiringChange {
    pub change_id: String,
    pub project: String,
    /// Display name.
    pub change: String,
    /// `None` when no tag was committed at or after this change.
    pub asof_tag: Option<String>,
}
