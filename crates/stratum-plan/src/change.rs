//! Changes, tags, and dependencies as parsed from a migration plan.
//!
//! Identities are content-derived: a change or tag id is the BLAKE3 hex
//! digest of a canonical info block covering every field that makes the
//! object what it is. Two plans that author the same change byte-for-byte
//! agree on its id; editing the note, planner, timestamp, or dependency
//! list produces a new id.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;

/// The two dependency relationships a change can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// The target change must already be deployed.
    Require,
    /// The target change must not be deployed.
    Conflict,
}

impl DependencyKind {
    /// Canonical lowercase form stored in the `dependencies.type` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Require => "require",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A require/conflict declaration on a change.
///
/// `spec` is the dependency exactly as written in the plan (it may name a
/// change, a tag, or a `change@tag` rev). `resolved_id` carries the target
/// change id when plan resolution was able to pin one down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub kind: DependencyKind,
    pub spec: String,
    pub resolved_id: Option<String>,
}

impl Dependency {
    #[must_use]
    pub fn require(spec: impl Into<String>) -> Self {
        Self {
            kind: DependencyKind::Require,
            spec: spec.into(),
            resolved_id: None,
        }
    }

    #[must_use]
    pub fn conflict(spec: impl Into<String>) -> Self {
        Self {
            kind: DependencyKind::Conflict,
            spec: spec.into(),
            resolved_id: None,
        }
    }

    /// Same dependency with the target change id filled in.
    #[must_use]
    pub fn resolved_as(mut self, id: impl Into<String>) -> Self {
        self.resolved_id = Some(id.into());
        self
    }
}

/// A release tag attached to a change in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Display name without the `@` sigil.
    pub name: String,
    pub note: String,
    pub planner: super::Identity,
    pub planned_at: DateTime<Utc>,
}

impl Tag {
    /// Content-derived tag id, scoped by the owning project.
    #[must_use]
    pub fn id(&self, project: &str) -> String {
        let mut info = String::new();
        let _ = writeln!(info, "project {project}");
        let _ = writeln!(info, "tag @{}", self.name);
        let _ = writeln!(info, "planner {}", self.planner);
        let _ = writeln!(info, "date {}", canonical_ts(&self.planned_at));
        let _ = write!(info, "{}", self.note);
        blake3::hash(info.as_bytes()).to_hex().to_string()
    }
}

/// A single schema migration unit as parsed from the plan.
///
/// The ledger never mutates one of these; it records deploy/revert/fail
/// outcomes for it and copies its fields into the ledger tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Display name, unique within the plan at any point in time.
    pub name: String,
    /// Owning project name.
    pub project: String,
    pub note: String,
    pub planner: super::Identity,
    /// Original authoring time from the plan line.
    pub planned_at: DateTime<Utc>,
    /// Tags attached to this change, in plan order.
    pub tags: Vec<Tag>,
    /// Require/conflict declarations, in plan order.
    pub dependencies: Vec<Dependency>,
}

impl Change {
    /// Content-derived change id.
    #[must_use]
    pub fn id(&self) -> String {
        let mut info = String::new();
        let _ = writeln!(info, "project {}", self.project);
        let _ = writeln!(info, "change {}", self.name);
        let _ = writeln!(info, "planner {}", self.planner);
        let _ = writeln!(info, "date {}", canonical_ts(&self.planned_at));
        for kind in [DependencyKind::Require, DependencyKind::Conflict] {
            let specs = self.dependency_specs(kind);
            if !specs.is_empty() {
                let _ = writeln!(info, "{kind}s {}", specs.join(" "));
            }
        }
        let _ = write!(info, "{}", self.note);
        blake3::hash(info.as_bytes()).to_hex().to_string()
    }

    /// Tag display names in plan order.
    #[must_use]
    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|tag| tag.name.as_str()).collect()
    }

    /// Dependency specs of one kind, in plan order.
    #[must_use]
    pub fn dependency_specs(&self, kind: DependencyKind) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|dep| dep.kind == kind)
            .map(|dep| dep.spec.as_str())
            .collect()
    }
}

/// Timestamp form used inside id info blocks. Seconds precision is enough:
/// plan files do not carry sub-second authoring times.
fn canonical_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
