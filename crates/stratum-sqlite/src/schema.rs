//! Canonical SQLite ledger schema.
//!
//! Five tables inside the target database:
//! - `projects` registers plan identities (name + optional URI)
//! - `changes`, `tags`, `dependencies` hold the currently-deployed
//!   projection; rows appear on deploy and vanish on revert
//! - `events` is the append-only audit trail that outlives reverts
//!
//! Timestamps are RFC 3339 UTC text with nanosecond precision, so string
//! order is commit order and no dialect conversion is needed on read.

/// Migration v1: the five ledger tables.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS projects (
    project        TEXT PRIMARY KEY,
    uri            TEXT UNIQUE,
    created_at     TEXT NOT NULL,
    creator_name   TEXT NOT NULL,
    creator_email  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS changes (
    change_id       TEXT PRIMARY KEY,
    change          TEXT NOT NULL,
    project         TEXT NOT NULL REFERENCES projects(project),
    note            TEXT NOT NULL DEFAULT '',
    committed_at    TEXT NOT NULL,
    committer_name  TEXT NOT NULL,
    committer_email TEXT NOT NULL,
    planned_at      TEXT NOT NULL,
    planner_name    TEXT NOT NULL,
    planner_email   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    tag_id          TEXT PRIMARY KEY,
    tag             TEXT NOT NULL,
    project         TEXT NOT NULL REFERENCES projects(project),
    change_id       TEXT NOT NULL REFERENCES changes(change_id),
    note            TEXT NOT NULL DEFAULT '',
    committed_at    TEXT NOT NULL,
    committer_name  TEXT NOT NULL,
    committer_email TEXT NOT NULL,
    planned_at      TEXT NOT NULL,
    planner_name    TEXT NOT NULL,
    planner_email   TEXT NOT NULL,
    UNIQUE (project, tag)
);

CREATE TABLE IF NOT EXISTS dependencies (
    change_id     TEXT NOT NULL REFERENCES changes(change_id) ON DELETE CASCADE,
    type          TEXT NOT NULL CHECK (type IN ('require', 'conflict')),
    dependency    TEXT NOT NULL,
    dependency_id TEXT,
    PRIMARY KEY (change_id, dependency)
);

CREATE TABLE IF NOT EXISTS events (
    event           TEXT NOT NULL CHECK (event IN ('deploy', 'revert', 'fail')),
    change_id       TEXT NOT NULL,
    change          TEXT NOT NULL,
    project         TEXT NOT NULL REFERENCES projects(project),
    note            TEXT NOT NULL DEFAULT '',
    requires        TEXT NOT NULL DEFAULT '',
    conflicts       TEXT NOT NULL DEFAULT '',
    tags            TEXT NOT NULL DEFAULT '',
    committed_at    TEXT NOT NULL,
    committer_name  TEXT NOT NULL,
    committer_email TEXT NOT NULL,
    planned_at      TEXT NOT NULL,
    planner_name    TEXT NOT NULL,
    planner_email   TEXT NOT NULL,
    PRIMARY KEY (change_id, committed_at)
);
";

/// Migration v2: read-path indexes for state, naming, and search queries.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_changes_project_committed
    ON changes(project, committed_at DESC);

CREATE INDEX IF NOT EXISTS idx_tags_change
    ON tags(change_id, committed_at);

CREATE INDEX IF NOT EXISTS idx_tags_project_committed
    ON tags(project, committed_at);

CREATE INDEX IF NOT EXISTS idx_dependencies_dependency_id
    ON dependencies(dependency_id, type, change_id);

CREATE INDEX IF NOT EXISTS idx_events_project_committed
    ON events(project, committed_at DESC);
";

/// Indexes expected by state/naming/search query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_changes_project_committed",
    "idx_tags_change",
    "idx_tags_project_committed",
    "idx_dependencies_dependency_id",
    "idx_events_project_committed",
];
