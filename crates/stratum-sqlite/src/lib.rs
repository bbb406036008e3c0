//! SQLite engine adapter for the stratum ledger.
//!
//! Runtime defaults are intentionally conservative:
//! - `journal_mode = WAL` to allow concurrent readers while a deploy writes
//! - `busy_timeout = 5s` to reduce transient lock failures under contention
//! - `foreign_keys = ON` to protect relational integrity in ledger tables
//!
//! Opening a connection configures pragmas and registers the `REGEXP`
//! function the search engine's pattern filters rely on; it does NOT
//! provision the ledger schema. A target database that has never been
//! deployed to legitimately has no ledger; call [`ensure_ledger`] before
//! the first deploy.

pub mod dialect;
pub mod migrations;
pub mod schema;

pub use dialect::SqliteDialect;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::{path::Path, time::Duration};

/// Busy timeout used for ledger connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) a target database, apply runtime pragmas, and register
/// the `REGEXP` function.
///
/// # Errors
///
/// Returns an error if opening or configuring the database fails.
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create target db directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("open target database {}", path.display()))?;
    configure_connection(&conn).context("configure sqlite pragmas")?;
    Ok(conn)
}

/// In-memory variant of [`open`], used by tests and dry runs.
///
/// # Errors
///
/// Returns an error if opening or configuring the database fails.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory database")?;
    configure_connection(&conn).context("configure sqlite pragmas")?;
    Ok(conn)
}

/// Provision the ledger schema, migrating to the latest version.
///
/// Idempotent; safe to call before every deploy.
///
/// # Errors
///
/// Returns an error if a migration fails.
pub fn ensure_ledger(conn: &mut Connection) -> Result<()> {
    let version = migrations::migrate(conn).context("apply ledger migrations")?;
    tracing::debug!(version, "ledger schema ready");
    Ok(())
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    dialect::register_regexp(conn)?;
    Ok(())
}
