//! SQLite [`Dialect`] implementation.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text, so the "render
//! as parseable text" expression is the bare column and lexicographic
//! comparison inside SQL is chronological comparison. Pattern filters use
//! the `REGEXP` operator, which SQLite routes to the application-defined
//! `regexp(pattern, text)` function registered at connection setup.

use chrono::{DateTime, Utc};
use regex::Regex;
use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;
use stratum_registry::{Dialect, RegistryError};

/// Stored timestamp form; nanosecond precision keeps consecutive deploys
/// strictly ordered.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

/// Dialect specifics for SQLite targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn timestamp_expr(&self, column: &str) -> String {
        // Stored form is already parseable text.
        column.to_string()
    }

    fn format_timestamp(&self, value: &DateTime<Utc>) -> String {
        value.format(TIMESTAMP_FORMAT).to_string()
    }

    fn parse_timestamp(&self, text: &str) -> Result<DateTime<Utc>, RegistryError> {
        DateTime::parse_from_rfc3339(text)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|source| RegistryError::Timestamp {
                value: text.to_string(),
                source,
            })
    }

    fn regexp_op(&self) -> &'static str {
        "REGEXP"
    }

    fn ledger_exists(&self, conn: &Connection) -> Result<bool, RegistryError> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'changes')",
            [],
            |row| row.get(0),
        )?;
        Ok(exists)
    }
}

/// Register the two-argument `regexp(pattern, text)` function backing the
/// `REGEXP` operator.
///
/// # Errors
///
/// Returns an error if SQLite refuses the function registration.
pub fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern: String = ctx.get(0)?;
            let text: String = ctx.get(1)?;
            let re = Regex::new(&pattern)
                .map_err(|error| rusqlite::Error::UserFunctionError(Box::new(error)))?;
            Ok(re.is_match(&text))
        },
    )
}
