//! The capability surface an engine adapter supplies to the ledger.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::RegistryError;

/// SQL-dialect specifics the ledger cannot know on its own.
///
/// The ledger store is one concrete type; per-backend variation lives
/// entirely behind this trait. Implementations are expected to be cheap
/// value types; the ledger calls these methods on every query it builds.
pub trait Dialect {
    /// SQL fragment selecting `column` as text the dialect's
    /// [`parse_timestamp`](Self::parse_timestamp) can read back.
    fn timestamp_expr(&self, column: &str) -> String;

    /// The stored (native) representation of a timestamp. Representations
    /// must order lexicographically in chronological order, since
    /// `committed_at` comparisons happen inside SQL.
    fn format_timestamp(&self, value: &DateTime<Utc>) -> String;

    /// Parse a value previously selected via
    /// [`timestamp_expr`](Self::timestamp_expr).
    fn parse_timestamp(&self, text: &str) -> Result<DateTime<Utc>, RegistryError>;

    /// The dialect's pattern-match predicate operator token (e.g. `REGEXP`).
    fn regexp_op(&self) -> &'static str;

    /// Whether the ledger schema has been provisioned on this connection.
    ///
    /// A target database that has never been deployed to has no ledger
    /// tables; the earliest/latest queries use this probe to answer "no
    /// value" there instead of surfacing a missing-table error.
    fn ledger_exists(&self, conn: &Connection) -> Result<bool, RegistryError>;
}
