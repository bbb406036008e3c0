//! Lazy row-at-a-time sequences over an open statement.
//!
//! State and event queries can return arbitrarily long histories, so they
//! hand back a [`Cursor`] instead of a collected `Vec`. A cursor owns its
//! prepared statement and bound parameters; calling [`Cursor::rows`] opens
//! the underlying row stream once and yields a [`Rows`] iterator that
//! decodes each row on demand. The sequence is finite, forward-only, and
//! non-restartable; dropping it releases the statement.

use rusqlite::{Statement, ToSql, params_from_iter};

use crate::dialect::Dialect;
use crate::error::RegistryError;

/// Decodes one backend row into a typed record.
pub(crate) type DecodeFn<D, T> = fn(&rusqlite::Row<'_>, &D) -> Result<T, RegistryError>;

/// A prepared, parameterized query whose rows have not been fetched yet.
pub struct Cursor<'a, D, T> {
    stmt: Statement<'a>,
    params: Vec<Box<dyn ToSql>>,
    dialect: &'a D,
    decode: DecodeFn<D, T>,
}

impl<'a, D: Dialect, T> Cursor<'a, D, T> {
    pub(crate) fn new(
        stmt: Statement<'a>,
        params: Vec<Box<dyn ToSql>>,
        dialect: &'a D,
        decode: DecodeFn<D, T>,
    ) -> Self {
        Self {
            stmt,
            params,
            dialect,
            decode,
        }
    }

    /// Execute the statement and return the row iterator.
    ///
    /// The backend cursor stays open until the iterator is exhausted or
    /// dropped; callers that interleave other statements on the same
    /// connection should drain it first if their backend requires it.
    ///
    /// # Errors
    ///
    /// Returns an error if binding parameters or starting the query fails.
    pub fn rows(&mut self) -> Result<Rows<'_, D, T>, RegistryError> {
        let params_ref: Vec<&dyn ToSql> = self.params.iter().map(AsRef::as_ref).collect();
        let rows = self.stmt.query(params_from_iter(params_ref))?;
        Ok(Rows {
            rows,
            dialect: self.dialect,
            decode: self.decode,
        })
    }
}

/// The open row stream of a [`Cursor`]; each `next` fetches and decodes one
/// row from the backend.
pub struct Rows<'s, D, T> {
    rows: rusqlite::Rows<'s>,
    dialect: &'s D,
    decode: DecodeFn<D, T>,
}

impl<D: Dialect, T> Iterator for Rows<'_, D, T> {
    type Item = Result<T, RegistryError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rows.next() {
            Ok(Some(row)) => Some((self.decode)(row, self.dialect)),
            Ok(None) => None,
            Err(error) => Some(Err(error.into())),
        }
    }
}
