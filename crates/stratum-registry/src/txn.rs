//! Caller-managed transaction guard for deploy/revert units of work.

use rusqlite::Connection;

use crate::error::RegistryError;

/// Wraps one deploy or revert so its multi-statement sequence is
/// all-or-nothing.
///
/// `begin` takes the write lock up front (`BEGIN IMMEDIATE`) so a deploy
/// never discovers a conflicting writer halfway through its inserts.
/// Dropping the guard without calling [`commit`](Self::commit) rolls back.
pub struct Txn<'conn> {
    conn: &'conn Connection,
    open: bool,
}

impl<'conn> Txn<'conn> {
    /// Open a transaction on `conn`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses to begin (e.g. a transaction
    /// is already open on this connection).
    pub fn begin(conn: &'conn Connection) -> Result<Self, RegistryError> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Self { conn, open: true })
    }

    /// Make the unit of work visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; the transaction is closed
    /// either way.
    pub fn commit(mut self) -> Result<(), RegistryError> {
        self.open = false;
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Discard the unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback itself fails.
    pub fn rollback(mut self) -> Result<(), RegistryError> {
        self.open = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for Txn<'_> {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!("transaction dropped without commit, rolling back");
            if let Err(error) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(%error, "implicit rollback failed");
            }
        }
    }
}
