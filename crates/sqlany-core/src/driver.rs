//! Front-end facing driver traits.
//!
//! This module defines the abstractions a generic SQL front-end programs
//! against:
//!
//! - [`Driver`] - opens connections from an option string
//! - [`Connection`] - prepares statements and starts transactions
//! - [`Statement`] - executes a prepared statement with positional arguments
//! - [`Rows`] - walks a result set one row at a time
//! - [`Transaction`] - commits or rolls back
//!
//! Every call is synchronous and may block the calling thread while the
//! native client library performs I/O. Implementations do no internal
//! locking: a connection and the statements prepared on it must be used by
//! one logical operation at a time.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// Outcome of advancing a cursor by one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// A row was decoded into the destination slots.
    Row,
    /// The result set is exhausted. This is not an error.
    EndOfData,
}

impl Fetch {
    /// Did the fetch produce a row?
    pub const fn is_row(self) -> bool {
        matches!(self, Fetch::Row)
    }
}

/// Result of executing a statement that does not return rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecResult {
    /// Number of rows inserted, updated or deleted.
    pub rows_affected: u64,
}

/// Opens connections.
pub trait Driver {
    /// The connection type produced by this driver.
    type Connection: Connection;

    /// Open a connection using a `key=value;key=value` option string.
    fn open(&self, options: &str) -> Result<Self::Connection>;
}

/// A database connection.
pub trait Connection {
    /// Prepared statement borrowing this connection.
    type Statement<'conn>: Statement
    where
        Self: 'conn;

    /// Transaction borrowing this connection.
    type Transaction<'conn>: Transaction
    where
        Self: 'conn;

    /// Prepare a statement for repeated execution.
    fn prepare(&self, sql: &str) -> Result<Self::Statement<'_>>;

    /// Begin a transaction.
    fn begin(&self) -> Result<Self::Transaction<'_>>;

    /// Close the connection, releasing native resources.
    fn close(self) -> Result<()>;
}

/// A prepared statement.
pub trait Statement {
    /// Cursor over the rows produced by [`query`](Statement::query).
    type Rows<'stmt>: Rows
    where
        Self: 'stmt;

    /// Number of placeholders the statement expects.
    fn num_input(&self) -> usize;

    /// Execute the statement, returning the number of affected rows.
    fn exec(&mut self, args: &[Value]) -> Result<ExecResult>;

    /// Execute the statement, returning a cursor over its result set.
    fn query(&mut self, args: &[Value]) -> Result<Self::Rows<'_>>;

    /// Close the statement. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// A cursor over a result set.
pub trait Rows {
    /// Result column names, in order.
    fn columns(&self) -> &[String];

    /// Decode the next row into `dest`, which must hold at least
    /// `columns().len()` slots.
    fn next_into(&mut self, dest: &mut [Value]) -> Result<Fetch>;

    /// Drain the remaining rows.
    fn collect_rows(&mut self) -> Result<Vec<Row>> {
        let names = self.columns().to_vec();
        let columns = std::sync::Arc::new(crate::row::ColumnInfo::new(names));
        let mut rows = Vec::new();
        let mut slots = vec![Value::Null; columns.names().len()];
        while self.next_into(&mut slots)?.is_row() {
            rows.push(Row::with_columns(
                std::sync::Arc::clone(&columns),
                slots.clone(),
            ));
        }
        Ok(rows)
    }
}

/// An open transaction.
pub trait Transaction {
    /// Commit the transaction.
    fn commit(self) -> Result<()>;

    /// Roll back the transaction.
    fn rollback(self) -> Result<()>;
}
