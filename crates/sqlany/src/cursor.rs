//! Row cursor over an executed statement.

use crate::native::{ColumnDescriptor, NativeApi};
use crate::statement::Statement;
use sqlany_core::driver;
use sqlany_core::error::{UsageError, UsageErrorKind};
use sqlany_core::{Error, Fetch, Result, Row, Value};

/// The result set of one execution of a [`Statement`].
///
/// Exhaustion is reported as [`Fetch::EndOfData`] (or `None` from the
/// iterator), never as an error. After a native fault the cursor is
/// abandoned and every further call fails.
pub struct Rows<'stmt, 'conn, A: NativeApi> {
    stmt: &'stmt mut Statement<'conn, A>,
    exhausted: bool,
    abandoned: bool,
}

impl<'stmt, 'conn, A: NativeApi> Rows<'stmt, 'conn, A> {
    pub(crate) fn new(stmt: &'stmt mut Statement<'conn, A>) -> Self {
        let exhausted = stmt.columns().is_empty();
        Self {
            stmt,
            exhausted,
            abandoned: false,
        }
    }

    /// Result column names, in order.
    pub fn columns(&self) -> &[String] {
        self.stmt.column_names()
    }

    pub fn column_descriptors(&self) -> &[ColumnDescriptor] {
        self.stmt.columns()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// Decode the next row into `dest`.
    #[allow(clippy::result_large_err)]
    pub fn next_into(&mut self, dest: &mut [Value]) -> Result<Fetch> {
        if self.abandoned {
            return Err(Error::Usage(UsageError {
                kind: UsageErrorKind::CursorAbandoned,
                message: "result set was abandoned after a native error".to_string(),
            }));
        }
        if self.exhausted {
            return Ok(Fetch::EndOfData);
        }
        let width = self.stmt.columns().len();
        if dest.len() < width {
            return Err(Error::Usage(UsageError {
                kind: UsageErrorKind::DestinationTooSmall,
                message: format!("{} destination slots for {} columns", dest.len(), width),
            }));
        }

        match self.stmt.fetch_into(dest) {
            Ok(Fetch::EndOfData) => {
                self.exhausted = true;
                Ok(Fetch::EndOfData)
            }
            Ok(Fetch::Row) => Ok(Fetch::Row),
            Err(e) => {
                if matches!(e, Error::Native(_) | Error::Usage(_)) {
                    self.abandoned = true;
                    tracing::warn!(sql = %self.stmt.sql(), error = %e, "Abandoning result set");
                }
                Err(e)
            }
        }
    }

    /// Fetch the next row, or `None` once the result set is exhausted.
    #[allow(clippy::result_large_err)]
    pub fn fetch(&mut self) -> Result<Option<Row>> {
        let mut values = vec![Value::Null; self.stmt.columns().len()];
        match self.next_into(&mut values)? {
            Fetch::Row => Ok(Some(Row::with_columns(self.stmt.column_info(), values))),
            Fetch::EndOfData => Ok(None),
        }
    }

    /// Drain the remaining rows.
    #[allow(clippy::result_large_err)]
    pub fn collect_rows(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Stop reading. The open native cursor is reset by the next execute or
    /// by closing the statement.
    pub fn close(self) {}
}

impl<A: NativeApi> Iterator for Rows<'_, '_, A> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.abandoned {
            return None;
        }
        self.fetch().transpose()
    }
}

impl<A: NativeApi> driver::Rows for Rows<'_, '_, A> {
    fn columns(&self) -> &[String] {
        Rows::columns(self)
    }

    fn next_into(&mut self, dest: &mut [Value]) -> Result<Fetch> {
        Rows::next_into(self, dest)
    }

    fn collect_rows(&mut self) -> Result<Vec<Row>> {
        Rows::collect_rows(self)
    }
}
