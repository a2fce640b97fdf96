//! Prepared statements.
//!
//! A [`Statement`] walks `Created -> Described -> Bound -> Executed ->
//! Fetching -> Closed`. Parameter count and result columns are read once at
//! prepare time. Re-executing a statement that left a result set open
//! resets the native cursor first.

use crate::classify;
use crate::config::to_c_string;
use crate::connection::Connection;
use crate::cursor::Rows;
use crate::native::{ColumnDescriptor, NativeApi, native_index};
use crate::types::{self, BoundParameter};
use sqlany_core::driver;
use sqlany_core::error::{ArgumentCountError, UsageError, UsageErrorKind};
use sqlany_core::{ColumnInfo, Error, ExecResult, Fetch, Result, Row, Value};
use std::sync::Arc;

/// Where a statement is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Native handle allocated, nothing described yet.
    Created,
    /// Parameter count and columns are known.
    Described,
    /// Arguments are bound for the next execute.
    Bound,
    /// Executed; a result set may be open but nothing was fetched.
    Executed,
    /// At least one row has been fetched from the open result set.
    Fetching,
    Closed,
}

fn statement_closed() -> Error {
    Error::Usage(UsageError {
        kind: UsageErrorKind::StatementClosed,
        message: "statement is closed".to_string(),
    })
}

/// A prepared statement on a [`Connection`].
pub struct Statement<'conn, A: NativeApi> {
    conn: &'conn Connection<A>,
    handle: Option<A::Stmt>,
    sql: String,
    param_count: usize,
    columns: Vec<ColumnDescriptor>,
    column_info: Arc<ColumnInfo>,
    state: StatementState,
}

impl<'conn, A: NativeApi> Statement<'conn, A> {
    #[allow(clippy::result_large_err)]
    pub(crate) fn prepare(conn: &'conn Connection<A>, sql: &str) -> Result<Self> {
        let api = conn.api();
        let native_conn = conn.handle()?;
        let c_sql = to_c_string(sql, "SQL text")?;

        let handle = api
            .prepare(native_conn, &c_sql)
            .ok_or_else(|| classify::fault(api.error(native_conn), Some(sql)))?;

        let mut stmt = Self {
            conn,
            handle: Some(handle),
            sql: sql.to_string(),
            param_count: 0,
            columns: Vec::new(),
            column_info: Arc::new(ColumnInfo::new(Vec::new())),
            state: StatementState::Created,
        };
        // On failure the half-built statement is dropped, which frees the handle.
        stmt.describe()?;

        tracing::debug!(
            sql = %stmt.sql,
            params = stmt.param_count,
            columns = stmt.columns.len(),
            "Prepared statement"
        );
        Ok(stmt)
    }

    #[allow(clippy::result_large_err)]
    fn describe(&mut self) -> Result<()> {
        let api = self.conn.api();
        let native_conn = self.conn.handle()?;
        let handle = self.handle.as_ref().ok_or_else(statement_closed)?;

        let params = api.num_params(handle);
        let param_count = usize::try_from(params)
            .map_err(|_| classify::fault(api.error(native_conn), Some(&self.sql)))?;

        let cols = api.num_cols(handle);
        let col_count = usize::try_from(cols)
            .map_err(|_| classify::fault(api.error(native_conn), Some(&self.sql)))?;

        let mut columns = Vec::with_capacity(col_count);
        for i in 0..col_count {
            let column = api
                .column_info(handle, native_index(i))
                .ok_or_else(|| classify::fault(api.error(native_conn), Some(&self.sql)))?;
            columns.push(column);
        }

        self.param_count = param_count;
        self.column_info = Arc::new(ColumnInfo::new(
            columns.iter().map(|c| c.name.clone()).collect(),
        ));
        self.columns = columns;
        self.state = StatementState::Described;
        Ok(())
    }

    /// The SQL text this statement was prepared from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of placeholders.
    pub fn num_input(&self) -> usize {
        self.param_count
    }

    /// Result column descriptors. Empty for statements that return no rows.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column_names(&self) -> &[String] {
        self.column_info.names()
    }

    pub(crate) fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.column_info)
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    fn has_open_result_set(&self) -> bool {
        !self.columns.is_empty()
            && matches!(
                self.state,
                StatementState::Executed | StatementState::Fetching
            )
    }

    /// Bind `args` and execute.
    #[allow(clippy::result_large_err)]
    fn execute(&mut self, args: &[Value]) -> Result<()> {
        let api = self.conn.api();
        let native_conn = self.conn.handle()?;
        let handle = self.handle.as_ref().ok_or_else(statement_closed)?;

        if args.len() != self.param_count {
            return Err(Error::ArgumentCount(ArgumentCountError {
                expected: self.param_count,
                actual: args.len(),
            }));
        }

        if self.has_open_result_set() {
            tracing::debug!(sql = %self.sql, "Resetting open result set before execute");
            if !api.reset(handle) {
                return Err(classify::fault(api.error(native_conn), Some(&self.sql)));
            }
            self.state = StatementState::Described;
        }

        // Every argument is encoded before the first bind so an unencodable
        // value leaves nothing half-bound.
        let mut bound: Vec<BoundParameter> = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let declared = api
                .describe_bind_param(handle, native_index(i))
                .ok_or_else(|| classify::fault(api.error(native_conn), Some(&self.sql)))?;
            bound.push(types::encode(i, arg, &declared)?);
        }

        for (i, param) in bound.iter().enumerate() {
            // SAFETY: `bound` is neither moved nor dropped until execute returns below
            let ok = unsafe { api.bind_param(handle, native_index(i), param) };
            if !ok {
                return Err(classify::fault(api.error(native_conn), Some(&self.sql)));
            }
        }
        if !bound.is_empty() {
            self.state = StatementState::Bound;
        }

        tracing::debug!(sql = %self.sql, args = args.len(), "Executing statement");
        let executed = api.execute(handle);
        drop(bound);
        if !executed {
            return Err(classify::fault(api.error(native_conn), Some(&self.sql)));
        }
        self.state = StatementState::Executed;
        Ok(())
    }

    /// Execute a statement that does not return rows.
    #[allow(clippy::result_large_err)]
    pub fn exec(&mut self, args: &[Value]) -> Result<ExecResult> {
        self.execute(args)?;
        let api = self.conn.api();
        let handle = self.handle.as_ref().ok_or_else(statement_closed)?;
        let affected = api.affected_rows(handle);
        Ok(ExecResult {
            rows_affected: u64::try_from(affected).unwrap_or(0),
        })
    }

    /// Execute and return a cursor over the result set.
    #[allow(clippy::result_large_err)]
    pub fn query(&mut self, args: &[Value]) -> Result<Rows<'_, 'conn, A>> {
        self.execute(args)?;
        Ok(Rows::new(self))
    }

    /// Execute and collect every row.
    #[allow(clippy::result_large_err)]
    pub fn query_rows(&mut self, args: &[Value]) -> Result<Vec<Row>> {
        self.query(args)?.collect_rows()
    }

    /// Fetch the next row of the open result set into `dest`.
    #[allow(clippy::result_large_err)]
    pub(crate) fn fetch_into(&mut self, dest: &mut [Value]) -> Result<Fetch> {
        let api = self.conn.api();
        let native_conn = self.conn.handle()?;
        let handle = self.handle.as_ref().ok_or_else(statement_closed)?;

        if !api.fetch_next(handle) {
            let outcome = classify::fetch_outcome(api.error(native_conn), Some(&self.sql));
            if outcome.is_ok() {
                tracing::debug!(sql = %self.sql, "Result set exhausted");
            }
            return outcome;
        }

        for (i, column) in self.columns.iter().enumerate() {
            let value = api
                .get_column(handle, native_index(i))
                .ok_or_else(|| classify::fault(api.error(native_conn), Some(&self.sql)))?;
            dest[i] = types::decode(column, &value)?;
        }
        self.state = StatementState::Fetching;
        Ok(Fetch::Row)
    }

    /// Close the statement. Closing twice is a no-op.
    #[allow(clippy::result_large_err)]
    pub fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            tracing::warn!(sql = %self.sql, "Statement already closed");
            return Ok(());
        };
        let api = self.conn.api();

        if self.has_open_result_set() && !api.reset(&handle) {
            if let Ok(native_conn) = self.conn.handle() {
                let err = api.error(native_conn);
                tracing::warn!(code = err.code, error = %err.message, "Reset before close failed");
            }
        }
        api.free_stmt(handle);
        self.state = StatementState::Closed;
        tracing::debug!(sql = %self.sql, "Closed statement");
        Ok(())
    }
}

impl<A: NativeApi> Drop for Statement<'_, A> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.close();
        }
    }
}

impl<'conn, A: NativeApi> driver::Statement for Statement<'conn, A> {
    type Rows<'stmt>
        = Rows<'stmt, 'conn, A>
    where
        Self: 'stmt;

    fn num_input(&self) -> usize {
        Statement::num_input(self)
    }

    fn exec(&mut self, args: &[Value]) -> Result<ExecResult> {
        Statement::exec(self, args)
    }

    fn query(&mut self, args: &[Value]) -> Result<Rows<'_, 'conn, A>> {
        Statement::query(self, args)
    }

    fn close(&mut self) -> Result<()> {
        Statement::close(self)
    }
}
