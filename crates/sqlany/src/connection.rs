//! SQL Anywhere connection and transaction implementation.

use crate::classify::{self, Classified};
use crate::config::{ConnectOptions, to_c_string};
use crate::native::{ColumnDescriptor, NativeApi, native_index};
use crate::statement::Statement;
use crate::types;
use sqlany_core::driver;
use sqlany_core::error::{
    ConnectionError, ConnectionErrorKind, TransactionError, TransactionErrorKind, UsageError,
    UsageErrorKind,
};
use sqlany_core::{Error, ExecResult, Result, Row, Value};
use std::any::TypeId;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

/// Application name reported to the native library unless overridden.
pub const DEFAULT_APP_NAME: &str = "sqlany-rs";

pub(crate) const CHARSET_QUERY: &str = "select connection_property('CharSet')";
pub(crate) const IDENTITY_QUERY: &str = "select @@identity";
pub(crate) const BEGIN_TRANSACTION: &str = "BEGIN TRAN";

/// Init bookkeeping for one native library, shared by every driver over it.
struct Registration {
    holders: usize,
    api_version: u32,
}

type LibraryKey = (TypeId, usize);

/// Process-wide init state, keyed by API type and instance.
static NATIVE_INIT: LazyLock<Mutex<HashMap<LibraryKey, Registration>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn registry() -> MutexGuard<'static, HashMap<LibraryKey, Registration>> {
    NATIVE_INIT.lock().unwrap_or_else(PoisonError::into_inner)
}

struct InitState {
    app_name: String,
    /// Set once this driver holds a registration.
    api_version: Option<u32>,
}

/// A driver's handle on the native library.
///
/// Shared by the driver and every connection it opened. Each handle that
/// completed init holds one registration in [`NATIVE_INIT`]; `fini` runs
/// when the last registration across all drivers is released.
struct NativeLibrary<A: NativeApi> {
    api: A,
    state: Mutex<InitState>,
}

impl<A: NativeApi> NativeLibrary<A> {
    fn key(&self) -> LibraryKey {
        (TypeId::of::<A>(), self.api.instance_key())
    }

    #[allow(clippy::result_large_err)]
    fn ensure_init(&self) -> Result<u32> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(version) = state.api_version {
            return Ok(version);
        }

        let mut registry = registry();
        let key = self.key();
        if let Some(registration) = registry.get_mut(&key) {
            registration.holders += 1;
            state.api_version = Some(registration.api_version);
            tracing::debug!(
                api_version = registration.api_version,
                holders = registration.holders,
                "Sharing initialized SQL Anywhere client library"
            );
            return Ok(registration.api_version);
        }

        match self.api.init(&state.app_name) {
            Some(version) => {
                tracing::info!(
                    api_version = version,
                    app_name = %state.app_name,
                    "Initialized SQL Anywhere client library"
                );
                registry.insert(
                    key,
                    Registration {
                        holders: 1,
                        api_version: version,
                    },
                );
                state.api_version = Some(version);
                Ok(version)
            }
            None => Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Init,
                message: format!(
                    "failed to initialize the SQL Anywhere client library for '{}'",
                    state.app_name
                ),
                code: None,
            })),
        }
    }
}

impl<A: NativeApi> Drop for NativeLibrary<A> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.api_version.take().is_none() {
            return;
        }
        let key = self.key();
        let mut registry = registry();
        let last = match registry.get_mut(&key) {
            Some(registration) => {
                registration.holders = registration.holders.saturating_sub(1);
                registration.holders == 0
            }
            None => true,
        };
        if last {
            registry.remove(&key);
            self.api.fini();
            tracing::debug!("Finalized SQL Anywhere client library");
        }
    }
}

/// Opens connections through a [`NativeApi`].
///
/// The native library is initialized on the first successful `open`, not
/// when the driver is built, and only once per process: drivers over the
/// same library share the initialization. A failed initialization is
/// retried on the next `open`.
pub struct Driver<A: NativeApi> {
    lib: Arc<NativeLibrary<A>>,
}

impl<A: NativeApi> Driver<A> {
    /// Create a driver over the given native API.
    pub fn new(api: A) -> Self {
        Self {
            lib: Arc::new(NativeLibrary {
                api,
                state: Mutex::new(InitState {
                    app_name: DEFAULT_APP_NAME.to_string(),
                    api_version: None,
                }),
            }),
        }
    }

    /// Set the application name passed to native initialization.
    ///
    /// Has no effect once the library has been initialized.
    #[must_use]
    pub fn with_app_name(self, app_name: impl Into<String>) -> Self {
        {
            let mut state = self.lib.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.api_version.is_none() {
                state.app_name = app_name.into();
            }
        }
        self
    }

    /// The native API this driver calls.
    pub fn api(&self) -> &A {
        &self.lib.api
    }

    /// API version reported by the native library, once initialized.
    pub fn api_version(&self) -> Option<u32> {
        self.lib
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .api_version
    }

    /// Open a connection.
    #[allow(clippy::result_large_err)]
    pub fn connect(&self, options: &ConnectOptions) -> Result<Connection<A>> {
        self.lib.ensure_init()?;
        Connection::open(Arc::clone(&self.lib), options)
    }
}

impl<A: NativeApi> driver::Driver for Driver<A> {
    type Connection = Connection<A>;

    fn open(&self, options: &str) -> Result<Connection<A>> {
        self.connect(&options.parse()?)
    }
}

/// Output slot for [`Connection::query_row`].
pub(crate) enum OutSlot<'a> {
    Text(&'a mut String),
    Unsigned(&'a mut u64),
}

impl OutSlot<'_> {
    fn assign(&mut self, index: usize, value: Value) {
        if value.is_null() {
            return;
        }
        let value_type = value.type_name();
        let matched = match (self, value) {
            (OutSlot::Text(dest), Value::Text(s)) => {
                **dest = s;
                true
            }
            (OutSlot::Unsigned(dest), value) => value.as_u64().map(|v| **dest = v).is_some(),
            _ => false,
        };
        if !matched {
            tracing::debug!(
                index,
                value_type,
                "Ignoring column that does not match its output slot"
            );
        }
    }
}

/// A connection to a SQL Anywhere database.
///
/// Not safe for concurrent use: prepare, execute and fetch calls on one
/// connection must not overlap.
pub struct Connection<A: NativeApi> {
    lib: Arc<NativeLibrary<A>>,
    handle: Option<A::Conn>,
    in_transaction: Cell<bool>,
    charset: String,
}

impl<A: NativeApi> Connection<A> {
    #[allow(clippy::result_large_err)]
    fn open(lib: Arc<NativeLibrary<A>>, options: &ConnectOptions) -> Result<Self> {
        let native_options = options.to_native()?;
        let api = &lib.api;

        let handle = api.new_connection().ok_or_else(|| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Allocate,
                message: "failed to allocate a connection handle".to_string(),
                code: None,
            })
        })?;

        if !api.connect(&handle, &native_options) {
            let err = api.error(&handle);
            api.free_connection(handle);
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to connect: {}", err.message),
                code: Some(err.code),
            }));
        }

        let mut conn = Self {
            lib,
            handle: Some(handle),
            in_transaction: Cell::new(false),
            charset: String::new(),
        };

        let mut charset = String::new();
        if let Err(e) = conn.query_row(CHARSET_QUERY, &mut [OutSlot::Text(&mut charset)]) {
            conn.shutdown();
            return Err(e);
        }
        conn.charset = charset;

        tracing::info!(charset = %conn.charset, options = %options, "Connected to SQL Anywhere");
        Ok(conn)
    }

    pub(crate) fn api(&self) -> &A {
        &self.lib.api
    }

    #[allow(clippy::result_large_err)]
    pub(crate) fn handle(&self) -> Result<&A::Conn> {
        self.handle.as_ref().ok_or_else(|| {
            Error::Usage(UsageError {
                kind: UsageErrorKind::ConnectionClosed,
                message: "connection is closed".to_string(),
            })
        })
    }

    /// The character set the server reported for this connection.
    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether a transaction started with [`begin`](Self::begin) is open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction.get()
    }

    /// Prepare a statement.
    #[allow(clippy::result_large_err)]
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_, A>> {
        Statement::prepare(self, sql)
    }

    /// Prepare, execute once and close.
    #[allow(clippy::result_large_err)]
    pub fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let mut stmt = self.prepare(sql)?;
        let result = stmt.exec(args);
        let closed = stmt.close();
        let result = result?;
        closed?;
        Ok(result)
    }

    /// Prepare, execute once, collect every row and close.
    #[allow(clippy::result_large_err)]
    pub fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let mut stmt = self.prepare(sql)?;
        let rows = stmt.query_rows(args);
        let closed = stmt.close();
        let rows = rows?;
        closed?;
        Ok(rows)
    }

    /// The last value generated for an identity (autoincrement) column.
    #[allow(clippy::result_large_err)]
    pub fn last_insert_id(&self) -> Result<u64> {
        let mut id = 0;
        self.query_row(IDENTITY_QUERY, &mut [OutSlot::Unsigned(&mut id)])?;
        Ok(id)
    }

    /// Begin a transaction.
    #[allow(clippy::result_large_err)]
    pub fn begin(&self) -> Result<Transaction<'_, A>> {
        if self.in_transaction.get() {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::AlreadyActive,
                message: "a transaction is already active on this connection".to_string(),
            }));
        }
        self.execute_direct(BEGIN_TRANSACTION)?;
        self.in_transaction.set(true);
        tracing::debug!("Transaction started");
        Ok(Transaction {
            conn: self,
            finished: false,
        })
    }

    /// Close the connection.
    ///
    /// A failed disconnect is logged; the native handle is freed regardless.
    #[allow(clippy::result_large_err)]
    pub fn close(mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let api = &self.lib.api;
        if !api.disconnect(&handle) {
            let err = api.error(&handle);
            tracing::warn!(code = err.code, error = %err.message, "Disconnect failed");
        }
        api.free_connection(handle);
        self.in_transaction.set(false);
        tracing::debug!("Connection closed");
    }

    /// Run a statement with no arguments and no interest in its results.
    #[allow(clippy::result_large_err)]
    fn execute_direct(&self, sql: &str) -> Result<()> {
        let api = self.api();
        let conn = self.handle()?;
        let c_sql = to_c_string(sql, "SQL text")?;
        let stmt = api
            .execute_direct(conn, &c_sql)
            .ok_or_else(|| classify::fault(api.error(conn), Some(sql)))?;
        api.free_stmt(stmt);
        Ok(())
    }

    /// Run `sql` directly and copy the first row into `slots`.
    ///
    /// Only for internal lookups. Columns are matched to slots by position
    /// and a value whose type does not fit its slot leaves the slot as is.
    /// A query that yields no row fails with [`Error::EndOfData`].
    #[allow(clippy::result_large_err)]
    pub(crate) fn query_row(&self, sql: &str, slots: &mut [OutSlot<'_>]) -> Result<()> {
        let api = self.api();
        let conn = self.handle()?;
        let c_sql = to_c_string(sql, "SQL text")?;
        tracing::debug!(sql = %sql, "Internal query");

        let stmt = api
            .execute_direct(conn, &c_sql)
            .ok_or_else(|| classify::fault(api.error(conn), Some(sql)))?;
        let result = self.read_first_row(&stmt, sql, slots);
        api.free_stmt(stmt);
        result
    }

    #[allow(clippy::result_large_err)]
    fn read_first_row(&self, stmt: &A::Stmt, sql: &str, slots: &mut [OutSlot<'_>]) -> Result<()> {
        let api = self.api();
        let conn = self.handle()?;

        if !api.fetch_next(stmt) {
            return match classify::classify(api.error(conn)) {
                Classified::EndOfData => Err(Error::EndOfData),
                Classified::Fault(err) => Err(classify::fault(err, Some(sql))),
            };
        }

        for (i, slot) in slots.iter_mut().enumerate() {
            let value = api
                .get_column(stmt, native_index(i))
                .ok_or_else(|| classify::fault(api.error(conn), Some(sql)))?;
            let column = ColumnDescriptor::new(i.to_string(), value.data_type);
            slot.assign(i, types::decode(&column, &value)?);
        }
        Ok(())
    }

    #[allow(clippy::result_large_err)]
    fn end_transaction(&self, commit: bool) -> Result<()> {
        let api = self.api();
        let conn = self.handle()?;
        if !self.in_transaction.get() {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::NotActive,
                message: "no transaction is active on this connection".to_string(),
            }));
        }

        if commit {
            if !api.commit(conn) {
                return Err(classify::fault(api.error(conn), Some("COMMIT")));
            }
        } else {
            // Over once rollback has been attempted, whatever it returns.
            self.in_transaction.set(false);
            if !api.rollback(conn) {
                return Err(classify::fault(api.error(conn), Some("ROLLBACK")));
            }
        }
        self.in_transaction.set(false);
        Ok(())
    }
}

impl<A: NativeApi> Drop for Connection<A> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<A: NativeApi> driver::Connection for Connection<A> {
    type Statement<'conn>
        = Statement<'conn, A>
    where
        Self: 'conn;

    type Transaction<'conn>
        = Transaction<'conn, A>
    where
        Self: 'conn;

    fn prepare(&self, sql: &str) -> Result<Statement<'_, A>> {
        Connection::prepare(self, sql)
    }

    fn begin(&self) -> Result<Transaction<'_, A>> {
        Connection::begin(self)
    }

    fn close(self) -> Result<()> {
        Connection::close(self)
    }
}

/// An open transaction.
///
/// Dropping it without calling [`commit`](Self::commit) rolls back.
pub struct Transaction<'conn, A: NativeApi> {
    conn: &'conn Connection<A>,
    finished: bool,
}

impl<A: NativeApi> Transaction<'_, A> {
    /// Commit. If the commit fails the transaction is rolled back on drop.
    #[allow(clippy::result_large_err)]
    pub fn commit(mut self) -> Result<()> {
        self.conn.end_transaction(true)?;
        self.finished = true;
        tracing::debug!("Transaction committed");
        Ok(())
    }

    #[allow(clippy::result_large_err)]
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.end_transaction(false)?;
        tracing::debug!("Transaction rolled back");
        Ok(())
    }
}

impl<A: NativeApi> Drop for Transaction<'_, A> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.conn.end_transaction(false) {
            tracing::warn!(error = %e, "Rollback of abandoned transaction failed");
        } else {
            tracing::debug!("Rolled back abandoned transaction");
        }
    }
}

impl<A: NativeApi> driver::Transaction for Transaction<'_, A> {
    fn commit(self) -> Result<()> {
        Transaction::commit(self)
    }

    fn rollback(self) -> Result<()> {
        Transaction::rollback(self)
    }
}
