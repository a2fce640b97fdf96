//! An in-process [`NativeApi`] for tests.
//!
//! [`MockApi`] answers the native primitives from scripts registered per SQL
//! text and records every call it receives. Bound parameters are decoded
//! from their raw buffers, the way the vendor library would read them, so
//! tests see exactly what crossed the boundary.
//!
//! `MockApi` is cheap to clone; clones share state, so a test can keep one
//! handle for inspection while the driver owns another.
//!
//! Three statements are scripted out of the box: the character-set lookup
//! run on connect, `select @@identity`, and `BEGIN TRAN`.

use crate::connection::{BEGIN_TRANSACTION, CHARSET_QUERY, IDENTITY_QUERY};
use crate::native::{
    ColumnDescriptor, DataType, NativeApi, NativeType, NativeValue, ParamDescriptor,
};
use crate::types::{self, BoundParameter};
use sqlany_core::{NativeError, Value};
use std::collections::{BTreeMap, HashMap};
use std::ffi::CStr;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// API version the mock claims to support.
pub const MOCK_API_VERSION: u32 = 4;

/// SQLCODE for SQL the mock has no script for.
pub const SYNTAX_ERROR: i32 = -131;
/// SQLCODE for executing while the previous result set is still open.
pub const CURSOR_ALREADY_OPEN: i32 = -172;
/// SQLCODE for fetching from a statement with no open result set.
pub const CURSOR_NOT_OPEN: i32 = -180;
/// SQLCODE for executing with unbound placeholders.
pub const NOT_ENOUGH_VALUES: i32 = -188;
/// SQLCODE for statements on a connection that is not connected.
pub const NOT_CONNECTED: i32 = -101;
/// SQLCODE for a rejected connect.
pub const CONNECTION_REFUSED: i32 = -103;
/// SQLCODE for malformed bind buffers and other misuse.
pub const INVALID_PARAMETER: i32 = -1002;

/// A native primitive, as recorded by [`MockApi::calls`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Init,
    Fini,
    NewConnection,
    FreeConnection,
    Connect,
    Disconnect,
    Commit,
    Rollback,
    Error,
    Prepare,
    ExecuteDirect,
    FreeStmt,
    Reset,
    NumParams,
    NumCols,
    DescribeBindParam,
    BindParam,
    Execute,
    AffectedRows,
    ColumnInfo,
    FetchNext,
    GetColumn,
}

/// What one execution of a scripted statement produces.
#[derive(Debug, Clone, Default)]
pub struct MockResult {
    pub rows: Vec<Vec<Value>>,
    pub affected_rows: i32,
    /// Fail the fetch after this many rows with the given error.
    pub fault_after: Option<(usize, NativeError)>,
}

impl MockResult {
    pub fn rows(rows: Vec<Vec<Value>>) -> Self {
        let affected_rows = i32::try_from(rows.len()).unwrap_or(i32::MAX);
        Self {
            rows,
            affected_rows,
            fault_after: None,
        }
    }

    pub fn affected(affected_rows: i32) -> Self {
        Self {
            affected_rows,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_fault_after(mut self, rows: usize, err: NativeError) -> Self {
        self.fault_after = Some((rows, err));
        self
    }
}

type Handler = Arc<dyn Fn(&[Value]) -> Result<MockResult, NativeError> + Send + Sync>;

/// How the mock answers one SQL text.
#[derive(Clone)]
pub struct Script {
    params: Vec<DataType>,
    columns: Vec<ColumnDescriptor>,
    handler: Handler,
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("params", &self.params)
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

impl Script {
    /// No placeholders, no columns, no effect.
    pub fn new() -> Self {
        Self {
            params: Vec::new(),
            columns: Vec::new(),
            handler: Arc::new(|_| Ok(MockResult::default())),
        }
    }

    /// Declared types of the placeholders, in order.
    #[must_use]
    pub fn params(mut self, params: impl IntoIterator<Item = DataType>) -> Self {
        self.params = params.into_iter().collect();
        self
    }

    /// Result columns as `(name, tag)` pairs.
    #[must_use]
    pub fn columns<'a>(mut self, columns: impl IntoIterator<Item = (&'a str, DataType)>) -> Self {
        self.columns = columns
            .into_iter()
            .map(|(name, data_type)| ColumnDescriptor {
                native_type: native_type_for(data_type),
                ..ColumnDescriptor::new(name, data_type)
            })
            .collect();
        self
    }

    /// Compute the result from the bound arguments.
    #[must_use]
    pub fn returning(
        mut self,
        handler: impl Fn(&[Value]) -> Result<MockResult, NativeError> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Always produce these rows.
    #[must_use]
    pub fn rows(self, rows: Vec<Vec<Value>>) -> Self {
        self.returning(move |_| Ok(MockResult::rows(rows.clone())))
    }

    /// Always report this many affected rows.
    #[must_use]
    pub fn affecting(self, affected_rows: i32) -> Self {
        self.returning(move |_| Ok(MockResult::affected(affected_rows)))
    }

    /// Always fail to execute with `err`.
    #[must_use]
    pub fn failing(self, err: NativeError) -> Self {
        self.returning(move |_| Err(err.clone()))
    }
}

fn native_type_for(data_type: DataType) -> NativeType {
    match data_type {
        DataType::Binary => NativeType::LongBinary,
        DataType::String => NativeType::LongVarChar,
        DataType::Double => NativeType::Double,
        DataType::Val64 => NativeType::BigInt,
        DataType::UVal64 => NativeType::UnsBigInt,
        DataType::Val32 => NativeType::Int,
        DataType::UVal32 => NativeType::UnsInt,
        DataType::Val16 => NativeType::SmallInt,
        DataType::UVal16 => NativeType::UnsSmallInt,
        DataType::Val8 | DataType::UVal8 => NativeType::TinyInt,
        DataType::Invalid => NativeType::Other(0),
    }
}

/// Connection handle issued by [`MockApi`].
#[derive(Debug, PartialEq, Eq)]
pub struct MockConnection(u64);

/// Statement handle issued by [`MockApi`].
#[derive(Debug, PartialEq, Eq)]
pub struct MockStatement(u64);

/// One completed execute, with the arguments decoded from the bind buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub sql: String,
    pub args: Vec<Value>,
}

struct ActiveResult {
    rows: Vec<Vec<Value>>,
    fetched: usize,
    current: Option<usize>,
    affected_rows: i32,
    fault_after: Option<(usize, NativeError)>,
}

struct MockStmt {
    conn: u64,
    sql: String,
    script: Script,
    bound: BTreeMap<u32, Value>,
    result: Option<ActiveResult>,
}

struct MockConn {
    connected: bool,
    last_error: NativeError,
}

struct MockState {
    scripts: HashMap<String, Script>,
    calls: Vec<Call>,
    connect_strings: Vec<String>,
    executions: Vec<Execution>,
    prepared: Vec<String>,
    freed_statements: Vec<String>,
    next_id: u64,
    connections: HashMap<u64, MockConn>,
    statements: HashMap<u64, MockStmt>,
    init_failures: usize,
    connect_error: Option<NativeError>,
    disconnect_fails: bool,
    commit_error: Option<NativeError>,
    rollback_error: Option<NativeError>,
    bind_error: Option<NativeError>,
    describe_error: Option<NativeError>,
    column_info_error: Option<NativeError>,
}

impl MockState {
    fn fail(&mut self, conn: u64, err: NativeError) {
        if let Some(c) = self.connections.get_mut(&conn) {
            c.last_error = err;
        }
    }

    fn succeed(&mut self, conn: u64) {
        self.fail(conn, NativeError::new(0, ""));
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn new_statement(&mut self, conn: u64, sql: &str) -> Option<u64> {
        if !self.connections.get(&conn).is_some_and(|c| c.connected) {
            self.fail(conn, NativeError::new(NOT_CONNECTED, "Not connected to a database"));
            return None;
        }
        let Some(script) = self.scripts.get(sql).cloned() else {
            self.fail(
                conn,
                NativeError::new(SYNTAX_ERROR, format!("Syntax error near '{sql}'")),
            );
            return None;
        };
        let id = self.next_id();
        self.statements.insert(
            id,
            MockStmt {
                conn,
                sql: sql.to_string(),
                script,
                bound: BTreeMap::new(),
                result: None,
            },
        );
        self.succeed(conn);
        Some(id)
    }

    fn execute(&mut self, id: u64) -> bool {
        let Some(stmt) = self.statements.get_mut(&id) else {
            return false;
        };
        let conn = stmt.conn;

        let outcome = if stmt.result.is_some() && !stmt.script.columns.is_empty() {
            Err(NativeError::new(CURSOR_ALREADY_OPEN, "Cursor already open"))
        } else if stmt.bound.len() < stmt.script.params.len() {
            Err(NativeError::new(
                NOT_ENOUGH_VALUES,
                "Not enough values for host variables",
            ))
        } else {
            let args: Vec<Value> = stmt.bound.values().cloned().collect();
            (stmt.script.handler)(&args).map(|result| (args, result))
        };

        match outcome {
            Ok((args, result)) => {
                stmt.result = Some(ActiveResult {
                    rows: result.rows,
                    fetched: 0,
                    current: None,
                    affected_rows: result.affected_rows,
                    fault_after: result.fault_after,
                });
                let execution = Execution {
                    sql: stmt.sql.clone(),
                    args,
                };
                self.executions.push(execution);
                self.succeed(conn);
                true
            }
            Err(err) => {
                self.fail(conn, err);
                false
            }
        }
    }
}

/// A scripted, call-recording [`NativeApi`].
#[derive(Clone)]
pub struct MockApi {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MockApi")
            .field("scripts", &state.scripts.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

impl MockApi {
    /// A mock that accepts any connect string and reports `UTF-8`.
    pub fn new() -> Self {
        let api = Self {
            state: Arc::new(Mutex::new(MockState {
                scripts: HashMap::new(),
                calls: Vec::new(),
                connect_strings: Vec::new(),
                executions: Vec::new(),
                prepared: Vec::new(),
                freed_statements: Vec::new(),
                next_id: 0,
                connections: HashMap::new(),
                statements: HashMap::new(),
                init_failures: 0,
                connect_error: None,
                disconnect_fails: false,
                commit_error: None,
                rollback_error: None,
                bind_error: None,
                describe_error: None,
                column_info_error: None,
            })),
        };
        api.set_charset("UTF-8");
        api.set_identity(0);
        api.script(BEGIN_TRANSACTION, Script::new());
        api
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: Call) -> MutexGuard<'_, MockState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }

    /// Register how to answer `sql`. Replaces any earlier script for it.
    pub fn script(&self, sql: &str, script: Script) {
        self.lock().scripts.insert(sql.to_string(), script);
    }

    /// Character set reported for new connections.
    pub fn set_charset(&self, charset: &str) {
        self.script(
            CHARSET_QUERY,
            Script::new()
                .columns([("connection_property('CharSet')", DataType::String)])
                .rows(vec![vec![Value::Text(charset.to_string())]]),
        );
    }

    /// Make the character-set lookup on connect fail.
    pub fn fail_charset(&self, err: NativeError) {
        self.script(
            CHARSET_QUERY,
            Script::new()
                .columns([("connection_property('CharSet')", DataType::String)])
                .failing(err),
        );
    }

    /// Value `select @@identity` returns.
    pub fn set_identity(&self, id: u64) {
        self.script(
            IDENTITY_QUERY,
            Script::new()
                .columns([("@@identity", DataType::UVal64)])
                .rows(vec![vec![Value::UBigInt(id)]]),
        );
    }

    /// Fail the next `count` init calls.
    pub fn fail_init(&self, count: usize) {
        self.lock().init_failures = count;
    }

    /// Reject connects with `err`, or accept them again with `None`.
    pub fn reject_connect(&self, err: Option<NativeError>) {
        self.lock().connect_error = err;
    }

    pub fn fail_disconnect(&self, fail: bool) {
        self.lock().disconnect_fails = fail;
    }

    pub fn fail_commit(&self, err: Option<NativeError>) {
        self.lock().commit_error = err;
    }

    pub fn fail_rollback(&self, err: Option<NativeError>) {
        self.lock().rollback_error = err;
    }

    /// Reject every bind with `err`.
    pub fn fail_bind(&self, err: Option<NativeError>) {
        self.lock().bind_error = err;
    }

    /// Fail every parameter description with `err`.
    pub fn fail_describe_bind(&self, err: Option<NativeError>) {
        self.lock().describe_error = err;
    }

    /// Fail every column description with `err`.
    pub fn fail_column_info(&self, err: Option<NativeError>) {
        self.lock().column_info_error = err;
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// How many times `call` was made.
    pub fn count(&self, call: Call) -> usize {
        self.lock().calls.iter().filter(|&&c| c == call).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Option strings passed to connect.
    pub fn connect_strings(&self) -> Vec<String> {
        self.lock().connect_strings.clone()
    }

    /// Successful executes, in order.
    pub fn executions(&self) -> Vec<Execution> {
        self.lock().executions.clone()
    }

    /// SQL passed to prepare, in order.
    pub fn prepared(&self) -> Vec<String> {
        self.lock().prepared.clone()
    }

    /// SQL of every freed statement, in the order they were freed.
    pub fn freed_statements(&self) -> Vec<String> {
        self.lock().freed_statements.clone()
    }

    /// Statements allocated and not yet freed.
    pub fn live_statements(&self) -> usize {
        self.lock().statements.len()
    }

    /// Connections allocated and not yet freed.
    pub fn live_connections(&self) -> usize {
        self.lock().connections.len()
    }
}

fn malformed(message: &str) -> NativeError {
    NativeError::new(INVALID_PARAMETER, message)
}

/// Check a bound buffer the way the vendor library relies on it.
fn check_layout(param: &BoundParameter) -> Result<(), NativeError> {
    if param.is_null() {
        return if param.buffer().is_empty() {
            Err(malformed("NULL parameter without a buffer"))
        } else {
            Ok(())
        };
    }
    if param.buffer_size() != param.buffer().len() {
        return Err(malformed("buffer size does not match the buffer"));
    }
    match param.data_type() {
        DataType::String => {
            if param.buffer_size() != param.value_length() + 1
                || param.buffer().get(param.value_length()) != Some(&0)
            {
                return Err(malformed("string parameter is not NUL-terminated"));
            }
        }
        DataType::Binary => {
            if param.buffer_size() != param.value_length() {
                return Err(malformed("binary length does not match its buffer"));
            }
        }
        DataType::Invalid => return Err(malformed("parameter has no type")),
        fixed => {
            if Some(param.value_length()) != fixed.width() {
                return Err(malformed("fixed-size parameter has the wrong length"));
            }
        }
    }
    Ok(())
}

fn to_native(column: &ColumnDescriptor, value: &Value) -> Option<NativeValue<'static>> {
    if value.is_null() {
        return Some(NativeValue::null(column.data_type));
    }
    let param = types::encode(0, value, &ParamDescriptor::input(column.data_type)).ok()?;
    Some(NativeValue::owned(
        param.data_type(),
        param.value_bytes().to_vec(),
    ))
}

impl NativeApi for MockApi {
    type Conn = MockConnection;
    type Stmt = MockStatement;

    /// Clones share one simulated library.
    fn instance_key(&self) -> usize {
        Arc::as_ptr(&self.state).addr()
    }

    fn init(&self, _app_name: &str) -> Option<u32> {
        let mut state = self.record(Call::Init);
        if state.init_failures > 0 {
            state.init_failures -= 1;
            return None;
        }
        Some(MOCK_API_VERSION)
    }

    fn fini(&self) {
        drop(self.record(Call::Fini));
    }

    fn new_connection(&self) -> Option<MockConnection> {
        let mut state = self.record(Call::NewConnection);
        let id = state.next_id();
        state.connections.insert(
            id,
            MockConn {
                connected: false,
                last_error: NativeError::new(0, ""),
            },
        );
        Some(MockConnection(id))
    }

    fn free_connection(&self, conn: MockConnection) {
        let mut state = self.record(Call::FreeConnection);
        state.connections.remove(&conn.0);
    }

    fn connect(&self, conn: &MockConnection, options: &CStr) -> bool {
        let mut state = self.record(Call::Connect);
        state
            .connect_strings
            .push(options.to_string_lossy().into_owned());
        if let Some(err) = state.connect_error.clone() {
            state.fail(conn.0, err);
            return false;
        }
        if let Some(c) = state.connections.get_mut(&conn.0) {
            c.connected = true;
        }
        state.succeed(conn.0);
        true
    }

    fn disconnect(&self, conn: &MockConnection) -> bool {
        let mut state = self.record(Call::Disconnect);
        if state.disconnect_fails {
            state.fail(conn.0, NativeError::new(NOT_CONNECTED, "Not connected to a database"));
            return false;
        }
        if let Some(c) = state.connections.get_mut(&conn.0) {
            c.connected = false;
        }
        true
    }

    fn commit(&self, conn: &MockConnection) -> bool {
        let mut state = self.record(Call::Commit);
        if let Some(err) = state.commit_error.clone() {
            state.fail(conn.0, err);
            return false;
        }
        state.succeed(conn.0);
        true
    }

    fn rollback(&self, conn: &MockConnection) -> bool {
        let mut state = self.record(Call::Rollback);
        if let Some(err) = state.rollback_error.clone() {
            state.fail(conn.0, err);
            return false;
        }
        state.succeed(conn.0);
        true
    }

    fn error(&self, conn: &MockConnection) -> NativeError {
        let state = self.record(Call::Error);
        state
            .connections
            .get(&conn.0)
            .map_or_else(|| NativeError::new(0, ""), |c| c.last_error.clone())
    }

    fn prepare(&self, conn: &MockConnection, sql: &CStr) -> Option<MockStatement> {
        let mut state = self.record(Call::Prepare);
        let sql = sql.to_string_lossy().into_owned();
        state.prepared.push(sql.clone());
        state.new_statement(conn.0, &sql).map(MockStatement)
    }

    fn execute_direct(&self, conn: &MockConnection, sql: &CStr) -> Option<MockStatement> {
        let mut state = self.record(Call::ExecuteDirect);
        let sql = sql.to_string_lossy().into_owned();
        let id = state.new_statement(conn.0, &sql)?;
        if state.execute(id) {
            Some(MockStatement(id))
        } else {
            state.statements.remove(&id);
            None
        }
    }

    fn free_stmt(&self, stmt: MockStatement) {
        let mut state = self.record(Call::FreeStmt);
        if let Some(freed) = state.statements.remove(&stmt.0) {
            state.freed_statements.push(freed.sql);
        }
    }

    fn reset(&self, stmt: &MockStatement) -> bool {
        let mut state = self.record(Call::Reset);
        match state.statements.get_mut(&stmt.0) {
            Some(s) => {
                s.result = None;
                true
            }
            None => false,
        }
    }

    fn num_params(&self, stmt: &MockStatement) -> i32 {
        let state = self.record(Call::NumParams);
        state.statements.get(&stmt.0).map_or(-1, |s| {
            i32::try_from(s.script.params.len()).unwrap_or(i32::MAX)
        })
    }

    fn num_cols(&self, stmt: &MockStatement) -> i32 {
        let state = self.record(Call::NumCols);
        state.statements.get(&stmt.0).map_or(-1, |s| {
            i32::try_from(s.script.columns.len()).unwrap_or(i32::MAX)
        })
    }

    fn describe_bind_param(&self, stmt: &MockStatement, index: u32) -> Option<ParamDescriptor> {
        let mut state = self.record(Call::DescribeBindParam);
        let s = state.statements.get(&stmt.0)?;
        let conn = s.conn;
        let declared = s.script.params.get(index as usize).copied();
        let failure = state.describe_error.clone();
        match (failure, declared) {
            (None, Some(data_type)) => Some(ParamDescriptor::input(data_type)),
            (Some(err), _) => {
                state.fail(conn, err);
                None
            }
            (None, None) => {
                state.fail(conn, malformed("parameter index out of range"));
                None
            }
        }
    }

    unsafe fn bind_param(&self, stmt: &MockStatement, index: u32, param: &BoundParameter) -> bool {
        let mut state = self.record(Call::BindParam);
        let Some(conn) = state.statements.get(&stmt.0).map(|s| s.conn) else {
            return false;
        };
        if let Some(err) = state.bind_error.clone() {
            state.fail(conn, err);
            return false;
        }
        let decoded = check_layout(param)
            .and_then(|()| types::decode_bound(param).map_err(|e| malformed(&e.to_string())));
        match decoded {
            Ok(value) => {
                if let Some(s) = state.statements.get_mut(&stmt.0) {
                    s.bound.insert(index, value);
                }
                true
            }
            Err(err) => {
                state.fail(conn, err);
                false
            }
        }
    }

    fn execute(&self, stmt: &MockStatement) -> bool {
        let mut state = self.record(Call::Execute);
        state.execute(stmt.0)
    }

    fn affected_rows(&self, stmt: &MockStatement) -> i32 {
        let state = self.record(Call::AffectedRows);
        state
            .statements
            .get(&stmt.0)
            .and_then(|s| s.result.as_ref())
            .map_or(-1, |r| r.affected_rows)
    }

    fn column_info(&self, stmt: &MockStatement, index: u32) -> Option<ColumnDescriptor> {
        let mut state = self.record(Call::ColumnInfo);
        let s = state.statements.get(&stmt.0)?;
        let conn = s.conn;
        let column = s.script.columns.get(index as usize).cloned();
        let failure = state.column_info_error.clone();
        match (failure, column) {
            (None, Some(column)) => Some(column),
            (Some(err), _) => {
                state.fail(conn, err);
                None
            }
            (None, None) => {
                state.fail(conn, malformed("column index out of range"));
                None
            }
        }
    }

    fn fetch_next(&self, stmt: &MockStatement) -> bool {
        let mut state = self.record(Call::FetchNext);
        let Some(s) = state.statements.get_mut(&stmt.0) else {
            return false;
        };
        let conn = s.conn;
        let Some(result) = s.result.as_mut() else {
            state.fail(conn, NativeError::new(CURSOR_NOT_OPEN, "Cursor not open"));
            return false;
        };

        if let Some((after, err)) = &result.fault_after {
            if result.fetched == *after {
                let err = err.clone();
                result.current = None;
                state.fail(conn, err);
                return false;
            }
        }
        if result.fetched < result.rows.len() {
            result.current = Some(result.fetched);
            result.fetched += 1;
            state.succeed(conn);
            true
        } else {
            result.current = None;
            state.fail(
                conn,
                NativeError::new(NativeError::END_OF_RESULT_SET, "Row not found"),
            );
            false
        }
    }

    fn get_column<'s>(&self, stmt: &'s MockStatement, index: u32) -> Option<NativeValue<'s>> {
        let mut state = self.record(Call::GetColumn);
        let s = state.statements.get(&stmt.0)?;
        let conn = s.conn;
        let value = s
            .result
            .as_ref()
            .and_then(|r| r.rows.get(r.current?))
            .and_then(|row| {
                let column = s.script.columns.get(index as usize)?;
                to_native(column, row.get(index as usize)?)
            });
        if value.is_none() {
            state.fail(conn, malformed("no such column in the current row"));
        }
        value
    }
}
