//! Error types for SQL Anywhere driver operations.

use std::fmt;

/// The primary error type for all driver operations.
#[derive(Debug)]
pub enum Error {
    /// Native library initialization, handle allocation or connect failure
    Connection(ConnectionError),
    /// A native call reported failure
    Native(NativeError),
    /// Bind argument count does not match the statement's parameter count
    ArgumentCount(ArgumentCountError),
    /// A value the codec cannot encode into a native bind buffer
    UnsupportedType(UnsupportedTypeError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction state errors
    Transaction(TransactionError),
    /// Use of a closed or abandoned object
    Usage(UsageError),
    /// Configuration errors
    Config(ConfigError),
    /// A query that had to produce a row produced none
    EndOfData,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    /// Native error code, when the native library reported one
    pub code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// The native library refused to initialize
    Init,
    /// The native library could not allocate a connection handle
    Allocate,
    /// Failed to establish connection (includes authentication failures)
    Connect,
}

/// A failure reported by the native client library.
///
/// `code` is the engine's SQLCODE. Negative codes are errors, positive codes
/// are warnings, and [`NativeError::END_OF_RESULT_SET`] marks an exhausted
/// cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub code: i32,
    pub message: String,
    pub sqlstate: Option<String>,
    pub sql: Option<String>,
}

impl NativeError {
    /// SQLCODE reported by a fetch past the last row.
    pub const END_OF_RESULT_SET: i32 = 100;

    /// Create a native error from a code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            sqlstate: None,
            sql: None,
        }
    }

    /// Attach the SQLSTATE reported alongside the code.
    #[must_use]
    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    /// Attach the SQL text that was running when the error occurred.
    #[must_use]
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Is this the "no more rows" sentinel?
    pub const fn is_end_of_result_set(&self) -> bool {
        self.code == Self::END_OF_RESULT_SET
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentCountError {
    pub expected: usize,
    pub actual: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedTypeError {
    /// Descriptive name of the value kind that could not be encoded
    pub type_name: &'static str,
    /// Zero-based parameter position
    pub index: usize,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// A transaction is already open on this connection
    AlreadyActive,
    /// No transaction is open on this connection
    NotActive,
}

#[derive(Debug)]
pub struct UsageError {
    pub kind: UsageErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageErrorKind {
    /// The statement has been closed
    StatementClosed,
    /// The connection has been closed
    ConnectionClosed,
    /// A native fault occurred while fetching; the result set was abandoned
    CursorAbandoned,
    /// Fewer destination slots than result columns
    DestinationTooSmall,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl Error {
    /// Is this the "query produced no row" signal?
    pub const fn is_end_of_data(&self) -> bool {
        matches!(self, Error::EndOfData)
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(_) => true,
            Error::Usage(u) => u.kind == UsageErrorKind::ConnectionClosed,
            _ => false,
        }
    }

    /// Get the native error code if available.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Error::Native(n) => Some(n.code),
            Error::Connection(c) => c.code,
            _ => None,
        }
    }

    /// Get SQLSTATE if available.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Native(n) => n.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Native(n) => n.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e),
            Error::Native(e) => write!(f, "Native error: {}", e),
            Error::ArgumentCount(e) => write!(f, "Argument error: {}", e),
            Error::UnsupportedType(e) => write!(f, "Unsupported type: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Usage(e) => write!(f, "Usage error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::EndOfData => write!(f, "no rows in result set"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Native(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(
                f,
                "{} (code {}, SQLSTATE {})",
                self.message, self.code, sqlstate
            )
        } else {
            write!(f, "{} (code {})", self.message, self.code)
        }
    }
}

impl std::error::Error for NativeError {}

impl fmt::Display for ArgumentCountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "number of arguments does not match bind parameters ({} != {})",
            self.actual, self.expected
        )
    }
}

impl fmt::Display for UnsupportedTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot bind {} value at parameter {}",
            self.type_name, self.index
        )
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<NativeError> for Error {
    fn from(err: NativeError) -> Self {
        Error::Native(err)
    }
}

impl From<ArgumentCountError> for Error {
    fn from(err: ArgumentCountError) -> Self {
        Error::ArgumentCount(err)
    }
}

impl From<UnsupportedTypeError> for Error {
    fn from(err: UnsupportedTypeError) -> Self {
        Error::UnsupportedType(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<UsageError> for Error {
    fn from(err: UsageError) -> Self {
        Error::Usage(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;
