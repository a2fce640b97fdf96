//! The native client library seen as a set of primitives.
//!
//! [`NativeApi`] is the only way the rest of the driver talks to SQL
//! Anywhere. The real implementation, [`DbCapi`], forwards to `dbcapi`
//! through [`crate::ffi`] and is only built with the `dbcapi` feature.
//! [`crate::mock::MockApi`] implements the same trait in-process.

use crate::ffi;
use crate::types::BoundParameter;
use serde::Serialize;
use sqlany_core::NativeError;
use std::borrow::Cow;
use std::ffi::CStr;

/// Boolean as the C API stores it: zero is false, anything else is true.
pub type NativeBool = i32;

/// Column and parameter positions are `u32` at the C boundary.
pub(crate) fn native_index(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

/// The tag of a tagged buffer (`a_sqlany_data_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataType {
    Invalid,
    Binary,
    String,
    Double,
    Val64,
    UVal64,
    Val32,
    UVal32,
    Val16,
    UVal16,
    Val8,
    UVal8,
}

impl DataType {
    /// Numeric tag used at the C boundary.
    pub const fn code(self) -> i32 {
        match self {
            DataType::Invalid => ffi::A_INVALID_TYPE,
            DataType::Binary => ffi::A_BINARY,
            DataType::String => ffi::A_STRING,
            DataType::Double => ffi::A_DOUBLE,
            DataType::Val64 => ffi::A_VAL64,
            DataType::UVal64 => ffi::A_UVAL64,
            DataType::Val32 => ffi::A_VAL32,
            DataType::UVal32 => ffi::A_UVAL32,
            DataType::Val16 => ffi::A_VAL16,
            DataType::UVal16 => ffi::A_UVAL16,
            DataType::Val8 => ffi::A_VAL8,
            DataType::UVal8 => ffi::A_UVAL8,
        }
    }

    /// Map a numeric tag back. Unknown tags become [`DataType::Invalid`].
    pub const fn from_code(code: i32) -> Self {
        match code {
            ffi::A_BINARY => DataType::Binary,
            ffi::A_STRING => DataType::String,
            ffi::A_DOUBLE => DataType::Double,
            ffi::A_VAL64 => DataType::Val64,
            ffi::A_UVAL64 => DataType::UVal64,
            ffi::A_VAL32 => DataType::Val32,
            ffi::A_UVAL32 => DataType::UVal32,
            ffi::A_VAL16 => DataType::Val16,
            ffi::A_UVAL16 => DataType::UVal16,
            ffi::A_VAL8 => DataType::Val8,
            ffi::A_UVAL8 => DataType::UVal8,
            _ => DataType::Invalid,
        }
    }

    /// Byte width of fixed-size tags; `None` for variable-length ones.
    pub const fn width(self) -> Option<usize> {
        match self {
            DataType::Val8 | DataType::UVal8 => Some(1),
            DataType::Val16 | DataType::UVal16 => Some(2),
            DataType::Val32 | DataType::UVal32 => Some(4),
            DataType::Val64 | DataType::UVal64 | DataType::Double => Some(8),
            DataType::Invalid | DataType::Binary | DataType::String => None,
        }
    }
}

/// Engine-side column type (`DT_*` codes).
///
/// Only informational for this layer: decoding follows the per-value
/// [`DataType`] tag the library reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NativeType {
    Date,
    Time,
    Timestamp,
    VarChar,
    FixChar,
    LongVarChar,
    String,
    Double,
    Float,
    Decimal,
    Int,
    SmallInt,
    Binary,
    LongBinary,
    TinyInt,
    BigInt,
    UnsInt,
    UnsSmallInt,
    UnsBigInt,
    Bit,
    LongNVarChar,
    Other(i32),
}

impl NativeType {
    pub const fn from_code(code: i32) -> Self {
        match code {
            384 => NativeType::Date,
            388 => NativeType::Time,
            392 => NativeType::Timestamp,
            448 => NativeType::VarChar,
            452 => NativeType::FixChar,
            456 => NativeType::LongVarChar,
            460 => NativeType::String,
            480 => NativeType::Double,
            482 => NativeType::Float,
            484 => NativeType::Decimal,
            496 => NativeType::Int,
            500 => NativeType::SmallInt,
            524 => NativeType::Binary,
            528 => NativeType::LongBinary,
            604 => NativeType::TinyInt,
            608 => NativeType::BigInt,
            612 => NativeType::UnsInt,
            616 => NativeType::UnsSmallInt,
            620 => NativeType::UnsBigInt,
            624 => NativeType::Bit,
            640 => NativeType::LongNVarChar,
            other => NativeType::Other(other),
        }
    }

    pub const fn code(self) -> i32 {
        match self {
            NativeType::Date => 384,
            NativeType::Time => 388,
            NativeType::Timestamp => 392,
            NativeType::VarChar => 448,
            NativeType::FixChar => 452,
            NativeType::LongVarChar => 456,
            NativeType::String => 460,
            NativeType::Double => 480,
            NativeType::Float => 482,
            NativeType::Decimal => 484,
            NativeType::Int => 496,
            NativeType::SmallInt => 500,
            NativeType::Binary => 524,
            NativeType::LongBinary => 528,
            NativeType::TinyInt => 604,
            NativeType::BigInt => 608,
            NativeType::UnsInt => 612,
            NativeType::UnsSmallInt => 616,
            NativeType::UnsBigInt => 620,
            NativeType::Bit => 624,
            NativeType::LongNVarChar => 640,
            NativeType::Other(code) => code,
        }
    }
}

/// Parameter direction (`a_sqlany_data_direction`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Invalid,
    Input,
    Output,
    InputOutput,
}

impl Direction {
    pub const fn code(self) -> i32 {
        match self {
            Direction::Invalid => ffi::DD_INVALID,
            Direction::Input => ffi::DD_INPUT,
            Direction::Output => ffi::DD_OUTPUT,
            Direction::InputOutput => ffi::DD_INPUT_OUTPUT,
        }
    }

    pub const fn from_code(code: i32) -> Self {
        match code {
            ffi::DD_INPUT => Direction::Input,
            ffi::DD_OUTPUT => Direction::Output,
            ffi::DD_INPUT_OUTPUT => Direction::InputOutput,
            _ => Direction::Invalid,
        }
    }
}

/// What the library declares about a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub direction: Direction,
    /// Declared tag. The codec replaces it with the argument's own tag.
    pub data_type: DataType,
    pub name: Option<String>,
}

impl ParamDescriptor {
    /// An input placeholder of the given declared type.
    pub fn input(data_type: DataType) -> Self {
        Self {
            direction: Direction::Input,
            data_type,
            name: None,
        }
    }
}

/// Result column metadata, fetched once at prepare time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: DataType,
    pub native_type: NativeType,
    pub precision: u16,
    pub scale: u16,
    pub max_size: usize,
    pub nullable: bool,
}

impl ColumnDescriptor {
    /// Descriptor with only a name and tag set.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            native_type: NativeType::Other(0),
            precision: 0,
            scale: 0,
            max_size: 0,
            nullable: true,
        }
    }
}

/// A column value as fetched for the current row.
///
/// `bytes` holds exactly the reported length of the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeValue<'a> {
    pub data_type: DataType,
    pub bytes: Cow<'a, [u8]>,
    pub is_null: bool,
}

impl NativeValue<'static> {
    pub fn null(data_type: DataType) -> NativeValue<'static> {
        NativeValue {
            data_type,
            bytes: Cow::Borrowed(&[]),
            is_null: true,
        }
    }

    pub fn owned(data_type: DataType, bytes: Vec<u8>) -> NativeValue<'static> {
        NativeValue {
            data_type,
            bytes: Cow::Owned(bytes),
            is_null: false,
        }
    }
}

/// The primitives of the SQL Anywhere C API the driver calls.
///
/// Handles are opaque. Functions returning `bool` report success; on
/// failure the caller reads the reason with [`NativeApi::error`].
pub trait NativeApi: 'static {
    /// Connection handle.
    type Conn;
    /// Statement handle.
    type Stmt;

    /// Identifies the library instance behind this API within its type.
    ///
    /// Initialization is shared by every driver whose API has the same type
    /// and key. The vendor library is loaded once per process, so the
    /// default of `0` is right for it.
    fn instance_key(&self) -> usize {
        0
    }

    /// Initialize the library. Returns the highest API version available.
    fn init(&self, app_name: &str) -> Option<u32>;
    fn fini(&self);

    fn new_connection(&self) -> Option<Self::Conn>;
    fn free_connection(&self, conn: Self::Conn);
    fn connect(&self, conn: &Self::Conn, options: &CStr) -> bool;
    fn disconnect(&self, conn: &Self::Conn) -> bool;
    fn commit(&self, conn: &Self::Conn) -> bool;
    fn rollback(&self, conn: &Self::Conn) -> bool;

    /// The last error recorded on the connection.
    fn error(&self, conn: &Self::Conn) -> NativeError;

    fn prepare(&self, conn: &Self::Conn, sql: &CStr) -> Option<Self::Stmt>;
    fn execute_direct(&self, conn: &Self::Conn, sql: &CStr) -> Option<Self::Stmt>;
    fn free_stmt(&self, stmt: Self::Stmt);
    fn reset(&self, stmt: &Self::Stmt) -> bool;

    fn num_params(&self, stmt: &Self::Stmt) -> i32;
    fn num_cols(&self, stmt: &Self::Stmt) -> i32;
    fn describe_bind_param(&self, stmt: &Self::Stmt, index: u32) -> Option<ParamDescriptor>;

    /// Bind `param` at the zero-based `index`.
    ///
    /// # Safety
    /// The library keeps pointers into `param`. It must stay alive and
    /// unmoved until the next [`NativeApi::execute`] on `stmt` returns.
    unsafe fn bind_param(&self, stmt: &Self::Stmt, index: u32, param: &BoundParameter) -> bool;

    fn execute(&self, stmt: &Self::Stmt) -> bool;
    fn affected_rows(&self, stmt: &Self::Stmt) -> i32;
    fn column_info(&self, stmt: &Self::Stmt, index: u32) -> Option<ColumnDescriptor>;
    fn fetch_next(&self, stmt: &Self::Stmt) -> bool;

    /// Read a column of the current row. The value is only valid until the
    /// statement is fetched, reset or freed.
    fn get_column<'s>(&self, stmt: &'s Self::Stmt, index: u32) -> Option<NativeValue<'s>>;
}

#[cfg(feature = "dbcapi")]
pub use self::dbcapi::{DbCapi, DbConnection, DbStatement};

#[cfg(feature = "dbcapi")]
mod dbcapi {
    use super::*;
    use std::ffi::{CString, c_char};
    use std::ptr::{self, NonNull};

    /// [`NativeApi`] over the vendor `dbcapi` library.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct DbCapi;

    #[derive(Debug)]
    pub struct DbConnection(NonNull<ffi::a_sqlany_connection>);

    #[derive(Debug)]
    pub struct DbStatement(NonNull<ffi::a_sqlany_stmt>);

    // SAFETY: dbcapi connections may move between threads as long as only
    // one thread uses them at a time, which ownership guarantees.
    unsafe impl Send for DbConnection {}
    // SAFETY: same as for connections; a statement is owned by one object.
    unsafe impl Send for DbStatement {}

    /// Copy a NUL-terminated buffer filled by the library.
    fn buffer_string(buf: &[c_char]) -> String {
        let bytes: Vec<u8> = buf
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    impl NativeApi for DbCapi {
        type Conn = DbConnection;
        type Stmt = DbStatement;

        fn init(&self, app_name: &str) -> Option<u32> {
            let name = CString::new(app_name).ok()?;
            let mut available: ffi::sacapi_u32 = 0;
            // SAFETY: name is a valid C string and available is a valid out pointer
            let ok = unsafe {
                ffi::sqlany_init(name.as_ptr(), ffi::SQLANY_API_VERSION_1, &mut available)
            };
            (ok != 0).then_some(available)
        }

        fn fini(&self) {
            // SAFETY: only called after a successful init
            unsafe { ffi::sqlany_fini() };
        }

        fn new_connection(&self) -> Option<DbConnection> {
            // SAFETY: no preconditions
            NonNull::new(unsafe { ffi::sqlany_new_connection() }).map(DbConnection)
        }

        fn free_connection(&self, conn: DbConnection) {
            // SAFETY: conn was allocated by sqlany_new_connection and is consumed here
            unsafe { ffi::sqlany_free_connection(conn.0.as_ptr()) };
        }

        fn connect(&self, conn: &DbConnection, options: &CStr) -> bool {
            // SAFETY: conn is valid, options is NUL-terminated
            unsafe { ffi::sqlany_connect(conn.0.as_ptr(), options.as_ptr()) != 0 }
        }

        fn disconnect(&self, conn: &DbConnection) -> bool {
            // SAFETY: conn is valid
            unsafe { ffi::sqlany_disconnect(conn.0.as_ptr()) != 0 }
        }

        fn commit(&self, conn: &DbConnection) -> bool {
            // SAFETY: conn is valid
            unsafe { ffi::sqlany_commit(conn.0.as_ptr()) != 0 }
        }

        fn rollback(&self, conn: &DbConnection) -> bool {
            // SAFETY: conn is valid
            unsafe { ffi::sqlany_rollback(conn.0.as_ptr()) != 0 }
        }

        fn error(&self, conn: &DbConnection) -> NativeError {
            let mut message = [0 as c_char; ffi::SQLANY_ERROR_SIZE];
            let mut state = [0 as c_char; ffi::SQLANY_SQLSTATE_SIZE];
            // SAFETY: conn is valid and both buffers are as large as we claim
            let code = unsafe {
                ffi::sqlany_error(conn.0.as_ptr(), message.as_mut_ptr(), message.len())
            };
            // SAFETY: as above
            unsafe { ffi::sqlany_sqlstate(conn.0.as_ptr(), state.as_mut_ptr(), state.len()) };

            let err = NativeError::new(code, buffer_string(&message));
            let state = buffer_string(&state);
            if state.is_empty() {
                err
            } else {
                err.with_sqlstate(state)
            }
        }

        fn prepare(&self, conn: &DbConnection, sql: &CStr) -> Option<DbStatement> {
            // SAFETY: conn is valid, sql is NUL-terminated
            NonNull::new(unsafe { ffi::sqlany_prepare(conn.0.as_ptr(), sql.as_ptr()) })
                .map(DbStatement)
        }

        fn execute_direct(&self, conn: &DbConnection, sql: &CStr) -> Option<DbStatement> {
            // SAFETY: conn is valid, sql is NUL-terminated
            NonNull::new(unsafe { ffi::sqlany_execute_direct(conn.0.as_ptr(), sql.as_ptr()) })
                .map(DbStatement)
        }

        fn free_stmt(&self, stmt: DbStatement) {
            // SAFETY: stmt is valid and consumed here
            unsafe { ffi::sqlany_free_stmt(stmt.0.as_ptr()) };
        }

        fn reset(&self, stmt: &DbStatement) -> bool {
            // SAFETY: stmt is valid
            unsafe { ffi::sqlany_reset(stmt.0.as_ptr()) != 0 }
        }

        fn num_params(&self, stmt: &DbStatement) -> i32 {
            // SAFETY: stmt is valid
            unsafe { ffi::sqlany_num_params(stmt.0.as_ptr()) }
        }

        fn num_cols(&self, stmt: &DbStatement) -> i32 {
            // SAFETY: stmt is valid
            unsafe { ffi::sqlany_num_cols(stmt.0.as_ptr()) }
        }

        fn describe_bind_param(&self, stmt: &DbStatement, index: u32) -> Option<ParamDescriptor> {
            // SAFETY: the struct is plain integers and pointers, all-zero is valid
            let mut param: ffi::a_sqlany_bind_param = unsafe { std::mem::zeroed() };
            // SAFETY: stmt is valid, param is a valid out pointer
            let ok = unsafe { ffi::sqlany_describe_bind_param(stmt.0.as_ptr(), index, &mut param) };
            if ok == 0 {
                return None;
            }
            let name = if param.name.is_null() {
                None
            } else {
                // SAFETY: the library returns a NUL-terminated name owned by stmt
                Some(unsafe { CStr::from_ptr(param.name) }.to_string_lossy().into_owned())
            };
            Some(ParamDescriptor {
                direction: Direction::from_code(param.direction),
                data_type: DataType::from_code(param.value.type_),
                name,
            })
        }

        unsafe fn bind_param(&self, stmt: &DbStatement, index: u32, param: &BoundParameter) -> bool {
            let mut raw = ffi::a_sqlany_bind_param {
                direction: param.direction().code(),
                value: ffi::a_sqlany_data_value {
                    buffer: param.buffer().as_ptr().cast_mut().cast(),
                    buffer_size: param.buffer_size(),
                    length: ptr::from_ref(param.length_slot()).cast_mut(),
                    type_: param.data_type().code(),
                    is_null: ptr::from_ref(param.null_slot()).cast_mut(),
                },
                name: ptr::null_mut(),
            };
            // SAFETY: stmt is valid; the caller keeps param alive until execute
            unsafe { ffi::sqlany_bind_param(stmt.0.as_ptr(), index, &mut raw) != 0 }
        }

        fn execute(&self, stmt: &DbStatement) -> bool {
            // SAFETY: stmt is valid, bound buffers are alive per bind_param's contract
            unsafe { ffi::sqlany_execute(stmt.0.as_ptr()) != 0 }
        }

        fn affected_rows(&self, stmt: &DbStatement) -> i32 {
            // SAFETY: stmt is valid
            unsafe { ffi::sqlany_affected_rows(stmt.0.as_ptr()) }
        }

        fn column_info(&self, stmt: &DbStatement, index: u32) -> Option<ColumnDescriptor> {
            // SAFETY: plain integers and pointers, all-zero is valid
            let mut info: ffi::a_sqlany_column_info = unsafe { std::mem::zeroed() };
            // SAFETY: stmt is valid, info is a valid out pointer
            let ok = unsafe { ffi::sqlany_get_column_info(stmt.0.as_ptr(), index, &mut info) };
            if ok == 0 {
                return None;
            }
            let name = if info.name.is_null() {
                String::new()
            } else {
                // SAFETY: the library returns a NUL-terminated name owned by stmt
                unsafe { CStr::from_ptr(info.name) }.to_string_lossy().into_owned()
            };
            Some(ColumnDescriptor {
                name,
                data_type: DataType::from_code(info.type_),
                native_type: NativeType::from_code(info.native_type),
                precision: info.precision,
                scale: info.scale,
                max_size: info.max_size,
                nullable: info.nullable != 0,
            })
        }

        fn fetch_next(&self, stmt: &DbStatement) -> bool {
            // SAFETY: stmt is valid
            unsafe { ffi::sqlany_fetch_next(stmt.0.as_ptr()) != 0 }
        }

        fn get_column<'s>(&self, stmt: &'s DbStatement, index: u32) -> Option<NativeValue<'s>> {
            // SAFETY: plain integers and pointers, all-zero is valid
            let mut value: ffi::a_sqlany_data_value = unsafe { std::mem::zeroed() };
            // SAFETY: stmt is valid, value is a valid out pointer
            let ok = unsafe { ffi::sqlany_get_column(stmt.0.as_ptr(), index, &mut value) };
            if ok == 0 {
                return None;
            }
            let data_type = DataType::from_code(value.type_);
            // SAFETY: is_null, when set, points into stmt-owned storage
            let is_null = !value.is_null.is_null() && unsafe { *value.is_null } != 0;
            if is_null || value.buffer.is_null() {
                return Some(NativeValue {
                    data_type,
                    bytes: Cow::Borrowed(&[]),
                    is_null,
                });
            }
            let len = if value.length.is_null() {
                value.buffer_size
            } else {
                // SAFETY: length points into stmt-owned storage
                unsafe { *value.length }
            };
            // SAFETY: buffer holds at least `len` bytes until the next fetch on stmt
            let bytes = unsafe { std::slice::from_raw_parts(value.buffer.cast::<u8>(), len) };
            Some(NativeValue {
                data_type,
                bytes: Cow::Borrowed(bytes),
                is_null: false,
            })
        }
    }
}
