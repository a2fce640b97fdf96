//! Low-level FFI bindings to the SQL Anywhere C API (`dbcapi`).
//!
//! These bindings are manually written against API version 1 of `sacapi.h`.
//! We only expose what the driver uses. The constants and struct layouts are
//! always available; the functions are only linked with the `dbcapi`
//! feature.

#![allow(non_camel_case_types)]
#![allow(clippy::upper_case_acronyms)]

use std::ffi::{c_char, c_ushort};

pub type sacapi_bool = i32;
pub type sacapi_i32 = i32;
pub type sacapi_u32 = u32;

/// Opaque connection object.
#[repr(C)]
pub struct a_sqlany_connection {
    _private: [u8; 0],
}

/// Opaque statement object.
#[repr(C)]
pub struct a_sqlany_stmt {
    _private: [u8; 0],
}

pub const SQLANY_API_VERSION_1: sacapi_u32 = 1;

/// Size of the buffer `sqlany_error` needs for a full message.
pub const SQLANY_ERROR_SIZE: usize = 256;

/// Size of the buffer `sqlany_sqlstate` needs (five characters plus NUL).
pub const SQLANY_SQLSTATE_SIZE: usize = 6;

// a_sqlany_data_type
pub const A_INVALID_TYPE: i32 = 0;
pub const A_BINARY: i32 = 1;
pub const A_STRING: i32 = 2;
pub const A_DOUBLE: i32 = 3;
pub const A_VAL64: i32 = 4;
pub const A_UVAL64: i32 = 5;
pub const A_VAL32: i32 = 6;
pub const A_UVAL32: i32 = 7;
pub const A_VAL16: i32 = 8;
pub const A_UVAL16: i32 = 9;
pub const A_VAL8: i32 = 10;
pub const A_UVAL8: i32 = 11;

// a_sqlany_data_direction
pub const DD_INVALID: i32 = 0x0;
pub const DD_INPUT: i32 = 0x1;
pub const DD_OUTPUT: i32 = 0x2;
pub const DD_INPUT_OUTPUT: i32 = 0x3;

/// A tagged value buffer, used for both bound parameters and fetched columns.
#[repr(C)]
pub struct a_sqlany_data_value {
    pub buffer: *mut c_char,
    pub buffer_size: usize,
    pub length: *mut usize,
    pub type_: i32,
    pub is_null: *mut sacapi_bool,
}

#[repr(C)]
pub struct a_sqlany_bind_param {
    pub direction: i32,
    pub value: a_sqlany_data_value,
    pub name: *mut c_char,
}

#[repr(C)]
pub struct a_sqlany_column_info {
    pub name: *mut c_char,
    pub type_: i32,
    pub native_type: i32,
    pub precision: c_ushort,
    pub scale: c_ushort,
    pub max_size: usize,
    pub nullable: sacapi_bool,
}

#[cfg(feature = "dbcapi")]
#[link(name = "dbcapi")]
unsafe extern "C" {
    // Library lifetime
    pub fn sqlany_init(
        app_name: *const c_char,
        api_version: sacapi_u32,
        version_available: *mut sacapi_u32,
    ) -> sacapi_bool;
    pub fn sqlany_fini();

    // Connection management
    pub fn sqlany_new_connection() -> *mut a_sqlany_connection;
    pub fn sqlany_free_connection(conn: *mut a_sqlany_connection);
    pub fn sqlany_connect(conn: *mut a_sqlany_connection, str_: *const c_char) -> sacapi_bool;
    pub fn sqlany_disconnect(conn: *mut a_sqlany_connection) -> sacapi_bool;
    pub fn sqlany_commit(conn: *mut a_sqlany_connection) -> sacapi_bool;
    pub fn sqlany_rollback(conn: *mut a_sqlany_connection) -> sacapi_bool;

    // Error handling
    pub fn sqlany_error(
        conn: *mut a_sqlany_connection,
        buffer: *mut c_char,
        size: usize,
    ) -> sacapi_i32;
    pub fn sqlany_sqlstate(conn: *mut a_sqlany_connection, buffer: *mut c_char, size: usize)
    -> usize;

    // Statement preparation
    pub fn sqlany_prepare(
        conn: *mut a_sqlany_connection,
        sql_str: *const c_char,
    ) -> *mut a_sqlany_stmt;
    pub fn sqlany_execute_direct(
        conn: *mut a_sqlany_connection,
        sql_str: *const c_char,
    ) -> *mut a_sqlany_stmt;
    pub fn sqlany_free_stmt(stmt: *mut a_sqlany_stmt);
    pub fn sqlany_reset(stmt: *mut a_sqlany_stmt) -> sacapi_bool;

    // Parameter binding
    pub fn sqlany_num_params(stmt: *mut a_sqlany_stmt) -> sacapi_i32;
    pub fn sqlany_describe_bind_param(
        stmt: *mut a_sqlany_stmt,
        index: sacapi_u32,
        param: *mut a_sqlany_bind_param,
    ) -> sacapi_bool;
    pub fn sqlany_bind_param(
        stmt: *mut a_sqlany_stmt,
        index: sacapi_u32,
        param: *mut a_sqlany_bind_param,
    ) -> sacapi_bool;

    // Execution and results
    pub fn sqlany_execute(stmt: *mut a_sqlany_stmt) -> sacapi_bool;
    pub fn sqlany_affected_rows(stmt: *mut a_sqlany_stmt) -> sacapi_i32;
    pub fn sqlany_num_cols(stmt: *mut a_sqlany_stmt) -> sacapi_i32;
    pub fn sqlany_fetch_next(stmt: *mut a_sqlany_stmt) -> sacapi_bool;
    pub fn sqlany_get_column(
        stmt: *mut a_sqlany_stmt,
        col_index: sacapi_u32,
        buffer: *mut a_sqlany_data_value,
    ) -> sacapi_bool;
    pub fn sqlany_get_column_info(
        stmt: *mut a_sqlany_stmt,
        col_index: sacapi_u32,
        buffer: *mut a_sqlany_column_info,
    ) -> sacapi_bool;
}
