//! SQL Anywhere driver over the native `dbcapi` client library.
//!
// Binding parameters hands raw buffer pointers to the C library
#![allow(unsafe_code)]
//!
//! The driver marshals [`Value`]s into the library's tagged buffers and back,
//! and drives each prepared statement through prepare, bind, execute, fetch
//! and close. It implements the `Driver`, `Connection`, `Statement`, `Rows`
//! and `Transaction` traits from `sqlany-core`.
//!
//! All native calls go through the [`NativeApi`] trait. With the `dbcapi`
//! feature, [`DbCapi`](native::DbCapi) links the vendor library; without
//! it, [`mock::MockApi`] provides a scripted in-process implementation.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlany::{ConnectOptions, Driver, native::DbCapi};
//! use sqlany_core::Value;
//!
//! let driver = Driver::new(DbCapi).with_app_name("inventory");
//! let conn = driver.connect(&ConnectOptions::new().user("dba").password("sql").server("demo"))?;
//!
//! let mut stmt = conn.prepare("SELECT name FROM items WHERE qty > ?")?;
//! for row in stmt.query(&[Value::Int(10)])? {
//!     let row = row?;
//!     println!("{}", row.get_named::<String>("name")?);
//! }
//! ```
//!
//! # Type Mapping
//!
//! | Rust / `Value`            | Native tag          |
//! |---------------------------|---------------------|
//! | `bool`                    | 8-bit unsigned      |
//! | `i8`, `i16`, `i32`, `i64` | same-width signed   |
//! | `u64`                     | 64-bit unsigned     |
//! | `f32`, `f64`              | double              |
//! | `String`                  | string              |
//! | `Vec<u8>`                 | binary              |
//! | `Option<T>`               | NULL or T           |
//!
//! Dates, decimals, UUIDs, JSON and arrays cannot be bound and fail with
//! `Error::UnsupportedType`.
//!
//! # Thread Safety
//!
//! Nothing here locks. A connection and the statements prepared on it are
//! used from one place at a time; `Connection` is not `Sync`.

pub mod classify;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod ffi;
pub mod mock;
pub mod native;
pub mod statement;
pub mod types;

pub use config::ConnectOptions;
pub use connection::{Connection, DEFAULT_APP_NAME, Driver, Transaction};
pub use cursor::Rows;
pub use native::{ColumnDescriptor, DataType, NativeApi};
pub use statement::{Statement, StatementState};
pub use types::BoundParameter;

pub use sqlany_core::{Error, ExecResult, Fetch, Result, Row, Value};
