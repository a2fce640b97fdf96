//! Core types and traits for the SQL Anywhere Rust driver.
//!
//! This crate holds the engine-independent pieces a generic SQL front-end
//! works with:
//!
//! - `Value` for dynamically-typed bind arguments and column values
//! - `Row` and `ColumnInfo` for decoded result rows
//! - `Error` with a typed taxonomy separating "no more rows" from real faults
//! - `Driver`, `Connection`, `Statement`, `Rows` and `Transaction` traits

pub mod driver;
pub mod error;
pub mod row;
pub mod value;

pub use driver::{Connection, Driver, ExecResult, Fetch, Rows, Statement, Transaction};
pub use error::{Error, NativeError, Result};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
