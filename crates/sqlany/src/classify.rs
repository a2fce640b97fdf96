//! Separating "no more rows" from real failures.
//!
//! When `fetch_next` returns false the library records why on the
//! connection. SQLCODE 100 means the cursor is simply exhausted; anything
//! else is a fault that must reach the caller.

use sqlany_core::{Error, Fetch, NativeError, Result};

/// The two meanings of a failed native call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// The result set is exhausted.
    EndOfData,
    /// A genuine failure.
    Fault(NativeError),
}

/// Classify the error recorded after a native call returned false.
///
/// A zero code means the library recorded nothing, which only happens
/// when a fetch ran off the end without an error.
pub fn classify(err: NativeError) -> Classified {
    if err.is_end_of_result_set() || err.code == 0 {
        Classified::EndOfData
    } else {
        Classified::Fault(err)
    }
}

/// Turn a failed fetch into the cursor's outcome.
#[allow(clippy::result_large_err)]
pub fn fetch_outcome(err: NativeError, sql: Option<&str>) -> Result<Fetch> {
    match classify(err) {
        Classified::EndOfData => Ok(Fetch::EndOfData),
        Classified::Fault(err) => Err(fault(err, sql)),
    }
}

/// Turn a failed call that is never allowed to mean "no rows" into an error.
///
/// Used for prepare, execute, commit and the like, where even the sentinel
/// code is a failure of the call.
pub fn fault(err: NativeError, sql: Option<&str>) -> Error {
    match sql {
        Some(sql) if err.sql.is_none() => Error::Native(err.with_sql(sql)),
        _ => Error::Native(err),
    }
}
