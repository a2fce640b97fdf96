//! Shared fixtures for the driver integration tests.

#![allow(dead_code)]

use sqlany::mock::MockApi;
use sqlany::{ConnectOptions, Connection, Driver};

/// Option string used by every fixture connection.
pub const OPTIONS: &str = "uid=dba;pwd=sql;server=demo";

/// A driver over a fresh mock, plus a handle for inspecting the mock.
pub fn driver() -> (MockApi, Driver<MockApi>) {
    let api = MockApi::new();
    (api.clone(), Driver::new(api))
}

/// An open connection over a fresh mock. Calls made while opening are
/// cleared so tests only see their own.
pub fn connect() -> (MockApi, Connection<MockApi>) {
    let (api, driver) = driver();
    let conn = driver
        .connect(&ConnectOptions::from_raw(OPTIONS))
        .expect("fixture connection should open");
    api.clear_calls();
    (api, conn)
}
