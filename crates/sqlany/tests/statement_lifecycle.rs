//! Statement lifecycle tests: prepare, bind, execute, fetch and close
//! against the scripted mock library.

mod common;

use sqlany::mock::{Call, MockResult, Script};
use sqlany::{DataType, Error, Fetch, StatementState, Value};
use sqlany_core::NativeError;
use sqlany_core::driver;
use sqlany_core::error::UsageErrorKind;

fn echo_script(param: DataType) -> Script {
    Script::new()
        .params([param])
        .columns([("v", param)])
        .returning(|args| Ok(MockResult::rows(vec![args.to_vec()])))
}

fn counting_script(rows: i64) -> Script {
    Script::new()
        .columns([("n", DataType::Val64)])
        .rows((1..=rows).map(|n| vec![Value::BigInt(n)]).collect())
}

#[test]
fn test_values_round_trip_through_bind_and_fetch() {
    let (api, conn) = common::connect();
    let cases = [
        (DataType::Val8, Value::TinyInt(-7)),
        (DataType::Val16, Value::SmallInt(-300)),
        (DataType::Val32, Value::Int(123_456)),
        (DataType::Val64, Value::BigInt(i64::MIN)),
        (DataType::UVal64, Value::UBigInt(u64::MAX)),
        (DataType::Double, Value::Double(2.5)),
        (DataType::String, Value::Text("bob".to_string())),
        (DataType::String, Value::Text(String::new())),
        (DataType::Binary, Value::Bytes(vec![0, 255, 7])),
        (DataType::Binary, Value::Bytes(Vec::new())),
        (DataType::String, Value::Null),
    ];

    for (tag, value) in cases {
        api.script("select ?", echo_script(tag));
        let mut stmt = conn.prepare("select ?").unwrap();
        let rows = stmt.query_rows(std::slice::from_ref(&value)).unwrap();
        assert_eq!(rows.len(), 1, "{value:?}");
        assert_eq!(rows[0].get(0), Some(&value));
        assert_eq!(api.executions().last().unwrap().args, vec![value.clone()]);
    }
}

#[test]
fn test_float_and_bool_widen_on_bind() {
    let (api, conn) = common::connect();
    api.script("select ?", echo_script(DataType::Double));

    let rows = conn.query("select ?", &[Value::Float(0.5)]).unwrap();
    assert_eq!(rows[0].get(0), Some(&Value::Double(0.5)));

    api.script("select ?", echo_script(DataType::UVal8));
    let rows = conn.query("select ?", &[Value::Bool(true)]).unwrap();
    assert_eq!(rows[0].get(0), Some(&Value::SmallInt(1)));
    assert!(rows[0].get_as::<bool>(0).unwrap());
}

#[test]
fn test_argument_count_mismatch_binds_nothing() {
    let (api, conn) = common::connect();
    api.script(
        "insert into t values (?, ?)",
        Script::new()
            .params([DataType::Val32, DataType::Val32])
            .affecting(1),
    );
    let mut stmt = conn.prepare("insert into t values (?, ?)").unwrap();
    assert_eq!(stmt.num_input(), 2);
    api.clear_calls();

    for args in [vec![], vec![Value::Int(1)], vec![Value::Int(1); 3]] {
        match stmt.exec(&args) {
            Err(Error::ArgumentCount(e)) => {
                assert_eq!(e.expected, 2);
                assert_eq!(e.actual, args.len());
            }
            other => panic!("expected argument count error, got {other:?}"),
        }
    }
    assert_eq!(api.count(Call::DescribeBindParam), 0);
    assert_eq!(api.count(Call::BindParam), 0);
    assert_eq!(api.count(Call::Execute), 0);

    let result = stmt.exec(&[Value::Int(1), Value::Int(2)]).unwrap();
    assert_eq!(result.rows_affected, 1);
    assert_eq!(api.count(Call::BindParam), 2);
}

#[test]
fn test_unsupported_type_aborts_before_any_bind() {
    let (api, conn) = common::connect();
    api.script(
        "insert into t values (?, ?)",
        Script::new()
            .params([DataType::Val32, DataType::String])
            .affecting(1),
    );
    let mut stmt = conn.prepare("insert into t values (?, ?)").unwrap();
    api.clear_calls();

    let err = stmt
        .exec(&[Value::Int(1), Value::Date(19_000)])
        .unwrap_err();
    match err {
        Error::UnsupportedType(e) => {
            assert_eq!(e.index, 1);
            assert_eq!(e.type_name, "DATE");
        }
        other => panic!("expected unsupported type, got {other:?}"),
    }
    assert_eq!(api.count(Call::DescribeBindParam), 2);
    assert_eq!(api.count(Call::BindParam), 0);
    assert_eq!(api.count(Call::Execute), 0);
}

#[test]
fn test_bind_failure_stops_execute() {
    let (api, conn) = common::connect();
    api.script("select ?", echo_script(DataType::Val32));
    let mut stmt = conn.prepare("select ?").unwrap();
    api.fail_bind(Some(NativeError::new(-157, "Cannot convert to a numeric")));
    api.clear_calls();

    let err = stmt.exec(&[Value::Int(1)]).unwrap_err();
    assert_eq!(err.native_code(), Some(-157));
    assert_eq!(err.sql(), Some("select ?"));
    assert_eq!(api.count(Call::Execute), 0);
}

#[test]
fn test_describe_failure_stops_execute() {
    let (api, conn) = common::connect();
    api.script("select ?", echo_script(DataType::Val32));
    let mut stmt = conn.prepare("select ?").unwrap();
    api.fail_describe_bind(Some(NativeError::new(-1013, "Host variable describe failed")));
    api.clear_calls();

    match stmt.exec(&[Value::Int(1)]) {
        Err(Error::Native(e)) => {
            assert_eq!(e.code, -1013);
            assert_eq!(e.sql.as_deref(), Some("select ?"));
        }
        other => panic!("expected native error, got {other:?}"),
    }
    assert_eq!(api.count(Call::DescribeBindParam), 1);
    assert_eq!(api.count(Call::BindParam), 0);
    assert_eq!(api.count(Call::Execute), 0);

    api.fail_describe_bind(None);
    assert!(stmt.exec(&[Value::Int(1)]).is_ok());
}

#[test]
fn test_column_describe_failure_aborts_prepare() {
    let (api, conn) = common::connect();
    api.script("select n from seq", counting_script(2));
    api.fail_column_info(Some(NativeError::new(-1014, "Column describe failed")));

    match conn.prepare("select n from seq") {
        Err(Error::Native(e)) => {
            assert_eq!(e.code, -1014);
            assert_eq!(e.message, "Column describe failed");
        }
        Err(other) => panic!("expected native error, got {other:?}"),
        Ok(_) => panic!("prepare succeeded without column metadata"),
    }
    assert_eq!(api.count(Call::ColumnInfo), 1);
    assert_eq!(api.count(Call::FreeStmt), 1);
    assert_eq!(api.live_statements(), 0);
}

#[test]
fn test_fetch_n_rows_then_end_of_data() {
    let (api, conn) = common::connect();
    api.script("select n from seq", counting_script(3));

    let mut stmt = conn.prepare("select n from seq").unwrap();
    let mut rows = stmt.query(&[]).unwrap();
    assert_eq!(rows.columns(), ["n".to_string()]);

    let mut dest = [Value::Null];
    let mut seen = Vec::new();
    loop {
        match rows.next_into(&mut dest).unwrap() {
            Fetch::Row => seen.push(dest[0].clone()),
            Fetch::EndOfData => break,
        }
    }
    assert_eq!(
        seen,
        vec![Value::BigInt(1), Value::BigInt(2), Value::BigInt(3)]
    );
    assert!(rows.is_exhausted());
    assert_eq!(rows.next_into(&mut dest).unwrap(), Fetch::EndOfData);
    assert_eq!(api.count(Call::FetchNext), 4);
}

#[test]
fn test_empty_result_set() {
    let (api, conn) = common::connect();
    api.script("select n from seq", counting_script(0));

    let mut stmt = conn.prepare("select n from seq").unwrap();
    let mut rows = stmt.query(&[]).unwrap();
    assert_eq!(rows.next_into(&mut [Value::Null]).unwrap(), Fetch::EndOfData);
}

#[test]
fn test_fault_during_fetch_is_not_end_of_data() {
    let (api, conn) = common::connect();
    let fault = NativeError::new(-308, "Connection was terminated");
    api.script(
        "select n from seq",
        Script::new()
            .columns([("n", DataType::Val64)])
            .returning(move |_| {
                Ok(MockResult::rows(vec![vec![Value::BigInt(1)], vec![Value::BigInt(2)]])
                    .with_fault_after(1, fault.clone()))
            }),
    );

    let mut stmt = conn.prepare("select n from seq").unwrap();
    let mut rows = stmt.query(&[]).unwrap();
    let mut dest = [Value::Null];

    assert_eq!(rows.next_into(&mut dest).unwrap(), Fetch::Row);
    let err = rows.next_into(&mut dest).unwrap_err();
    assert_eq!(err.native_code(), Some(-308));
    assert!(!err.is_end_of_data());
    assert!(rows.is_abandoned());

    match rows.next_into(&mut dest) {
        Err(Error::Usage(u)) => assert_eq!(u.kind, UsageErrorKind::CursorAbandoned),
        other => panic!("expected abandoned cursor, got {other:?}"),
    }
}

#[test]
fn test_iterator_stops_after_fault() {
    let (api, conn) = common::connect();
    api.script(
        "select n from seq",
        Script::new()
            .columns([("n", DataType::Val64)])
            .returning(|_| {
                Ok(MockResult::rows(vec![vec![Value::BigInt(1)]])
                    .with_fault_after(1, NativeError::new(-300, "Run time SQL error")))
            }),
    );

    let mut stmt = conn.prepare("select n from seq").unwrap();
    let results: Vec<_> = stmt.query(&[]).unwrap().collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().get_as::<i64>(0).unwrap(), 1);
    assert_eq!(results[1].as_ref().unwrap_err().native_code(), Some(-300));
}

#[test]
fn test_close_is_idempotent() {
    let (api, conn) = common::connect();
    api.script("select n from seq", counting_script(2));

    let mut stmt = conn.prepare("select n from seq").unwrap();
    stmt.close().unwrap();
    stmt.close().unwrap();
    assert!(stmt.is_closed());
    assert_eq!(stmt.state(), StatementState::Closed);
    drop(stmt);

    assert_eq!(api.count(Call::FreeStmt), 1);
    assert_eq!(api.live_statements(), 0);
}

#[test]
fn test_use_after_close_is_usage_error() {
    let (api, conn) = common::connect();
    api.script("select n from seq", counting_script(2));

    let mut stmt = conn.prepare("select n from seq").unwrap();
    stmt.close().unwrap();
    match stmt.query(&[]) {
        Err(Error::Usage(u)) => assert_eq!(u.kind, UsageErrorKind::StatementClosed),
        Err(other) => panic!("expected usage error, got {other:?}"),
        Ok(_) => panic!("query on a closed statement succeeded"),
    }
}

#[test]
fn test_close_resets_open_result_set() {
    let (api, conn) = common::connect();
    api.script("select n from seq", counting_script(5));

    let mut stmt = conn.prepare("select n from seq").unwrap();
    {
        let mut rows = stmt.query(&[]).unwrap();
        assert!(rows.fetch().unwrap().is_some());
    }
    api.clear_calls();
    stmt.close().unwrap();
    assert_eq!(api.calls(), vec![Call::Reset, Call::FreeStmt]);
}

#[test]
fn test_drop_frees_statement() {
    let (api, conn) = common::connect();
    api.script("select n from seq", counting_script(1));
    {
        let _stmt = conn.prepare("select n from seq").unwrap();
        assert_eq!(api.live_statements(), 1);
    }
    assert_eq!(api.live_statements(), 0);
    assert_eq!(api.count(Call::FreeStmt), 1);
}

#[test]
fn test_reexecute_resets_cursor() {
    let (api, conn) = common::connect();
    api.script(
        "select n from seq where n >= ?",
        Script::new()
            .params([DataType::Val32])
            .columns([("n", DataType::Val32)])
            .returning(|args| {
                let start = args[0].as_i64().unwrap_or(0);
                let rows = (start..=5)
                    .map(|n| vec![Value::Int(i32::try_from(n).unwrap())])
                    .collect();
                Ok(MockResult::rows(rows))
            }),
    );

    let mut stmt = conn.prepare("select n from seq where n >= ?").unwrap();
    {
        let mut rows = stmt.query(&[Value::Int(1)]).unwrap();
        let first = rows.fetch().unwrap().unwrap();
        assert_eq!(first.get_as::<i32>(0).unwrap(), 1);
        let second = rows.fetch().unwrap().unwrap();
        assert_eq!(second.get_as::<i32>(0).unwrap(), 2);
    }
    assert_eq!(stmt.state(), StatementState::Fetching);

    api.clear_calls();
    let mut rows = stmt.query(&[Value::Int(3)]).unwrap();
    let first = rows.fetch().unwrap().unwrap();
    assert_eq!(first.get_as::<i32>(0).unwrap(), 3);
    assert_eq!(api.count(Call::Reset), 1);
    assert_eq!(api.calls()[0], Call::Reset);
}

#[test]
fn test_select_sum_end_to_end() {
    let (api, conn) = common::connect();
    api.script(
        "SELECT ? + ?",
        Script::new()
            .params([DataType::Val32, DataType::Val32])
            .columns([("expression", DataType::Val64)])
            .returning(|args| {
                let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
                Ok(MockResult::rows(vec![vec![Value::BigInt(sum)]]))
            }),
    );

    let mut stmt = conn.prepare("SELECT ? + ?").unwrap();
    let mut rows = stmt.query(&[Value::Int(2), Value::Int(3)]).unwrap();
    let mut dest = [Value::Null];
    assert_eq!(rows.next_into(&mut dest).unwrap(), Fetch::Row);
    assert_eq!(dest[0], Value::BigInt(5));
    assert_eq!(rows.next_into(&mut dest).unwrap(), Fetch::EndOfData);
}

#[test]
fn test_columns_described_once_at_prepare() {
    let (api, conn) = common::connect();
    api.script(
        "select id, name from users",
        Script::new()
            .columns([("id", DataType::Val32), ("name", DataType::String)])
            .rows(vec![
                vec![Value::Int(1), Value::Text("Alice".to_string())],
                vec![Value::Int(2), Value::Null],
            ]),
    );

    let mut stmt = conn.prepare("select id, name from users").unwrap();
    assert_eq!(api.count(Call::ColumnInfo), 2);
    assert_eq!(stmt.column_names(), ["id".to_string(), "name".to_string()]);
    assert_eq!(stmt.columns()[1].data_type, DataType::String);

    let rows = stmt.query_rows(&[]).unwrap();
    let rows_again = stmt.query_rows(&[]).unwrap();
    assert_eq!(api.count(Call::ColumnInfo), 2);

    assert_eq!(rows.len(), 2);
    assert_eq!(rows_again.len(), 2);
    assert_eq!(rows[0].get_named::<String>("name").unwrap(), "Alice");
    assert_eq!(rows[1].get_named::<Option<String>>("name").unwrap(), None);
    assert!(std::sync::Arc::ptr_eq(
        &rows[0].column_info(),
        &rows[1].column_info()
    ));
}

#[test]
fn test_destination_too_small() {
    let (api, conn) = common::connect();
    api.script(
        "select a, b from t",
        Script::new()
            .columns([("a", DataType::Val32), ("b", DataType::Val32)])
            .rows(vec![vec![Value::Int(1), Value::Int(2)]]),
    );

    let mut stmt = conn.prepare("select a, b from t").unwrap();
    let mut rows = stmt.query(&[]).unwrap();
    match rows.next_into(&mut [Value::Null]) {
        Err(Error::Usage(u)) => assert_eq!(u.kind, UsageErrorKind::DestinationTooSmall),
        other => panic!("expected usage error, got {other:?}"),
    }
    assert_eq!(api.count(Call::FetchNext), 0);
}

#[test]
fn test_exec_reports_affected_rows() {
    let (api, conn) = common::connect();
    api.script("delete from t", Script::new().affecting(4));
    api.script("call p()", Script::new().affecting(-1));

    assert_eq!(conn.exec("delete from t", &[]).unwrap().rows_affected, 4);
    assert_eq!(conn.exec("call p()", &[]).unwrap().rows_affected, 0);
    assert_eq!(api.live_statements(), 0);
}

#[test]
fn test_query_without_result_set_yields_nothing() {
    let (api, conn) = common::connect();
    api.script("update t set a = 1", Script::new().affecting(3));

    let mut stmt = conn.prepare("update t set a = 1").unwrap();
    api.clear_calls();
    assert!(stmt.query_rows(&[]).unwrap().is_empty());
    assert_eq!(api.count(Call::FetchNext), 0);
}

#[test]
fn test_prepare_failure_carries_sql() {
    let (api, conn) = common::connect();
    let err = conn.prepare("selec 1").err().unwrap();
    assert_eq!(err.native_code(), Some(sqlany::mock::SYNTAX_ERROR));
    assert_eq!(err.sql(), Some("selec 1"));
    assert_eq!(api.live_statements(), 0);
}

#[test]
fn test_execute_failure_is_native_error() {
    let (api, conn) = common::connect();
    api.script(
        "insert into t values (1)",
        Script::new().failing(NativeError::new(-193, "Primary key for table 't' is not unique")),
    );
    let err = conn.exec("insert into t values (1)", &[]).unwrap_err();
    assert_eq!(err.native_code(), Some(-193));
    assert_eq!(api.live_statements(), 0);
}

#[test]
fn test_sql_with_nul_is_config_error() {
    let (_api, conn) = common::connect();
    assert!(matches!(conn.prepare("select 1\0"), Err(Error::Config(_))));
}

fn first_value<C: driver::Connection>(conn: &C, sql: &str, args: &[Value]) -> Value {
    use sqlany_core::driver::{Rows as _, Statement as _};

    let mut stmt = conn.prepare(sql).unwrap();
    assert_eq!(stmt.num_input(), args.len());
    let mut rows = stmt.query(args).unwrap();
    let mut dest = vec![Value::Null; rows.columns().len()];
    assert_eq!(rows.next_into(&mut dest).unwrap(), Fetch::Row);
    dest.remove(0)
}

#[test]
fn test_generic_front_end_traits() {
    let (api, conn) = common::connect();
    api.script("select ?", echo_script(DataType::String));
    assert_eq!(
        first_value(&conn, "select ?", &[Value::Text("via traits".to_string())]),
        Value::Text("via traits".to_string())
    );
}
