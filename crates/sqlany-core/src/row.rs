//! Decoded result rows.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Result column names, fixed when the statement is prepared.
///
/// Every row decoded from one statement holds the same `Arc<ColumnInfo>`.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnInfo {
    /// A repeated name (e.g. `SELECT 1, 1`) resolves to its first position.
    pub fn new(names: Vec<String>) -> Self {
        let mut positions = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            positions.entry(name.clone()).or_insert(i);
        }
        Self { names, positions }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }
}

/// One row of a result set.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// The column names shared with every other row of the result set.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Convert the value at `index`.
    #[allow(clippy::result_large_err)]
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        match self.get(index) {
            Some(value) => T::from_value(value),
            None => Err(missing::<T>(
                format!("no column {index} in a {}-column row", self.len()),
                None,
            )),
        }
    }

    /// Convert the value of the column called `name`. Type errors name the
    /// column.
    #[allow(clippy::result_large_err)]
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let Some(value) = self.get_by_name(name) else {
            return Err(missing::<T>(
                format!("no column named '{name}'"),
                Some(name),
            ));
        };
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            other => other,
        })
    }
}

fn missing<T>(actual: String, column: Option<&str>) -> Error {
    Error::Type(TypeError {
        expected: std::any::type_name::<T>(),
        actual,
        column: column.map(str::to_string),
        rust_type: None,
    })
}

/// Typed extraction from a [`Value`].
pub trait FromValue: Sized {
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value, detail: &str) -> Error {
    Error::Type(TypeError {
        expected,
        actual: format!("{}{detail}", value.type_name()),
        column: None,
        rust_type: None,
    })
}

/// Integers go through the widest accessor and are narrowed with a range
/// check.
macro_rules! narrow_from {
    ($($ty:ty => $wide:ident),* $(,)?) => {$(
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self> {
                let wide = value
                    .$wide()
                    .ok_or_else(|| mismatch(stringify!($ty), value, ""))?;
                <$ty>::try_from(wide).map_err(|_| mismatch(stringify!($ty), value, " out of range"))
            }
        }
    )*};
}

narrow_from! {
    i16 => as_i64,
    i32 => as_i64,
    i64 => as_i64,
    u32 => as_u64,
    u64 => as_u64,
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", value, ""))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("f64", value, ""))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) | Value::Decimal(s) => Ok(s.clone()),
            _ => Err(mismatch("String", value, "")),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            _ => Err(mismatch("Vec<u8>", value, "")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}
