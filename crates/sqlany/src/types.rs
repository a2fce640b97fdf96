//! Type encoding and decoding between Rust and SQL Anywhere.
//!
//! The C API moves values as tagged buffers: a type tag, a byte buffer,
//! the buffer's capacity and a separate logical length. Parameters are
//! encoded into a [`BoundParameter`] that owns all of that storage, and
//! fetched columns are decoded from a [`NativeValue`].
//!
//! | `Value`                   | tag      | notes                            |
//! |---------------------------|----------|----------------------------------|
//! | `Bool`                    | `UVal8`  | 1 or 0                           |
//! | `TinyInt`..`BigInt`       | `Val8`..`Val64` | same width as the source  |
//! | `UBigInt`                 | `UVal64` |                                  |
//! | `Float`, `Double`         | `Double` | always 8 bytes                   |
//! | `Text`                    | `String` | NUL-terminated, length excludes it |
//! | `Bytes`                   | `Binary` | capacity equals length           |
//! | `Null`                    | declared | null indicator set               |

use crate::native::{ColumnDescriptor, DataType, Direction, NativeBool, NativeValue, ParamDescriptor};
use sqlany_core::error::{TypeError, UnsupportedTypeError};
use sqlany_core::{Error, Result, Value};

/// Zeroed storage handed over for NULL parameters, wide enough for any
/// fixed-size tag.
const NULL_PLACEHOLDER: [u8; 8] = [0; 8];

/// One encoded bind argument.
///
/// Owns the buffer and the length and null-indicator slots the library
/// reads through raw pointers. It must outlive the execute call that
/// consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundParameter {
    direction: Direction,
    data_type: DataType,
    buffer: Vec<u8>,
    buffer_size: usize,
    length: usize,
    is_null: NativeBool,
}

impl BoundParameter {
    fn fixed(data_type: DataType, bytes: &[u8]) -> Self {
        Self {
            direction: Direction::Input,
            data_type,
            buffer: bytes.to_vec(),
            buffer_size: bytes.len(),
            length: bytes.len(),
            is_null: 0,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// The storage the library reads from.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Capacity reported to the library. For strings this counts the NUL.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Logical length of the value. For strings this excludes the NUL.
    pub fn value_length(&self) -> usize {
        self.length
    }

    pub fn is_null(&self) -> bool {
        self.is_null != 0
    }

    /// The bytes that make up the value itself.
    pub fn value_bytes(&self) -> &[u8] {
        if self.is_null() {
            &[]
        } else {
            &self.buffer[..self.length.min(self.buffer.len())]
        }
    }

    #[cfg_attr(not(feature = "dbcapi"), allow(dead_code))]
    pub(crate) fn length_slot(&self) -> &usize {
        &self.length
    }

    #[cfg_attr(not(feature = "dbcapi"), allow(dead_code))]
    pub(crate) fn null_slot(&self) -> &NativeBool {
        &self.is_null
    }
}

/// Encode `value` for the placeholder at zero-based `index`.
///
/// `declared` is what the library reported for the placeholder. Only its
/// direction and, for NULLs, its type are used; every other value is
/// tagged by its own kind.
#[allow(clippy::result_large_err)]
pub fn encode(index: usize, value: &Value, declared: &ParamDescriptor) -> Result<BoundParameter> {
    let mut param = match value {
        Value::Null => {
            let data_type = match declared.data_type {
                DataType::Invalid => DataType::String,
                declared => declared,
            };
            BoundParameter {
                direction: Direction::Input,
                data_type,
                buffer: NULL_PLACEHOLDER.to_vec(),
                buffer_size: NULL_PLACEHOLDER.len(),
                length: 0,
                is_null: 1,
            }
        }

        Value::Bool(b) => BoundParameter::fixed(DataType::UVal8, &[u8::from(*b)]),

        Value::TinyInt(v) => BoundParameter::fixed(DataType::Val8, &v.to_ne_bytes()),

        Value::SmallInt(v) => BoundParameter::fixed(DataType::Val16, &v.to_ne_bytes()),

        Value::Int(v) => BoundParameter::fixed(DataType::Val32, &v.to_ne_bytes()),

        Value::BigInt(v) => BoundParameter::fixed(DataType::Val64, &v.to_ne_bytes()),

        Value::UBigInt(v) => BoundParameter::fixed(DataType::UVal64, &v.to_ne_bytes()),

        Value::Float(v) => BoundParameter::fixed(DataType::Double, &f64::from(*v).to_ne_bytes()),

        Value::Double(v) => BoundParameter::fixed(DataType::Double, &v.to_ne_bytes()),

        Value::Text(s) => {
            let mut buffer = Vec::with_capacity(s.len() + 1);
            buffer.extend_from_slice(s.as_bytes());
            buffer.push(0);
            BoundParameter {
                direction: Direction::Input,
                data_type: DataType::String,
                buffer_size: buffer.len(),
                length: s.len(),
                buffer,
                is_null: 0,
            }
        }

        // An empty Vec never allocates; its pointer is dangling but never read
        // because both sizes are zero.
        Value::Bytes(b) => BoundParameter::fixed(DataType::Binary, b),

        other => {
            return Err(Error::UnsupportedType(UnsupportedTypeError {
                type_name: other.type_name(),
                index,
            }));
        }
    };

    if declared.direction != Direction::Invalid {
        param.direction = declared.direction;
    }
    Ok(param)
}

fn short_buffer(column: &ColumnDescriptor, expected: &'static str, got: usize) -> Error {
    Error::Type(TypeError {
        expected,
        actual: format!("{got}-byte buffer"),
        column: Some(column.name.clone()),
        rust_type: None,
    })
}

fn fixed<const N: usize>(
    column: &ColumnDescriptor,
    expected: &'static str,
    bytes: &[u8],
) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|b| <[u8; N]>::try_from(b).ok())
        .ok_or_else(|| short_buffer(column, expected, bytes.len()))
}

/// Decode the value fetched for `column` in the current row.
///
/// The value's own tag drives decoding. Unsigned tags widen to the next
/// signed type so nothing is lost; unsigned 64-bit stays unsigned.
#[allow(clippy::result_large_err)]
pub fn decode(column: &ColumnDescriptor, value: &NativeValue<'_>) -> Result<Value> {
    if value.is_null {
        return Ok(Value::Null);
    }
    let bytes = value.bytes.as_ref();

    let decoded = match value.data_type {
        DataType::Val8 => Value::TinyInt(i8::from_ne_bytes(fixed(column, "1-byte integer", bytes)?)),
        DataType::UVal8 => Value::SmallInt(i16::from(u8::from_ne_bytes(fixed(
            column,
            "1-byte integer",
            bytes,
        )?))),
        DataType::Val16 => {
            Value::SmallInt(i16::from_ne_bytes(fixed(column, "2-byte integer", bytes)?))
        }
        DataType::UVal16 => Value::Int(i32::from(u16::from_ne_bytes(fixed(
            column,
            "2-byte integer",
            bytes,
        )?))),
        DataType::Val32 => Value::Int(i32::from_ne_bytes(fixed(column, "4-byte integer", bytes)?)),
        DataType::UVal32 => Value::BigInt(i64::from(u32::from_ne_bytes(fixed(
            column,
            "4-byte integer",
            bytes,
        )?))),
        DataType::Val64 => {
            Value::BigInt(i64::from_ne_bytes(fixed(column, "8-byte integer", bytes)?))
        }
        DataType::UVal64 => {
            Value::UBigInt(u64::from_ne_bytes(fixed(column, "8-byte integer", bytes)?))
        }
        DataType::Double => Value::Double(f64::from_ne_bytes(fixed(column, "8-byte float", bytes)?)),
        DataType::String => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        DataType::Binary => Value::Bytes(bytes.to_vec()),
        DataType::Invalid => {
            return Err(Error::Type(TypeError {
                expected: "a known native type tag",
                actual: "A_INVALID_TYPE".to_string(),
                column: Some(column.name.clone()),
                rust_type: None,
            }));
        }
    };
    Ok(decoded)
}

/// Decode a bound parameter back into the value it carries, as the library
/// would see it on the other side of the call.
#[allow(clippy::result_large_err)]
pub fn decode_bound(param: &BoundParameter) -> Result<Value> {
    let column = ColumnDescriptor::new("?", param.data_type());
    let value = if param.is_null() {
        NativeValue::null(param.data_type())
    } else {
        NativeValue::owned(param.data_type(), param.value_bytes().to_vec())
    };
    decode(&column, &value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared() -> ParamDescriptor {
        ParamDescriptor::input(DataType::Val32)
    }

    #[test]
    fn test_encode_string_layout() {
        let p = encode(0, &Value::Text("bob".to_string()), &declared()).unwrap();
        assert_eq!(p.data_type(), DataType::String);
        assert_eq!(p.buffer_size(), 4);
        assert_eq!(p.value_length(), 3);
        assert_eq!(p.buffer(), b"bob\0");
        assert_eq!(p.buffer()[3], 0);
        assert!(!p.is_null());
        assert_eq!(decode_bound(&p).unwrap(), Value::Text("bob".to_string()));
    }

    #[test]
    fn test_encode_empty_string() {
        let p = encode(0, &Value::Text(String::new()), &declared()).unwrap();
        assert_eq!(p.buffer_size(), 1);
        assert_eq!(p.value_length(), 0);
        assert_eq!(p.buffer(), &[0]);
    }

    #[test]
    fn test_encode_integers_keep_width() {
        let cases = [
            (Value::TinyInt(-5), DataType::Val8, 1),
            (Value::SmallInt(-300), DataType::Val16, 2),
            (Value::Int(70_000), DataType::Val32, 4),
            (Value::BigInt(i64::MIN), DataType::Val64, 8),
            (Value::UBigInt(u64::MAX), DataType::UVal64, 8),
        ];
        for (value, tag, width) in cases {
            let p = encode(0, &value, &declared()).unwrap();
            assert_eq!(p.data_type(), tag, "{value:?}");
            assert_eq!(p.buffer_size(), width);
            assert_eq!(p.value_length(), width);
            assert_eq!(decode_bound(&p).unwrap(), value);
        }
    }

    #[test]
    fn test_encode_bool_as_unsigned_byte() {
        let t = encode(0, &Value::Bool(true), &declared()).unwrap();
        let f = encode(0, &Value::Bool(false), &declared()).unwrap();
        assert_eq!(t.data_type(), DataType::UVal8);
        assert_eq!(t.buffer(), &[1]);
        assert_eq!(f.buffer(), &[0]);
    }

    #[test]
    fn test_encode_float_widens_to_double() {
        let p = encode(0, &Value::Float(1.5), &declared()).unwrap();
        assert_eq!(p.data_type(), DataType::Double);
        assert_eq!(p.buffer_size(), 8);
        assert_eq!(decode_bound(&p).unwrap(), Value::Double(1.5));
    }

    #[test]
    fn test_encode_bytes() {
        let p = encode(0, &Value::Bytes(vec![0, 1, 2]), &declared()).unwrap();
        assert_eq!(p.data_type(), DataType::Binary);
        assert_eq!(p.buffer_size(), 3);
        assert_eq!(p.value_length(), 3);

        let empty = encode(0, &Value::Bytes(Vec::new()), &declared()).unwrap();
        assert_eq!(empty.buffer_size(), 0);
        assert_eq!(empty.value_length(), 0);
        assert!(empty.buffer().is_empty());
        assert_eq!(decode_bound(&empty).unwrap(), Value::Bytes(Vec::new()));
    }

    #[test]
    fn test_encode_null_uses_declared_type() {
        let p = encode(0, &Value::Null, &declared()).unwrap();
        assert!(p.is_null());
        assert_eq!(p.data_type(), DataType::Val32);
        assert_eq!(p.buffer().len(), NULL_PLACEHOLDER.len());
        assert_eq!(decode_bound(&p).unwrap(), Value::Null);

        let untyped = encode(0, &Value::Null, &ParamDescriptor::input(DataType::Invalid)).unwrap();
        assert_eq!(untyped.data_type(), DataType::String);
    }

    #[test]
    fn test_encode_unsupported() {
        let err = encode(2, &Value::Date(19_000), &declared()).unwrap_err();
        match err {
            Error::UnsupportedType(e) => {
                assert_eq!(e.index, 2);
                assert_eq!(e.type_name, "DATE");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(encode(0, &Value::Json(serde_json::json!({})), &declared()).is_err());
        assert!(encode(0, &Value::Decimal("1.5".into()), &declared()).is_err());
    }

    #[test]
    fn test_decode_unsigned_widening() {
        let col = ColumnDescriptor::new("n", DataType::UVal8);
        let v = NativeValue::owned(DataType::UVal8, vec![200]);
        assert_eq!(decode(&col, &v).unwrap(), Value::SmallInt(200));

        let v = NativeValue::owned(DataType::UVal16, 65_535u16.to_ne_bytes().to_vec());
        assert_eq!(decode(&col, &v).unwrap(), Value::Int(65_535));

        let v = NativeValue::owned(DataType::UVal32, u32::MAX.to_ne_bytes().to_vec());
        assert_eq!(decode(&col, &v).unwrap(), Value::BigInt(i64::from(u32::MAX)));
    }

    #[test]
    fn test_decode_string_exact_length() {
        let col = ColumnDescriptor::new("s", DataType::String);
        let v = NativeValue::owned(DataType::String, b"  padded  ".to_vec());
        assert_eq!(decode(&col, &v).unwrap(), Value::Text("  padded  ".to_string()));
    }

    #[test]
    fn test_decode_invalid_tag_is_error() {
        let col = ColumnDescriptor::new("x", DataType::Invalid);
        let v = NativeValue::owned(DataType::Invalid, vec![1]);
        let err = decode(&col, &v).unwrap_err();
        assert!(matches!(err, Error::Type(ref te) if te.column.as_deref() == Some("x")));
    }

    #[test]
    fn test_decode_short_buffer_is_error() {
        let col = ColumnDescriptor::new("n", DataType::Val64);
        let v = NativeValue::owned(DataType::Val64, vec![1, 2]);
        assert!(matches!(decode(&col, &v), Err(Error::Type(_))));
    }

    #[test]
    fn test_decode_null() {
        let col = ColumnDescriptor::new("n", DataType::Val32);
        assert_eq!(decode(&col, &NativeValue::null(DataType::Val32)).unwrap(), Value::Null);
    }
}
