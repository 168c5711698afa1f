//! Fixed-width binary encoding of records and keys.
//!
//! Every column occupies exactly `ColumnType::width` bytes and numbers are
//! little-endian, so a record always serializes to `Schema::record_size` bytes.

use std::borrow::Cow;

use log::warn;

use crate::{
    record::{Record, Value},
    schema::{ColumnType, Schema, SchemaError},
};

type Result<T> = std::result::Result<T, SchemaError>;

/// Serializes a record that is already in schema order.
///
/// VARCHAR values longer than their column are cut at the last char boundary
/// that fits, unless `strict` is set, in which case they are rejected.
pub(crate) fn encode(schema: &Schema, record: &Record, strict: bool) -> Result<Vec<u8>> {
    let mut bytes = vec![0; schema.record_size()];
    for (column, field) in schema.columns().iter().zip(schema.layout()) {
        let value = record
            .get(&column.name)
            .ok_or_else(|| SchemaError::MissingColumn(column.name.clone()))?;
        encode_value(&column.name, column.ty, value, strict, &mut bytes[field.range()])?;
    }
    Ok(bytes)
}

/// Deserializes a record, padding or truncating the buffer to the record size first.
pub(crate) fn decode(schema: &Schema, bytes: &[u8]) -> Record {
    let record_size = schema.record_size();
    let bytes = if bytes.len() == record_size {
        Cow::Borrowed(bytes)
    } else {
        warn!(
            "record buffer has {} bytes, expected {}; repairing",
            bytes.len(),
            record_size
        );
        let mut repaired = bytes.to_vec();
        repaired.resize(record_size, 0);
        Cow::Owned(repaired)
    };

    schema
        .columns()
        .iter()
        .zip(schema.layout())
        .map(|(column, field)| {
            (
                column.name.clone(),
                decode_value(column.ty, &bytes[field.range()]),
            )
        })
        .collect()
}

/// Encodes a single key into `out`, which must be exactly the key width.
#[inline]
pub(crate) fn encode_key(ty: ColumnType, key: &Value, out: &mut [u8]) -> Result<()> {
    encode_value("key", ty, key, false, out)
}

#[inline]
pub(crate) fn decode_key(ty: ColumnType, bytes: &[u8]) -> Value {
    decode_value(ty, bytes)
}

fn encode_value(
    name: &str,
    ty: ColumnType,
    value: &Value,
    strict: bool,
    out: &mut [u8],
) -> Result<()> {
    match (ty, value) {
        (ColumnType::Int, Value::Int(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (ColumnType::Float, Value::Float(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (ColumnType::Boolean, Value::Boolean(v)) => out[0] = *v as u8,
        (ColumnType::Date, Value::Date(v)) => out.copy_from_slice(&v.to_le_bytes()),
        (ColumnType::Varchar(width), Value::Varchar(s)) => {
            let width = width as usize;
            let s = if s.len() <= width {
                s.as_str()
            } else if strict {
                return Err(SchemaError::TooLarge {
                    column: name.to_owned(),
                    width,
                    len: s.len(),
                });
            } else {
                let end = (0..=width).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0);
                warn!("truncating `{name}` from {} to {end} bytes", s.len());
                &s[..end]
            };
            out.fill(0);
            out[..s.len()].copy_from_slice(s.as_bytes());
        }
        (ty, value) => {
            return Err(SchemaError::TypeMismatched {
                column: name.to_owned(),
                expected: ty,
                found: value.type_name(),
            })
        }
    }
    Ok(())
}

fn decode_value(ty: ColumnType, bytes: &[u8]) -> Value {
    match ty {
        ColumnType::Int => Value::Int(i32::from_le_bytes(array(bytes))),
        ColumnType::Float => Value::Float(f64::from_le_bytes(array(bytes))),
        ColumnType::Boolean => Value::Boolean(bytes[0] != 0),
        ColumnType::Date => Value::Date(i64::from_le_bytes(array(bytes))),
        ColumnType::Varchar(_) => {
            let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            Value::Varchar(String::from_utf8_lossy(&bytes[..end]).into_owned())
        }
    }
}

#[inline]
fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut array = [0; N];
    array.copy_from_slice(&bytes[..N]);
    array
}

#[cfg(test)]
mod tests {
    use super::{decode, decode_key, encode, encode_key};
    use crate::{
        record::{Record, Value},
        schema::{Column, ColumnType, Schema, SchemaError},
    };

    fn schema() -> Schema {
        Schema::new(
            vec![
                Column::new("id", ColumnType::Int),
                Column::new("name", ColumnType::Varchar(6)),
                Column::new("score", ColumnType::Float),
                Column::new("born", ColumnType::Date),
                Column::new("active", ColumnType::Boolean),
            ],
            "id",
        )
        .unwrap()
    }

    fn record(id: i32, name: &str, active: bool) -> Record {
        Record::new()
            .with("id", id)
            .with("name", name)
            .with("score", -12.5)
            .with("born", 1_700_000_000i64)
            .with("active", active)
    }

    #[test]
    fn test_boundary_values() {
        let schema = schema();
        for record in [
            record(i32::MIN, "", false),
            record(i32::MAX, "abcdef", true),
            record(0, "é", true),
            record(1, "a", true).with("score", f64::MIN).with("born", i64::MIN),
            record(2, "b", false).with("score", f64::MAX).with("born", i64::MAX),
            record(3, "c", true).with("score", -0.0).with("born", 0i64),
            record(4, "d", false).with("score", f64::INFINITY).with("born", -1i64),
        ] {
            let bytes = encode(&schema, &record, true).unwrap();
            assert_eq!(bytes.len(), schema.record_size());
            assert_eq!(decode(&schema, &bytes), record);
        }

        // Negative zero keeps its sign bit.
        let bytes = encode(&schema, &record(3, "c", true).with("score", -0.0), true).unwrap();
        let score = decode(&schema, &bytes).get("score").cloned();
        assert!(matches!(score, Some(Value::Float(v)) if v == 0.0 && v.is_sign_negative()));
    }

    #[test]
    fn test_varchar_truncation() {
        let schema = schema();

        let long = record(1, "abcdefgh", true);
        let bytes = encode(&schema, &long, false).unwrap();
        assert_eq!(
            decode(&schema, &bytes).get("name"),
            Some(&Value::from("abcdef"))
        );

        // Never cut a character in half.
        let wide = record(1, "abcdeé", true);
        let bytes = encode(&schema, &wide, false).unwrap();
        assert_eq!(
            decode(&schema, &bytes).get("name"),
            Some(&Value::from("abcde"))
        );

        assert!(matches!(
            encode(&schema, &long, true),
            Err(SchemaError::TooLarge { width: 6, len: 8, .. })
        ));
    }

    #[test]
    fn test_read_repair() {
        let schema = schema();
        let record = record(7, "ab", true);
        let mut bytes = encode(&schema, &record, false).unwrap();

        bytes.extend_from_slice(&[1, 2, 3]);
        assert_eq!(decode(&schema, &bytes), record);

        // The trailing boolean is lost to the short buffer.
        bytes.truncate(schema.record_size() - 1);
        assert_eq!(
            decode(&schema, &bytes),
            record.with("active", false)
        );
    }

    #[test]
    fn test_key() {
        let mut out = [0; 8];
        encode_key(ColumnType::Varchar(8), &Value::from("key"), &mut out).unwrap();
        assert_eq!(&out, b"key\0\0\0\0\0");
        assert_eq!(decode_key(ColumnType::Varchar(8), &out), Value::from("key"));

        let mut out = [0; 4];
        assert!(encode_key(ColumnType::Int, &Value::from("x"), &mut out).is_err());
    }
}
