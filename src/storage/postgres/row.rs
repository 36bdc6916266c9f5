//! Row decoding.

use crate::models::Row;
use crate::storage::normalize::{NativeValue, normalize_row};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::error::Error as StdError;
use tokio_postgres::types::{FromSql, Kind, Type};

type DecodeResult<T> = std::result::Result<T, Box<dyn StdError + Sync + Send>>;

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Decodes the binary NUMERIC wire format into the nearest `f64`.
///
/// The digit groups are rebuilt as decimal text and parsed, so the result is
/// correctly rounded.
pub(crate) fn decode_numeric(raw: &[u8]) -> DecodeResult<f64> {
    let word = |at: usize| -> DecodeResult<u16> {
        raw.get(at..at + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated numeric".into())
    };

    let ndigits = usize::from(word(0)?);
    #[allow(clippy::cast_possible_wrap)]
    let weight = i32::from(word(2)? as i16);
    let sign = word(4)?;

    match sign {
        NUMERIC_NAN => return Ok(f64::NAN),
        NUMERIC_PINF => return Ok(f64::INFINITY),
        NUMERIC_NINF => return Ok(f64::NEG_INFINITY),
        _ => {},
    }
    if raw.len() != 8 + 2 * ndigits {
        return Err(format!("numeric declares {ndigits} digits but has {} bytes", raw.len()).into());
    }
    if ndigits == 0 {
        return Ok(0.0);
    }

    let mut text = String::with_capacity(ndigits * 4 + 8);
    if sign == NUMERIC_NEG {
        text.push('-');
    }
    for i in 0..ndigits {
        let group = word(8 + 2 * i)?;
        if group > 9999 {
            return Err(format!("numeric digit group {group} out of range").into());
        }
        text.push_str(&format!("{group:04}"));
    }
    let last_group_weight = weight - i32::try_from(ndigits)? + 1;
    text.push_str(&format!("e{}", last_group_weight * 4));
    Ok(text.parse()?)
}

/// NUMERIC column reader.
struct Numeric(f64);

impl<'a> FromSql<'a> for Numeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> DecodeResult<Self> {
        decode_numeric(raw).map(Self)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Reader for types whose binary form is their text form.
struct RawText(String);

impl<'a> FromSql<'a> for RawText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> DecodeResult<Self> {
        Ok(Self(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        is_textual(ty)
    }
}

fn is_textual(ty: &Type) -> bool {
    matches!(ty.kind(), Kind::Enum(_)) || matches!(ty.name(), "citext" | "xml")
}

fn cell<'a, T, F>(row: &'a tokio_postgres::Row, idx: usize, wrap: F) -> std::result::Result<NativeValue, tokio_postgres::Error>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> NativeValue,
{
    Ok(row.try_get::<_, Option<T>>(idx)?.map_or(NativeValue::Null, wrap))
}

fn decode_cell(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> std::result::Result<NativeValue, tokio_postgres::Error> {
    match *ty {
        Type::BOOL => cell(row, idx, NativeValue::Bool),
        Type::INT2 => cell(row, idx, |v: i16| NativeValue::Int(v.into())),
        Type::INT4 => cell(row, idx, |v: i32| NativeValue::Int(v.into())),
        Type::INT8 => cell(row, idx, NativeValue::Int),
        Type::OID => cell(row, idx, |v: u32| NativeValue::Int(v.into())),
        Type::FLOAT4 => cell(row, idx, |v: f32| NativeValue::Float(v.into())),
        Type::FLOAT8 => cell(row, idx, NativeValue::Float),
        Type::NUMERIC => cell(row, idx, |v: Numeric| NativeValue::Numeric(v.0)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            cell(row, idx, NativeValue::Text)
        },
        Type::BYTEA => cell(row, idx, NativeValue::Bytes),
        Type::TIMESTAMPTZ => cell::<DateTime<Utc>, _>(row, idx, NativeValue::TimestampTz),
        Type::TIMESTAMP => cell::<NaiveDateTime, _>(row, idx, NativeValue::Timestamp),
        Type::DATE => cell::<NaiveDate, _>(row, idx, NativeValue::Date),
        Type::TIME => cell::<NaiveTime, _>(row, idx, NativeValue::Time),
        Type::JSON | Type::JSONB => cell(row, idx, NativeValue::Json),
        Type::UUID => cell(row, idx, NativeValue::Uuid),
        ref t if is_textual(t) => cell(row, idx, |v: RawText| NativeValue::Text(v.0)),
        ref t => Ok(NativeValue::Unsupported(t.name().to_string())),
    }
}

/// Decodes and normalizes one result row.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if a cell does not decode as its
/// declared type.
pub fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
    let columns = row.columns();
    let names = columns.iter().map(|c| c.name().to_string()).collect();
    let natives = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| decode_cell(row, idx, column.type_()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::OperationFailed {
            operation: "postgres_decode_row".to_string(),
            cause: e.to_string(),
        })?;
    normalize_row(names, natives)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(ndigits: u16, weight: i16, sign: u16, dscale: u16, groups: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&ndigits.to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for g in groups {
            raw.extend_from_slice(&g.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_decode_numeric_values() {
        // 12345.678
        let raw = numeric(3, 1, 0, 3, &[1, 2345, 6780]);
        assert!((decode_numeric(&raw).unwrap() - 12345.678).abs() < f64::EPSILON * 1e5);
        // -0.05
        let raw = numeric(1, -1, NUMERIC_NEG, 2, &[500]);
        assert!((decode_numeric(&raw).unwrap() + 0.05).abs() < f64::EPSILON);
        // 20000
        let raw = numeric(1, 1, 0, 0, &[2]);
        assert!((decode_numeric(&raw).unwrap() - 20000.0).abs() < f64::EPSILON);
        // 0
        assert!(decode_numeric(&numeric(0, 0, 0, 0, &[])).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn test_decode_numeric_specials() {
        assert!(decode_numeric(&numeric(0, 0, NUMERIC_NAN, 0, &[])).unwrap().is_nan());
        assert_eq!(decode_numeric(&numeric(0, 0, NUMERIC_PINF, 0, &[])).unwrap(), f64::INFINITY);
    }

    #[test]
    fn test_decode_numeric_rejects_malformed() {
        assert!(decode_numeric(&[0, 1]).is_err());
        assert!(decode_numeric(&numeric(2, 0, 0, 0, &[1])).is_err());
        assert!(decode_numeric(&numeric(1, 0, 0, 0, &[10_000])).is_err());
    }
}
