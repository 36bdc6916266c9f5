//! Row normalization.
//!
//! Both engines hand back their own native scalars. Everything is reduced to
//! [`Value`] here so callers see one shape: plain integers and floats,
//! ISO-8601 text for dates and times, compact JSON text for documents.

use crate::models::{Row, Value};
use crate::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::types::ValueRef;

/// Format for timezone-aware timestamps: millisecond precision, `Z` suffix.
pub const TIMESTAMPTZ_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
/// Format for naive timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";
/// Format for dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A backend-native cell before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    /// SQL `NULL`.
    Null,
    /// Any integer width.
    Int(i64),
    /// Any float width.
    Float(f64),
    /// Arbitrary precision numeric, already widened.
    Numeric(f64),
    /// Boolean.
    Bool(bool),
    /// Text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Timestamp with time zone, in UTC.
    TimestampTz(DateTime<Utc>),
    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// JSON document.
    Json(serde_json::Value),
    /// UUID.
    Uuid(uuid::Uuid),
    /// A type the normalizer cannot decode.
    Unsupported(String),
}

/// Largest float magnitude that still converts to `i64` exactly.
#[allow(clippy::cast_precision_loss)]
const I64_FLOAT_BOUND: f64 = i64::MAX as f64;

/// Converts one native cell to a canonical value.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn normalize(native: NativeValue) -> Value {
    match native {
        NativeValue::Null => Value::Null,
        NativeValue::Int(v) => Value::Integer(v),
        NativeValue::Float(v) => Value::Real(v),
        NativeValue::Numeric(v) => {
            if v.is_finite() && v.fract() == 0.0 && v.abs() < I64_FLOAT_BOUND {
                Value::Integer(v as i64)
            } else {
                Value::Real(v)
            }
        },
        NativeValue::Bool(b) => Value::Bool(b),
        NativeValue::Text(s) => Value::Text(s),
        NativeValue::Bytes(b) => Value::Blob(b),
        NativeValue::TimestampTz(ts) => Value::Text(ts.format(TIMESTAMPTZ_FORMAT).to_string()),
        NativeValue::Timestamp(ts) => Value::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
        NativeValue::Date(d) => Value::Text(d.format(DATE_FORMAT).to_string()),
        NativeValue::Time(t) => Value::Text(t.format("%H:%M:%S%.f").to_string()),
        NativeValue::Json(j) => Value::Text(j.to_string()),
        NativeValue::Uuid(u) => Value::Text(u.hyphenated().to_string()),
        NativeValue::Unsupported(type_name) => {
            tracing::debug!(type_name = %type_name, "Unsupported column type normalized to NULL");
            Value::Null
        },
    }
}

/// Builds a row from column names and native cells.
///
/// # Errors
///
/// Returns an error if the two lists differ in length.
pub fn normalize_row(columns: Vec<String>, natives: Vec<NativeValue>) -> Result<Row> {
    Row::new(columns, natives.into_iter().map(normalize).collect())
}

impl From<ValueRef<'_>> for NativeValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(v) => Self::Int(v),
            ValueRef::Real(v) => Self::Float(v),
            ValueRef::Text(bytes) => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Self::Bytes(bytes.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    #[test_case(NativeValue::Numeric(42.0), Value::Integer(42); "integral numeric")]
    #[test_case(NativeValue::Numeric(-3.0), Value::Integer(-3); "negative integral numeric")]
    #[test_case(NativeValue::Numeric(2.5), Value::Real(2.5); "fractional numeric")]
    #[test_case(NativeValue::Numeric(1e300), Value::Real(1e300); "out of range numeric")]
    #[test_case(NativeValue::Int(i64::MAX), Value::Integer(i64::MAX); "wide integer")]
    #[test_case(NativeValue::Bool(true), Value::Bool(true); "bool")]
    #[test_case(NativeValue::Unsupported("tsvector".into()), Value::Null; "unsupported")]
    fn test_scalar(native: NativeValue, expected: Value) {
        assert_eq!(normalize(native), expected);
    }

    #[test]
    fn test_timestamptz_iso_millis() {
        let ts = Utc
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 1)
            .single()
            .unwrap()
            + chrono::Duration::microseconds(123_456);
        assert_eq!(
            normalize(NativeValue::TimestampTz(ts)),
            Value::Text("2024-03-09T07:05:01.123Z".into())
        );
    }

    #[test]
    fn test_naive_and_date() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let ts = date.and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(
            normalize(NativeValue::Timestamp(ts)),
            Value::Text("2024-01-15T12:00:00.000".into())
        );
        assert_eq!(
            normalize(NativeValue::Date(date)),
            Value::Text("2024-01-15".into())
        );
    }

    #[test]
    fn test_json_compact() {
        let json = serde_json::json!({"a": [1, 2]});
        assert_eq!(
            normalize(NativeValue::Json(json)),
            Value::Text(r#"{"a":[1,2]}"#.into())
        );
    }

    #[test]
    fn test_sqlite_value_ref() {
        assert_eq!(NativeValue::from(ValueRef::Integer(5)), NativeValue::Int(5));
        assert_eq!(
            NativeValue::from(ValueRef::Text(b"abc")),
            NativeValue::Text("abc".into())
        );
    }

    #[test]
    fn test_normalize_row() {
        let row = normalize_row(
            vec!["n".into(), "ok".into()],
            vec![NativeValue::Numeric(7.0), NativeValue::Bool(false)],
        )
        .unwrap();
        assert_eq!(row.get("n"), Some(&Value::Integer(7)));
        assert_eq!(row.get("ok"), Some(&Value::Bool(false)));
    }
}
