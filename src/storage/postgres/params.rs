//! Parameter binding.
//!
//! Callers pass `SQLite`-shaped values: booleans as `0`/`1`, timestamps as
//! text. The server tells us the type it inferred for each placeholder, and
//! [`Value`] adapts to it here instead of making every call site convert.

use crate::models::Value;
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::error::Error as StdError;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

type BindResult = Result<IsNull, Box<dyn StdError + Sync + Send>>;

const MICROS_PER_SECOND: i64 = 1_000_000;

fn mismatch(what: &str, ty: &Type) -> Box<dyn StdError + Sync + Send> {
    format!("cannot bind {what} to parameter of type {ty}").into()
}

fn is_text_like(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN)
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> BindResult {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Integer(v) => bind_integer(*v, ty, out),
            Self::Real(v) => bind_real(*v, ty, out),
            Self::Bool(v) => bind_bool(*v, ty, out),
            Self::Text(s) => bind_text(s, ty, out),
            Self::Blob(b) => b.as_slice().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[allow(clippy::cast_precision_loss)]
fn bind_integer(v: i64, ty: &Type, out: &mut BytesMut) -> BindResult {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        Type::OID => u32::try_from(v)?.to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::BOOL => (v != 0).to_sql(ty, out),
        Type::NUMERIC => {
            encode_numeric(&v.to_string(), out)?;
            Ok(IsNull::No)
        },
        ref t if is_text_like(t) => {
            out.put_slice(v.to_string().as_bytes());
            Ok(IsNull::No)
        },
        _ => Err(mismatch("integer", ty)),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn bind_real(v: f64, ty: &Type, out: &mut BytesMut) -> BindResult {
    match *ty {
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => v.to_sql(ty, out),
        Type::NUMERIC if v.is_finite() => {
            encode_numeric(&v.to_string(), out)?;
            Ok(IsNull::No)
        },
        ref t if is_text_like(t) => {
            out.put_slice(v.to_string().as_bytes());
            Ok(IsNull::No)
        },
        _ => Err(mismatch("real", ty)),
    }
}

fn bind_bool(v: bool, ty: &Type, out: &mut BytesMut) -> BindResult {
    match *ty {
        Type::BOOL => v.to_sql(ty, out),
        Type::INT2 => i16::from(v).to_sql(ty, out),
        Type::INT4 => i32::from(v).to_sql(ty, out),
        Type::INT8 => i64::from(v).to_sql(ty, out),
        ref t if is_text_like(t) => {
            out.put_slice(if v { b"true" } else { b"false" });
            Ok(IsNull::No)
        },
        _ => Err(mismatch("boolean", ty)),
    }
}

fn bind_text(s: &str, ty: &Type, out: &mut BytesMut) -> BindResult {
    match *ty {
        ref t if is_text_like(t) => {
            out.put_slice(s.as_bytes());
            Ok(IsNull::No)
        },
        Type::TIMESTAMPTZ => parse_timestamptz(s)
            .ok_or_else(|| mismatch(&format!("'{s}'"), ty))?
            .to_sql(ty, out),
        Type::TIMESTAMP => parse_timestamp(s)
            .ok_or_else(|| mismatch(&format!("'{s}'"), ty))?
            .to_sql(ty, out),
        Type::DATE => parse_date(s)
            .ok_or_else(|| mismatch(&format!("'{s}'"), ty))?
            .to_sql(ty, out),
        Type::TIME => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")?.to_sql(ty, out),
        Type::INTERVAL => {
            let interval = parse_interval(s).ok_or_else(|| mismatch(&format!("'{s}'"), ty))?;
            interval.encode(out);
            Ok(IsNull::No)
        },
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(s)?.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => bind_integer(s.trim().parse()?, ty, out),
        Type::FLOAT4 | Type::FLOAT8 => bind_real(s.trim().parse()?, ty, out),
        Type::NUMERIC => {
            encode_numeric(s.trim(), out)?;
            Ok(IsNull::No)
        },
        Type::BOOL => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "yes" | "on" => true.to_sql(ty, out),
            "0" | "f" | "false" | "no" | "off" => false.to_sql(ty, out),
            _ => Err(mismatch(&format!("'{s}'"), ty)),
        },
        Type::BYTEA => s.as_bytes().to_sql(ty, out),
        _ => Err(mismatch("text", ty)),
    }
}

/// Parses ISO-8601 with offset, or an offset-free timestamp taken as UTC.
pub fn parse_timestamptz(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_timestamp(s).map(|naive| naive.and_utc()))
}

/// Parses `YYYY-MM-DD HH:MM:SS[.f]`, the `T`-separated form, an RFC 3339
/// string (offset applied), or a bare date at midnight.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    let s = s.strip_suffix('Z').unwrap_or(s);
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
        .or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Parses `YYYY-MM-DD`, ignoring any time part.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let date = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// A Postgres interval: months, days and microseconds kept apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Interval {
    /// Whole months.
    pub months: i32,
    /// Whole days.
    pub days: i32,
    /// Remaining time.
    pub micros: i64,
}

impl Interval {
    fn encode(self, out: &mut BytesMut) {
        out.put_i64(self.micros);
        out.put_i32(self.days);
        out.put_i32(self.months);
    }
}

/// Parses a list of `±N unit` terms, e.g. `-7 days`, `1 hour 30 minutes`.
pub fn parse_interval(s: &str) -> Option<Interval> {
    let mut interval = Interval::default();
    let mut tokens = s.split_whitespace();
    let mut seen = false;

    while let Some(amount) = tokens.next() {
        let amount: i64 = amount.trim_start_matches('+').parse().ok()?;
        let unit = tokens.next()?.to_ascii_lowercase();
        let unit = unit.trim_end_matches('s');
        match unit {
            "microsecond" => interval.micros = interval.micros.checked_add(amount)?,
            "millisecond" => interval.micros = interval.micros.checked_add(amount.checked_mul(1_000)?)?,
            "second" | "sec" => interval.micros = interval.micros.checked_add(amount.checked_mul(MICROS_PER_SECOND)?)?,
            "minute" | "min" => {
                interval.micros = interval.micros.checked_add(amount.checked_mul(60 * MICROS_PER_SECOND)?)?;
            },
            "hour" => {
                interval.micros = interval.micros.checked_add(amount.checked_mul(3_600 * MICROS_PER_SECOND)?)?;
            },
            "day" => interval.days = interval.days.checked_add(i32::try_from(amount).ok()?)?,
            "week" => interval.days = interval.days.checked_add(i32::try_from(amount.checked_mul(7)?).ok()?)?,
            "month" | "mon" => interval.months = interval.months.checked_add(i32::try_from(amount).ok()?)?,
            "year" => {
                interval.months = interval.months.checked_add(i32::try_from(amount.checked_mul(12)?).ok()?)?;
            },
            _ => return None,
        }
        seen = true;
    }

    seen.then_some(interval)
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;

/// Writes a decimal string in the binary NUMERIC wire format.
///
/// Digits are grouped in base 10000 around the decimal point.
fn encode_numeric(s: &str, out: &mut BytesMut) -> Result<(), Box<dyn StdError + Sync + Send>> {
    let invalid = || -> Box<dyn StdError + Sync + Send> { format!("invalid numeric '{s}'").into() };

    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if body.contains(['e', 'E']) {
        return Err(invalid());
    }
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    let int_part = int_part.trim_start_matches('0');
    let dscale = u16::try_from(frac_part.len()).map_err(|_| invalid())?;

    // Left-pad the integer part and right-pad the fraction to whole groups.
    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;
    let digits: String = "0".repeat(int_pad) + int_part + frac_part + &"0".repeat(frac_pad);
    let int_groups = (int_part.len() + int_pad) / 4;

    let mut groups: Vec<i16> = digits
        .as_bytes()
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0_i16, |acc, b| acc * 10 + i16::from(b - b'0'))
        })
        .collect();

    let mut weight = i16::try_from(int_groups).map_err(|_| invalid())? - 1;
    while groups.first() == Some(&0) {
        groups.remove(0);
        weight -= 1;
    }
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }

    out.put_i16(i16::try_from(groups.len()).map_err(|_| invalid())?);
    out.put_i16(weight);
    out.put_u16(if negative && !groups.is_empty() { NUMERIC_NEG } else { NUMERIC_POS });
    out.put_u16(dscale);
    for group in groups {
        out.put_i16(group);
    }
    Ok(())
}
