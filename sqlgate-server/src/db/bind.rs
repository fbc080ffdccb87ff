//! Binding [`ParamValue`]s onto a prepared statement
//!
//! sqlx sends every parameter in binary format, so a value must already have
//! the type the server expects. Statements are prepared without declared
//! parameter types, which lets PostgreSQL infer them from context. Each
//! request value is then converted to the inferred type from its text form,
//! the way the server would parse an untyped literal.

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgTypeKind};
use sqlx::{Postgres, Type, TypeInfo};
use uuid::Uuid;

use sqlgate_core::ParamValue;

use super::pool::DriverError;

/// A request value converted to the type the server inferred for its slot.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum BindValue {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(Decimal),
    Oid(u32),
    Char(i8),
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Timestamptz(DateTime<Utc>),
}

// Declared with OID 0: the prepared statement already fixes the real types.
impl Type<Postgres> for BindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for BindValue {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Bool(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Int2(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Int4(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Int8(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Float4(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Float8(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Numeric(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Oid(v) => Encode::<Postgres>::encode_by_ref(&Oid(*v), buf),
            Self::Char(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Text(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Bytes(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Json(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Uuid(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Date(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Time(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Timestamp(v) => Encode::<Postgres>::encode_by_ref(v, buf),
            Self::Timestamptz(v) => Encode::<Postgres>::encode_by_ref(v, buf),
        }
    }
}

/// Convert `params` to the statement's inferred parameter types, in order.
pub(super) fn coerce_params(
    params: &[ParamValue],
    types: &[PgTypeInfo],
) -> Result<Vec<BindValue>, DriverError> {
    if params.len() != types.len() {
        return Err(DriverError::new(format!(
            "bind message supplies {} parameters, but prepared statement \"\" requires {}",
            params.len(),
            types.len()
        ))
        .with_code("08P01"));
    }

    params
        .iter()
        .zip(types)
        .enumerate()
        .map(|(idx, (param, ty))| coerce(param, ty, idx + 1))
        .collect()
}

fn coerce(param: &ParamValue, ty: &PgTypeInfo, position: usize) -> Result<BindValue, DriverError> {
    let ty = base_type(ty);
    let text = match param {
        ParamValue::Null => return Ok(BindValue::Null),
        ParamValue::Bytes(bytes) if ty.name() == "BYTEA" => {
            return Ok(BindValue::Bytes(bytes.clone()))
        }
        ParamValue::Bytes(_) => {
            return Err(DriverError::new(format!(
                "parameter ${position} is binary data but the statement expects type {}",
                ty.name()
            ))
            .with_code("42804"))
        }
        ParamValue::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        ParamValue::Int(i) => Cow::Owned(i.to_string()),
        ParamValue::Float(f) => Cow::Owned(f.to_string()),
        ParamValue::Text(s) => Cow::Borrowed(s.as_str()),
    };

    if matches!(ty.kind(), PgTypeKind::Enum(_)) {
        return Ok(BindValue::Text(text.into_owned()));
    }

    from_text(&text, ty, position)
}

/// Parse `text` as a value of `ty`, accepting the input forms PostgreSQL does.
fn from_text(text: &str, ty: &PgTypeInfo, position: usize) -> Result<BindValue, DriverError> {
    let invalid = || invalid_input(ty, text);
    let trimmed = text.trim();

    let value = match ty.name() {
        "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "UNKNOWN" | "citext" => {
            BindValue::Text(text.to_string())
        }
        "BOOL" => BindValue::Bool(parse_bool(trimmed).ok_or_else(invalid)?),
        "INT2" => BindValue::Int2(parse_int(trimmed, ty, text)?),
        "INT4" => BindValue::Int4(parse_int(trimmed, ty, text)?),
        "INT8" => BindValue::Int8(parse_int(trimmed, ty, text)?),
        "OID" => BindValue::Oid(parse_int(trimmed, ty, text)?),
        "FLOAT4" => BindValue::Float4(trimmed.parse().map_err(|_| invalid())?),
        "FLOAT8" => BindValue::Float8(trimmed.parse().map_err(|_| invalid())?),
        "NUMERIC" => BindValue::Numeric(
            Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map_err(|_| invalid())?,
        ),
        "\"CHAR\"" => BindValue::Char(text.bytes().next().map_or(0, |b| b as i8)),
        "BYTEA" => BindValue::Bytes(parse_bytea(text).ok_or_else(invalid)?),
        "JSON" | "JSONB" => BindValue::Json(serde_json::from_str(text).map_err(|_| invalid())?),
        "UUID" => BindValue::Uuid(Uuid::parse_str(trimmed).map_err(|_| invalid())?),
        "DATE" => BindValue::Date(parse_date(trimmed).ok_or_else(invalid)?),
        "TIME" => BindValue::Time(parse_time(trimmed).ok_or_else(invalid)?),
        "TIMESTAMP" => BindValue::Timestamp(parse_timestamp(trimmed).ok_or_else(invalid)?),
        "TIMESTAMPTZ" => BindValue::Timestamptz(parse_timestamptz(trimmed).ok_or_else(invalid)?),
        other => {
            return Err(DriverError::new(format!(
                "parameter ${position} has type {other}, which cannot be bound directly; \
                 pass it as text with ${position}::text::{}",
                other.to_ascii_lowercase()
            ))
            .with_code("42804"))
        }
    };

    Ok(value)
}

/// Domains are sent in their base type's format.
fn base_type(ty: &PgTypeInfo) -> &PgTypeInfo {
    match ty.kind() {
        PgTypeKind::Domain(base) => base_type(base),
        _ => ty,
    }
}

fn invalid_input(ty: &PgTypeInfo, text: &str) -> DriverError {
    DriverError::new(format!(
        "invalid input syntax for type {}: \"{}\"",
        ty.name().to_ascii_lowercase(),
        text
    ))
    .with_code("22P02")
}

fn parse_int<T: TryFrom<i64>>(trimmed: &str, ty: &PgTypeInfo, text: &str) -> Result<T, DriverError> {
    let wide: i64 = trimmed.parse().map_err(|_| invalid_input(ty, text))?;
    T::try_from(wide).map_err(|_| {
        DriverError::new(format!(
            "value \"{}\" is out of range for type {}",
            text,
            ty.name().to_ascii_lowercase()
        ))
        .with_code("22003")
    })
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Some(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// `\x` hex form, otherwise the raw bytes of the text.
fn parse_bytea(s: &str) -> Option<Vec<u8>> {
    let Some(hex) = s.strip_prefix("\\x") else {
        return Some(s.as_bytes().to_vec());
    };
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(s).map(|ts| ts.date()))
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const ZONED_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f %#z",
    "%Y-%m-%dT%H:%M%#z",
];

/// A trailing offset is ignored, as PostgreSQL does for `timestamp`.
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .or_else(|| parse_zoned(s).map(|dt| dt.naive_local()))
}

/// Values without an offset are read in UTC, the session time zone sqlx sets.
fn parse_timestamptz(s: &str) -> Option<DateTime<Utc>> {
    parse_zoned(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| parse_timestamp(s).map(|naive| naive.and_utc()))
}

fn parse_zoned(s: &str) -> Option<DateTime<chrono::FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok().or_else(|| {
        ZONED_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
    })
}
