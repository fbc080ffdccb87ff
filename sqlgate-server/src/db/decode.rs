//! PostgreSQL row decoding into JSON
//!
//! Prefer decoding based on the column's type name. Types without a JSON
//! mapping are reported as errors naming the column, rather than being
//! silently turned into `null`.

use std::net::IpAddr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgTimeTz};
use sqlx::postgres::{PgColumn, PgRow, PgTypeInfo, PgTypeKind};
use sqlx::{Column, Decode, Postgres, Row, TypeInfo, ValueRef};
use uuid::Uuid;

use super::pool::DriverError;

/// Row as an array of column values, in column order.
pub(super) fn row_to_array(row: &PgRow) -> Result<Vec<Value>, DriverError> {
    row.columns()
        .iter()
        .map(|column| column_value(row, column))
        .collect()
}

/// Row as a column-name keyed object, in column order.
///
/// A repeated column name keeps the last value, like most client drivers.
pub(super) fn row_to_object(row: &PgRow) -> Result<Map<String, Value>, DriverError> {
    let mut object = Map::with_capacity(row.len());
    for column in row.columns() {
        let value = column_value(row, column)?;
        object.insert(column.name().to_string(), value);
    }
    Ok(object)
}

fn column_value(row: &PgRow, column: &PgColumn) -> Result<Value, DriverError> {
    let idx = column.ordinal();
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }
    decode_as(row, idx, column.name(), column.type_info())
}

fn decode_as(row: &PgRow, idx: usize, name: &str, ty: &PgTypeInfo) -> Result<Value, DriverError> {
    match ty.kind() {
        PgTypeKind::Domain(base) => return decode_as(row, idx, name, base),
        PgTypeKind::Enum(_) => return Ok(Value::String(get::<&str>(row, idx)?.to_string())),
        _ => {}
    }

    let value = match ty.name() {
        "BOOL" => Value::Bool(get(row, idx)?),
        "INT2" => Value::from(get::<i16>(row, idx)?),
        "INT4" => Value::from(get::<i32>(row, idx)?),
        "INT8" => Value::from(get::<i64>(row, idx)?),
        "OID" => Value::from(get::<Oid>(row, idx)?.0),
        "FLOAT4" => float(f64::from(get::<f32>(row, idx)?)),
        "FLOAT8" => float(get(row, idx)?),
        // Exact decimals stay strings; JSON numbers would round them
        "NUMERIC" => Value::String(get::<Decimal>(row, idx)?.to_string()),
        "MONEY" => Value::String(get::<PgMoney>(row, idx)?.to_decimal(2).to_string()),
        "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "UNKNOWN" | "citext" | "xml" => {
            Value::String(get(row, idx)?)
        }
        "\"CHAR\"" => Value::String(char::from(get::<i8>(row, idx)? as u8).to_string()),
        "JSON" | "JSONB" => get::<Value>(row, idx)?,
        "UUID" => Value::String(get::<Uuid>(row, idx)?.to_string()),
        "DATE" => Value::String(format_date(get(row, idx)?)),
        "TIME" => Value::String(format_time(get(row, idx)?)),
        "TIMETZ" => {
            let tz: PgTimeTz = get(row, idx)?;
            Value::String(format!("{}{}", format_time(tz.time), tz.offset))
        }
        "TIMESTAMP" => Value::String(format_timestamp(get(row, idx)?)),
        "TIMESTAMPTZ" => Value::String(format_timestamptz(get(row, idx)?)),
        "INTERVAL" => Value::String(format_interval(&get(row, idx)?)),
        "INET" | "CIDR" => {
            let bytes = raw_bytes(row, idx)?;
            let text = format_inet(bytes, ty.name() == "CIDR").ok_or_else(|| {
                DriverError::new(format!("column \"{name}\" has a malformed address"))
            })?;
            Value::String(text)
        }
        "MACADDR" | "MACADDR8" => Value::String(format_mac(raw_bytes(row, idx)?)),
        "BYTEA" => Value::String(STANDARD.encode(get::<&[u8]>(row, idx)?)),
        "VOID" => Value::Null,
        "BOOL[]" => array(get::<Vec<Option<bool>>>(row, idx)?, Value::Bool),
        "INT2[]" => array(get::<Vec<Option<i16>>>(row, idx)?, Value::from),
        "INT4[]" => array(get::<Vec<Option<i32>>>(row, idx)?, Value::from),
        "INT8[]" => array(get::<Vec<Option<i64>>>(row, idx)?, Value::from),
        "OID[]" => array(get::<Vec<Option<Oid>>>(row, idx)?, |oid| Value::from(oid.0)),
        "FLOAT4[]" => array(get::<Vec<Option<f32>>>(row, idx)?, |f| float(f64::from(f))),
        "FLOAT8[]" => array(get::<Vec<Option<f64>>>(row, idx)?, float),
        "NUMERIC[]" => array(get::<Vec<Option<Decimal>>>(row, idx)?, |d| {
            Value::String(d.to_string())
        }),
        "TEXT[]" | "VARCHAR[]" | "CHAR[]" | "NAME[]" => {
            array(get::<Vec<Option<String>>>(row, idx)?, Value::String)
        }
        "JSON[]" | "JSONB[]" => array(get::<Vec<Option<Value>>>(row, idx)?, |v| v),
        "UUID[]" => array(get::<Vec<Option<Uuid>>>(row, idx)?, |u| {
            Value::String(u.to_string())
        }),
        "DATE[]" => array(get::<Vec<Option<NaiveDate>>>(row, idx)?, |d| {
            Value::String(format_date(d))
        }),
        "TIME[]" => array(get::<Vec<Option<NaiveTime>>>(row, idx)?, |t| {
            Value::String(format_time(t))
        }),
        "TIMESTAMP[]" => array(get::<Vec<Option<NaiveDateTime>>>(row, idx)?, |ts| {
            Value::String(format_timestamp(ts))
        }),
        "TIMESTAMPTZ[]" => array(get::<Vec<Option<DateTime<Utc>>>>(row, idx)?, |ts| {
            Value::String(format_timestamptz(ts))
        }),
        "INTERVAL[]" => array(get::<Vec<Option<PgInterval>>>(row, idx)?, |iv| {
            Value::String(format_interval(&iv))
        }),
        "BYTEA[]" => array(get::<Vec<Option<Vec<u8>>>>(row, idx)?, |b| {
            Value::String(STANDARD.encode(b))
        }),
        other => {
            return Err(DriverError::new(format!(
                "column \"{name}\" has unsupported type {other}; cast it to text"
            )))
        }
    };

    Ok(value)
}

/// Decode by type name; the name match already did the compatibility
/// check, and skipping it lets domains decode as their base type.
fn get<'r, T>(row: &'r PgRow, idx: usize) -> Result<T, DriverError>
where
    T: Decode<'r, Postgres>,
{
    row.try_get_unchecked::<T, _>(idx).map_err(DriverError::from)
}

fn raw_bytes(row: &PgRow, idx: usize) -> Result<&[u8], DriverError> {
    row.try_get_raw(idx)?
        .as_bytes()
        .map_err(|e| DriverError::new(e.to_string()))
}

fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M:%S%.f").to_string()
}

fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

fn format_timestamptz(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// PostgreSQL's default interval style: `1 year 2 mons 3 days 04:05:06`.
fn format_interval(iv: &PgInterval) -> String {
    fn unit(n: i32, name: &str) -> String {
        if n == 1 {
            format!("1 {name}")
        } else {
            format!("{n} {name}s")
        }
    }

    let mut parts = Vec::new();
    let (years, months) = (iv.months / 12, iv.months % 12);
    if years != 0 {
        parts.push(unit(years, "year"));
    }
    if months != 0 {
        parts.push(unit(months, "mon"));
    }
    if iv.days != 0 {
        parts.push(unit(iv.days, "day"));
    }
    if iv.microseconds != 0 || parts.is_empty() {
        let sign = if iv.microseconds < 0 { "-" } else { "" };
        let micros = iv.microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut time = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let frac = micros % 1_000_000;
        if frac != 0 {
            let digits = format!("{frac:06}");
            time.push('.');
            time.push_str(digits.trim_end_matches('0'));
        }
        parts.push(time);
    }
    parts.join(" ")
}

/// Binary `inet`/`cidr`: family, prefix bits, is-cidr flag, length, address.
fn format_inet(bytes: &[u8], cidr: bool) -> Option<String> {
    let [family, bits, _, _, addr @ ..] = bytes else {
        return None;
    };
    let (ip, full_bits) = match (*family, addr.len()) {
        (2, 4) => (IpAddr::from(<[u8; 4]>::try_from(addr).ok()?), 32),
        (3, 16) => (IpAddr::from(<[u8; 16]>::try_from(addr).ok()?), 128),
        _ => return None,
    };
    Some(if cidr || *bits != full_bits {
        format!("{ip}/{bits}")
    } else {
        ip.to_string()
    })
}

fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Non-finite floats have no JSON form and become `null`.
fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn array<T>(items: Vec<Option<T>>, to_json: impl Fn(T) -> Value) -> Value {
    Value::Array(
        items
            .into_iter()
            .map(|item| item.map(&to_json).unwrap_or(Value::Null))
            .collect(),
    )
}
