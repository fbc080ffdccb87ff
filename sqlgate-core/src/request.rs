//! Query request body and execution mode

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, ValidationError};
use crate::param::ParamValue;
use crate::sanitize::strip_semicolons;

/// How result rows are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Rows as positional arrays of column values
    All,
    /// Rows as column-name to value mappings
    Execute,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Execute => "execute",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ValidationError;

    /// Matching is exact: `"ALL"` or `" all"` are unknown methods.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "execute" => Ok(Self::Execute),
            other => Err(ValidationError::invalid_method(other)),
        }
    }
}

/// Body of `POST /query`.
///
/// `method` stays a raw string so an unknown mode reaches the dispatcher
/// and gets the fixed error response instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sql: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub params: Vec<ParamValue>,

    #[serde(default, deserialize_with = "method_text")]
    pub method: String,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>, params: Vec<ParamValue>, method: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params,
            method: method.into(),
        }
    }

    /// Parse the execution mode.
    pub fn method(&self) -> Result<Method> {
        self.method.parse()
    }

    /// The statement as it will be sent to the database.
    ///
    /// Fails with [`ValidationError::EmptySql`] when nothing but
    /// whitespace is left after stripping semicolons.
    pub fn sanitized_sql(&self) -> Result<Cow<'_, str>> {
        let sql = strip_semicolons(&self.sql);
        if sql.trim().is_empty() {
            return Err(ValidationError::EmptySql);
        }
        Ok(sql)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Any JSON value is accepted; non-strings keep their JSON text, which can
/// never name a known method.
fn method_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
