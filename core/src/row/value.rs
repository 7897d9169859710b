// rowflow/src/row/value.rs

//! Typed values carried by rows.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
  String,
  Integer,
  Number,
  Boolean,
  Date,
  Binary,
}

impl ValueType {
  /// Parses a textual representation into a value of this type.
  /// Empty text is treated as null, as literal grids and constants expect.
  pub fn parse(&self, text: &str) -> Result<Value, String> {
    if text.is_empty() {
      return Ok(Value::Null);
    }
    match self {
      ValueType::String => Ok(Value::String(text.to_string())),
      ValueType::Integer => text
        .trim()
        .parse::<i64>()
        .map(Value::Integer)
        .map_err(|e| format!("'{}' is not an integer: {}", text, e)),
      ValueType::Number => text
        .trim()
        .parse::<f64>()
        .map(Value::Number)
        .map_err(|e| format!("'{}' is not a number: {}", text, e)),
      ValueType::Boolean => match text.trim().to_ascii_lowercase().as_str() {
        "true" | "y" | "yes" | "1" => Ok(Value::Boolean(true)),
        "false" | "n" | "no" | "0" => Ok(Value::Boolean(false)),
        other => Err(format!("'{}' is not a boolean", other)),
      },
      ValueType::Date => parse_date(text.trim()).map(Value::Date),
      ValueType::Binary => Ok(Value::Binary(text.as_bytes().to_vec())),
    }
  }
}

const DATE_FORMATS: [&str; 3] = ["%Y/%m/%d %H:%M:%S%.3f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse_date(text: &str) -> Result<NaiveDateTime, String> {
  for format in DATE_FORMATS {
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
      return Ok(parsed);
    }
  }
  NaiveDate::parse_from_str(text, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .ok_or_else(|| format!("'{}' is not a date", text))
}

impl fmt::Display for ValueType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ValueType::String => "string",
      ValueType::Integer => "integer",
      ValueType::Number => "number",
      ValueType::Boolean => "boolean",
      ValueType::Date => "date",
      ValueType::Binary => "binary",
    };
    f.write_str(name)
  }
}

impl FromStr for ValueType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "string" => Ok(ValueType::String),
      "integer" => Ok(ValueType::Integer),
      "number" => Ok(ValueType::Number),
      "boolean" => Ok(ValueType::Boolean),
      "date" => Ok(ValueType::Date),
      "binary" => Ok(ValueType::Binary),
      other => Err(format!("Unknown value type '{}'", other)),
    }
  }
}

/// One cell of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
  Null,
  String(String),
  Integer(i64),
  Number(f64),
  Boolean(bool),
  Date(NaiveDateTime),
  Binary(Vec<u8>),
}

impl Value {
  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  /// Type of the value, `None` for null.
  pub fn value_type(&self) -> Option<ValueType> {
    match self {
      Value::Null => None,
      Value::String(_) => Some(ValueType::String),
      Value::Integer(_) => Some(ValueType::Integer),
      Value::Number(_) => Some(ValueType::Number),
      Value::Boolean(_) => Some(ValueType::Boolean),
      Value::Date(_) => Some(ValueType::Date),
      Value::Binary(_) => Some(ValueType::Binary),
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_integer(&self) -> Option<i64> {
    match self {
      Value::Integer(i) => Some(*i),
      _ => None,
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => Ok(()),
      Value::String(s) => f.write_str(s),
      Value::Integer(i) => write!(f, "{}", i),
      Value::Number(n) => write!(f, "{}", n),
      Value::Boolean(b) => write!(f, "{}", b),
      Value::Date(d) => write!(f, "{}", d.format(DATE_FORMATS[0])),
      Value::Binary(b) => write!(f, "{}", String::from_utf8_lossy(b)),
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::String(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::String(s)
  }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self {
    Value::Integer(i)
  }
}

impl From<f64> for Value {
  fn from(n: f64) -> Self {
    Value::Number(n)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Boolean(b)
  }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self {
    v.map_or(Value::Null, Into::into)
  }
}
