// rowflow/src/core/settings.rs

//! The configuration surface handed to step factories: a flat map of named
//! settings. A setting is either a plain value or a reference to a field of the
//! incoming rows, written `{"field": "<name>"}`.

use crate::error::StepError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Setting {
  /// Resolved against the input layout when the step binds.
  Field { field: String },
  Value(JsonValue),
}

impl Setting {
  pub fn text(value: impl Into<String>) -> Self {
    Setting::Value(JsonValue::String(value.into()))
  }

  pub fn field(name: impl Into<String>) -> Self {
    Setting::Field { field: name.into() }
  }
}

impl From<JsonValue> for Setting {
  fn from(value: JsonValue) -> Self {
    Setting::Value(value)
  }
}

impl From<&str> for Setting {
  fn from(value: &str) -> Self {
    Setting::text(value)
  }
}

impl From<String> for Setting {
  fn from(value: String) -> Self {
    Setting::text(value)
  }
}

impl From<bool> for Setting {
  fn from(value: bool) -> Self {
    Setting::Value(JsonValue::Bool(value))
  }
}

impl From<i64> for Setting {
  fn from(value: i64) -> Self {
    Setting::Value(JsonValue::from(value))
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(BTreeMap<String, Setting>);

impl Settings {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, name: impl Into<String>, setting: impl Into<Setting>) -> Self {
    self.set(name, setting);
    self
  }

  pub fn set(&mut self, name: impl Into<String>, setting: impl Into<Setting>) {
    self.0.insert(name.into(), setting.into());
  }

  pub fn get(&self, name: &str) -> Option<&Setting> {
    self.0.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.0.contains_key(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  /// Raw value of a non-field setting.
  pub fn value(&self, name: &str) -> Option<&JsonValue> {
    match self.0.get(name) {
      Some(Setting::Value(v)) => Some(v),
      _ => None,
    }
  }

  /// Text of a setting. Numbers and booleans are rendered as text; blank text counts as unset.
  pub fn text(&self, name: &str) -> Option<String> {
    match self.value(name)? {
      JsonValue::String(s) if s.trim().is_empty() => None,
      JsonValue::String(s) => Some(s.clone()),
      JsonValue::Number(n) => Some(n.to_string()),
      JsonValue::Bool(b) => Some(b.to_string()),
      _ => None,
    }
  }

  pub fn require_text(&self, name: &str) -> Result<String, StepError> {
    self
      .text(name)
      .ok_or_else(|| StepError::config(format!("required setting '{}' is missing", name)))
  }

  pub fn bool(&self, name: &str) -> Option<bool> {
    match self.value(name)? {
      JsonValue::Bool(b) => Some(*b),
      JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" => Some(true),
        "n" | "no" | "false" => Some(false),
        _ => None,
      },
      _ => None,
    }
  }

  pub fn int(&self, name: &str) -> Result<Option<i64>, StepError> {
    match self.value(name) {
      None => Ok(None),
      Some(JsonValue::Number(n)) => n
        .as_i64()
        .map(Some)
        .ok_or_else(|| StepError::config(format!("setting '{}' must be an integer", name))),
      Some(JsonValue::String(s)) => s
        .trim()
        .parse::<i64>()
        .map(Some)
        .map_err(|_| StepError::config(format!("setting '{}' must be an integer, got '{}'", name, s))),
      Some(_) => Err(StepError::config(format!("setting '{}' must be an integer", name))),
    }
  }

  /// Name of the field a setting refers to.
  pub fn field_ref(&self, name: &str) -> Option<&str> {
    match self.0.get(name) {
      Some(Setting::Field { field }) => Some(field.as_str()),
      _ => None,
    }
  }

  pub fn require_field_ref(&self, name: &str) -> Result<&str, StepError> {
    self
      .field_ref(name)
      .ok_or_else(|| StepError::config(format!("setting '{}' must reference an input field", name)))
  }

  /// Fails when both settings are present.
  pub fn exclusive(&self, a: &str, b: &str) -> Result<(), StepError> {
    if self.contains(a) && self.contains(b) {
      return Err(StepError::config(format!(
        "settings '{}' and '{}' are mutually exclusive",
        a, b
      )));
    }
    Ok(())
  }

  /// Deserializes a structured setting into `T`.
  pub fn parse<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StepError> {
    match self.value(name) {
      None => Ok(None),
      Some(v) => serde_json::from_value(v.clone())
        .map(Some)
        .map_err(|e| StepError::config(format!("setting '{}' is malformed: {}", name, e))),
    }
  }
}
