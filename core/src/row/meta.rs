// rowflow/src/row/meta.rs

//! Row layouts: ordered, uniquely named field descriptors.

use crate::error::DuplicateFieldError;
use crate::row::value::ValueType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Descriptor of one field in a row layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMeta {
  pub name: String,
  #[serde(rename = "type")]
  pub value_type: ValueType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub length: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub precision: Option<u32>,
  /// Name of the step that introduced the field.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub origin: Option<String>,
}

impl ValueMeta {
  pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
    Self {
      name: name.into(),
      value_type,
      length: None,
      precision: None,
      origin: None,
    }
  }

  pub fn with_length(mut self, length: u32) -> Self {
    self.length = Some(length);
    self
  }

  pub fn with_precision(mut self, precision: u32) -> Self {
    self.precision = Some(precision);
    self
  }

  pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
    self.origin = Some(origin.into());
    self
  }
}

/// Ordered list of field descriptors shared by every row on one hop.
///
/// Field names are unique. Position is what ties a value in a [`Row`](crate::Row)
/// to its descriptor; lookups by name resolve to that position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<ValueMeta>", into = "Vec<ValueMeta>")]
pub struct RowMeta {
  fields: Vec<ValueMeta>,
  positions: HashMap<String, usize>,
}

impl RowMeta {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_fields(fields: impl IntoIterator<Item = ValueMeta>) -> Result<Self, DuplicateFieldError> {
    let mut meta = RowMeta::new();
    for field in fields {
      meta.push(field)?;
    }
    Ok(meta)
  }

  /// Appends a field. Fails if the name is already taken.
  pub fn push(&mut self, field: ValueMeta) -> Result<(), DuplicateFieldError> {
    if self.positions.contains_key(&field.name) {
      return Err(DuplicateFieldError(field.name));
    }
    self.positions.insert(field.name.clone(), self.fields.len());
    self.fields.push(field);
    Ok(())
  }

  pub fn with_field(mut self, field: ValueMeta) -> Result<Self, DuplicateFieldError> {
    self.push(field)?;
    Ok(self)
  }

  /// Exact-name lookup of a field position.
  pub fn index_of(&self, name: &str) -> Option<usize> {
    self.positions.get(name).copied()
  }

  pub fn field(&self, index: usize) -> Option<&ValueMeta> {
    self.fields.get(index)
  }

  pub fn fields(&self) -> &[ValueMeta] {
    &self.fields
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.fields.iter().map(|f| f.name.as_str())
  }

  pub fn len(&self) -> usize {
    self.fields.len()
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  /// Same names and types in the same order. Length, precision and origin are ignored.
  pub fn same_layout(&self, other: &RowMeta) -> bool {
    self.fields.len() == other.fields.len()
      && self
        .fields
        .iter()
        .zip(other.fields.iter())
        .all(|(a, b)| a.name == b.name && a.value_type == b.value_type)
  }
}

impl PartialEq for RowMeta {
  fn eq(&self, other: &Self) -> bool {
    self.fields == other.fields
  }
}

impl Eq for RowMeta {}

impl TryFrom<Vec<ValueMeta>> for RowMeta {
  type Error = DuplicateFieldError;

  fn try_from(fields: Vec<ValueMeta>) -> Result<Self, Self::Error> {
    RowMeta::from_fields(fields)
  }
}

impl From<RowMeta> for Vec<ValueMeta> {
  fn from(meta: RowMeta) -> Self {
    meta.fields
  }
}
