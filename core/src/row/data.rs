// rowflow/src/row/data.rs

use crate::row::value::Value;
use std::ops::Deref;
use std::sync::Arc;

/// An immutable, fixed-arity row of values.
///
/// Cloning a `Row` shares the underlying buffer; nothing can mutate it once it
/// exists. Steps that change values build a new row (see [`Row::extended`] and
/// [`Row::with_value`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Row(Arc<[Value]>);

impl Row {
  pub fn new(values: Vec<Value>) -> Self {
    Row(values.into())
  }

  /// Row of `arity` nulls.
  pub fn nulls(arity: usize) -> Self {
    Row(vec![Value::Null; arity].into())
  }

  pub fn values(&self) -> &[Value] {
    &self.0
  }

  pub fn to_vec(&self) -> Vec<Value> {
    self.0.to_vec()
  }

  /// New row made of these values followed by `extra`.
  pub fn extended(&self, extra: impl IntoIterator<Item = Value>) -> Row {
    let mut values = self.0.to_vec();
    values.extend(extra);
    Row::new(values)
  }

  /// New row with the value at `index` replaced.
  pub fn with_value(&self, index: usize, value: Value) -> Row {
    let mut values = self.0.to_vec();
    values[index] = value;
    Row::new(values)
  }
}

impl Deref for Row {
  type Target = [Value];

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl From<Vec<Value>> for Row {
  fn from(values: Vec<Value>) -> Self {
    Row::new(values)
  }
}

impl FromIterator<Value> for Row {
  fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
    Row(iter.into_iter().collect())
  }
}
