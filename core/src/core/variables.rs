// rowflow/src/core/variables.rs

//! Variable namespace and placeholder substitution.
//!
//! Placeholders use either `${NAME}` or `%%NAME%%`. Substitution happens once per
//! run (steps do it while binding), never per row.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use thiserror::Error;

// `${NAME}` or `%%NAME%%`. Names may contain dots, e.g. `Internal.Step.Name`.
static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.]*)\}|%%([A-Za-z_][A-Za-z0-9_.]*)%%").expect("valid placeholder regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unresolved variable(s): {}", names.join(", "))]
pub struct UnresolvedVariables {
  pub names: Vec<String>,
}

/// Read-only map of variable names to values, built once before a run and
/// shared by every step copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
  values: HashMap<String, String>,
}

impl Variables {
  pub fn new() -> Self {
    Self::default()
  }

  /// Snapshot of the process environment.
  pub fn from_env() -> Self {
    Self {
      values: std::env::vars().collect(),
    }
  }

  pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.set(name, value);
    self
  }

  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.values.insert(name.into(), value.into());
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.values.get(name).map(String::as_str)
  }

  /// Entries of `other` override entries of `self`.
  pub fn merged(&self, other: &Variables) -> Variables {
    let mut values = self.values.clone();
    values.extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));
    Variables { values }
  }

  /// Replaces every resolvable placeholder; unresolved ones stay as literal text.
  pub fn substitute(&self, text: &str) -> String {
    self.expand(text).0
  }

  /// Like [`substitute`](Self::substitute) but fails if any placeholder is unresolved.
  pub fn substitute_strict(&self, text: &str) -> Result<String, UnresolvedVariables> {
    let (expanded, unresolved) = self.expand(text);
    if unresolved.is_empty() {
      Ok(expanded)
    } else {
      Err(UnresolvedVariables { names: unresolved })
    }
  }

  fn expand(&self, text: &str) -> (String, Vec<String>) {
    let mut unresolved = Vec::new();
    let expanded = PLACEHOLDER_RE.replace_all(text, |caps: &Captures<'_>| {
      let name = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map_or("", |m| m.as_str());
      match self.values.get(name) {
        Some(value) => value.clone(),
        None => {
          unresolved.push(name.to_string());
          caps[0].to_string()
        }
      }
    });
    (expanded.into_owned(), unresolved)
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Variables {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self {
      values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
    }
  }
}
