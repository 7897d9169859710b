// rowflow/src/row/mod.rs

//! Row data model: values, layouts and the immutable row buffer.

pub mod data;
pub mod meta;
pub mod value;

pub use data::Row;
pub use meta::{RowMeta, ValueMeta};
pub use value::{Value, ValueType};
