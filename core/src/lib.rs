// src/lib.rs

//! Rowflow: a multi-threaded row dataflow engine for ETL pipelines.
//!
//! A pipeline ("transformation") is a graph of steps connected by hops. Every
//! step copy runs on its own thread and exchanges rows with its neighbours over
//! bounded, blocking row sets. Rowflow provides:
//!  - Typed rows and row layouts with exact name lookup.
//!  - A step runtime that binds each step to its input layout exactly once.
//!  - Per-step error handling that diverts failed rows to an error hop.
//!  - Round-robin or copy-to-all distribution over parallel step copies.
//!  - Pipeline-wide cancellation that wakes every blocked thread.
//!  - An explicit step registry and a set of built-in steps.

pub mod config;
pub mod core;
pub mod error;
pub mod registry;
pub mod row;
pub mod rowset;
pub mod runtime;
pub mod steps;
pub mod trans;

// --- Re-exports for the Public API ---

pub use crate::core::binding::FieldBinder;
pub use crate::core::check::{CheckResult, CheckStatus};
pub use crate::core::context::StepContext;
pub use crate::core::control::{ProcessOutcome, RunState, StepState};
pub use crate::core::settings::{Setting, Settings};
pub use crate::core::step::{RowBuffer, SourceStep, StepInstance, StepMeta, TransformStep};
pub use crate::core::variables::Variables;

pub use crate::row::{Row, RowMeta, Value, ValueMeta, ValueType};
pub use crate::rowset::{RowSet, RowSetId};

pub use crate::runtime::{RunControl, StepReport};

pub use crate::trans::{
  Distribution, HopMeta, PreparedTrans, RunHandle, RunReport, RunningTrans, StepDefinition, StepErrorMeta, Trans,
  TransMeta,
};

pub use crate::config::EngineConfig;
pub use crate::error::{EngineError, EngineResult, RowError, RowSetError, StepError};
pub use crate::registry::{StepFactory, StepRegistry};
