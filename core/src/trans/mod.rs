// rowflow/src/trans/mod.rs
pub mod execution;
pub mod meta;
pub mod report;
pub(crate) mod wiring;

pub use execution::{PreparedTrans, RunHandle, RunningTrans, Trans};
pub use meta::{Distribution, HopMeta, StepDefinition, StepErrorMeta, TransMeta, DEFAULT_ROW_SET_CAPACITY};
pub use report::RunReport;
