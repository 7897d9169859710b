// rowflow/src/core/mod.rs
pub mod binding;
pub mod check;
pub mod context;
pub mod control;
pub mod settings;
pub mod step;
pub mod variables;

// Re-export key types for easier access from other modules (and lib.rs)
pub use binding::FieldBinder;
pub use check::{CheckResult, CheckStatus};
pub use context::StepContext;
pub use control::{ProcessOutcome, RunState, StepState};
pub use settings::{Setting, Settings};
pub use step::{RowBuffer, SourceStep, StepInstance, StepMeta, TransformStep};
pub use variables::Variables;
