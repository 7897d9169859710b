// rowflow/src/runtime/mod.rs
pub mod control;
pub mod error_channel;
pub mod io;
pub mod runner;
pub mod stats;

pub use control::{FailureCause, RunControl};
pub use error_channel::{error_layout, ErrorChannel, ErrorRecord};
pub use io::{InputGate, OutputHop, OutputRouter};
pub use runner::StepRunner;
pub use stats::{StepReport, StepStats};
