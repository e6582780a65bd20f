//! The workflow control plane: phase state machine, queueing gate, issue
//! processor, auto-merge and cleanup sweepers, and the tick loop composing
//! them.

pub mod auto_merge;
pub mod blocking;
pub mod cleaner;
pub mod control_loop;
pub mod executor;
pub mod phase;
pub mod processor;
pub mod queueing;

pub use auto_merge::{AutoMerger, MergeReport};
pub use cleaner::ClosedWindowCleaner;
pub use control_loop::ControlLoop;
pub use executor::{ExecutionOutcome, PhaseExecutor, RunMode};
pub use phase::{determine_phase, validate_transition, Phase};
pub use processor::{IssueProcessor, ProcessOutcome};
