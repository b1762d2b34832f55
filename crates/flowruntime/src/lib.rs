//! Flow execution runtime
//!
//! This crate wires nodes into a routing table, validates the graph at
//! construction time, and drives runs one activation at a time. Batch
//! execution runs one sub-flow per input item with bounded concurrency.

mod batch;
mod builder;
mod executor;
mod runtime;

pub use batch::{BatchConfig, BatchFlow, BatchMode, BatchReport, ItemOutcome};
pub use builder::FlowBuilder;
pub use executor::Flow;
pub use runtime::{FlowRun, RunConfig, Termination};
