//! Core abstractions for the flow engine
//!
//! This crate provides the shared context, the node capability traits, the
//! per-node lifecycle driver and the error taxonomy. It knows nothing about
//! how nodes are wired together; see `flowruntime` for that.

mod action;
mod context;
mod error;
pub mod events;
mod lifecycle;
mod node;
mod record;
mod retry;
mod value;
mod workflow;

pub use action::{Action, ActionSet};
pub use context::{
    Extensions, FinalSummary, Implementation, Plan, PlanStep, PlanValidation, ProjectContext,
    Requirements, SharedContext, StepKind, TestResults, Todo, ToolUse,
};
pub use error::{
    ContextError, ErrorClass, FatalCause, FatalError, FlowError, NodeError, RoutingError,
    WorkflowError,
};
pub use events::*;
pub use lifecycle::{Activate, Activation, ActivationFailure, ActivationScope, Interrupt};
pub use node::{Blocking, BlockingNode, ExecScope, Node, Transition};
pub use record::{ActionRecord, History, NodeStatus, Phase};
pub use retry::RetryPolicy;
pub use value::Value;
pub use workflow::{Connection, NodeId, NodeSpec, WorkflowId};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
