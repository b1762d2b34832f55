use crate::{Action, ActionRecord, NodeId, Phase, SharedContext};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("{0}")]
    Fatal(Box<FatalError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowError {
    /// The fatal failure, if this error aborted a run.
    pub fn as_fatal(&self) -> Option<&FatalError> {
        match self {
            FlowError::Fatal(fatal) => Some(fatal),
            _ => None,
        }
    }
}

impl From<FatalError> for FlowError {
    fn from(fatal: FatalError) -> Self {
        FlowError::Fatal(Box::new(fatal))
    }
}

/// Errors raised by a node phase.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Preparation failed: {0}")]
    Preparation(String),

    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Finalize failed: {0}")]
    Finalize(String),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Cancelled")]
    Cancelled,

    #[error("Run deadline exceeded")]
    DeadlineExceeded,
}

/// How the lifecycle driver treats a [`NodeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad or missing input. Never retried.
    Preparation,
    /// Transient failure in the work phase. Retried per policy.
    Execution,
    /// Aborts the activation immediately.
    Fatal,
}

impl NodeError {
    pub fn execution(message: impl Into<String>) -> Self {
        NodeError::Execution(message.into())
    }

    pub fn preparation(message: impl Into<String>) -> Self {
        NodeError::Preparation(message.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            NodeError::Preparation(_)
            | NodeError::MissingInput(_)
            | NodeError::InvalidInput { .. } => ErrorClass::Preparation,
            NodeError::Execution(_) | NodeError::Timeout { .. } => ErrorClass::Execution,
            NodeError::Finalize(_)
            | NodeError::Context(_)
            | NodeError::Cancelled
            | NodeError::DeadlineExceeded => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Execution
    }
}

/// Violations of the shared context schema.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContextError {
    #[error("Unknown context key: {0}")]
    UnknownKey(String),

    #[error("Context schema is sealed, cannot declare '{0}'")]
    Sealed(String),

    #[error("Type mismatch for '{key}': expected {expected}, got {actual}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Flow has no start node")]
    MissingStart,

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Duplicate edge from '{node}' on action '{action}'")]
    DuplicateEdge { node: String, action: Action },

    #[error("Node '{node}' has an edge for undeclared action '{action}'")]
    UndeclaredAction { node: String, action: Action },

    #[error("Node '{node}' declares action '{action}' but has no edge for it")]
    MissingBranch { node: String, action: Action },

    #[error("Node '{0}' is unreachable from the start node")]
    Unreachable(String),

    #[error("Invalid retry policy for '{node}': {reason}")]
    InvalidRetryPolicy { node: String, reason: String },

    #[error("Invalid workflow: {0}")]
    Invalid(String),
}

/// A node emitted an action with no matching edge.
///
/// This is a normal termination condition for a run, not a crash.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("No edge from '{node}' for action '{action}'")]
pub struct RoutingError {
    pub node: String,
    pub node_id: NodeId,
    pub action: Action,
}

/// Why a run was aborted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FatalCause {
    #[error("node '{node}' failed in {phase} on attempt {attempt}: {error}")]
    Node {
        node: String,
        node_id: NodeId,
        phase: Phase,
        attempt: u32,
        error: NodeError,
    },

    #[error("activation limit of {limit} reached")]
    ActivationLimit { limit: u64 },

    #[error("run timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("run cancelled")]
    Cancelled,
}

/// A run aborted by a non-recovered failure.
///
/// Carries the audit trail up to the failure and the context as it was
/// when the run stopped.
#[derive(Error, Debug, Clone)]
#[error("Run aborted at activation {activation}: {cause}")]
pub struct FatalError {
    pub cause: FatalCause,
    pub activation: u64,
    pub trail: Vec<ActionRecord>,
    pub context: SharedContext,
}
