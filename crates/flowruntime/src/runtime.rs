use flowcore::{Action, ActionRecord, ExecutionId, RoutingError, SharedContext};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-run guards.
///
/// Cycles in a flow are legal and nothing inside the graph bounds them, so
/// every run carries an activation cap and optionally a wall-clock timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_activations: Option<u64>,
    pub timeout_ms: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_activations: Some(100),
            timeout_ms: None,
        }
    }
}

impl RunConfig {
    /// No activation cap and no timeout. Termination is up to the nodes.
    pub fn unbounded() -> Self {
        Self {
            max_activations: None,
            timeout_ms: None,
        }
    }

    pub fn with_max_activations(mut self, limit: u64) -> Self {
        self.max_activations = Some(limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Parses guards from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> flowcore::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Why a run that did not abort stopped
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// The last node has no outgoing edges and emitted the default action.
    EndOfGraph { node: String },
    /// No edge exists for the action the last node emitted. A named action
    /// on a node without edges lands here too.
    Unrouted(RoutingError),
}

impl Termination {
    pub fn routing_error(&self) -> Option<&RoutingError> {
        match self {
            Termination::Unrouted(routing) => Some(routing),
            Termination::EndOfGraph { .. } => None,
        }
    }
}

/// Result of a run that reached a terminal state
#[derive(Debug, Clone)]
pub struct FlowRun {
    pub execution_id: ExecutionId,
    pub last_action: Action,
    pub termination: Termination,
    pub activations: u64,
    pub context: SharedContext,
}

impl FlowRun {
    pub fn trail(&self) -> &[ActionRecord] {
        self.context.history().as_slice()
    }

    /// Node names in activation order
    pub fn visited(&self) -> Vec<&str> {
        self.trail().iter().map(|r| r.node.as_str()).collect()
    }
}
