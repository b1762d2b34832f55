use crate::{Action, ExecutionId, NodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a node activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Prepare,
    Execute,
    Fallback,
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Prepare => "prepare",
            Phase::Execute => "execute",
            Phase::Fallback => "fallback",
            Phase::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a node within one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Idle,
    Preparing,
    Executing,
    Retrying,
    Finalizing,
    Succeeded,
    Failed,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Succeeded | NodeStatus::Failed)
    }
}

/// Audit entry for one completed (or failed) activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub timestamp: DateTime<Utc>,
    pub execution_id: ExecutionId,
    pub activation: u64,
    pub node_id: NodeId,
    pub node: String,
    /// Last phase reached by the activation.
    pub phase: Phase,
    pub status: NodeStatus,
    pub attempts: u32,
    pub action_emitted: Option<Action>,
    pub summary: String,
}

impl ActionRecord {
    pub fn succeeded(&self) -> bool {
        self.status == NodeStatus::Succeeded
    }
}

/// Append-only sequence of [`ActionRecord`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<ActionRecord>);

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ActionRecord) {
        self.0.push(record);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&ActionRecord> {
        self.0.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ActionRecord> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[ActionRecord] {
        &self.0
    }

    /// Number of successful activations that emitted `action`.
    pub fn count_action(&self, action: &Action) -> usize {
        self.0
            .iter()
            .filter(|r| r.succeeded() && r.action_emitted.as_ref() == Some(action))
            .count()
    }

    /// Number of successful activations of the node named `node`.
    pub fn count_node(&self, node: &str) -> usize {
        self.0
            .iter()
            .filter(|r| r.succeeded() && r.node == node)
            .count()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a ActionRecord;
    type IntoIter = std::slice::Iter<'a, ActionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
