use crate::{Action, ActionSet, Activate, Blocking, BlockingNode, Node, RetryPolicy};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type NodeId = Uuid;

/// A node placed in a flow, with its retry policy and optional closed
/// action set.
#[derive(Clone)]
pub struct NodeSpec {
    pub id: NodeId,
    pub name: String,
    pub node: Arc<dyn Activate>,
    pub retry_policy: RetryPolicy,
    /// Actions this node may emit. `None` leaves the node open.
    pub actions: Option<Vec<Action>>,
}

impl NodeSpec {
    pub fn new<N: Node + 'static>(node: N) -> Self {
        let name = Node::name(&node).to_string();
        Self {
            id: Uuid::new_v4(),
            name,
            node: Arc::new(node),
            retry_policy: RetryPolicy::default(),
            actions: None,
        }
    }

    pub fn blocking<N: BlockingNode + 'static>(node: N) -> Self {
        Self::new(Blocking(node))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fixed-interval retries: `max_attempts` total attempts, `wait` apart.
    pub fn with_retry(mut self, max_attempts: u32, wait: Duration) -> Self {
        self.retry_policy = RetryPolicy::new(max_attempts, wait);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Declares the closed set of actions this node emits.
    pub fn with_actions<A: ActionSet>(mut self) -> Self {
        self.actions = Some(A::actions());
        self
    }

    pub fn with_action_labels<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Action>,
    {
        self.actions = Some(labels.into_iter().map(Into::into).collect());
        self
    }
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("retry_policy", &self.retry_policy)
            .field("actions", &self.actions)
            .finish()
    }
}

/// Edge of the routing table: `(from, action) -> to`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub from_node: NodeId,
    pub action: Action,
    pub to_node: NodeId,
}
