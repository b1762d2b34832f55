use crate::Flow;
use flowcore::{Action, ActionSet, Connection, EventBus, NodeId, NodeSpec, WorkflowError};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Assembles nodes and action-labelled edges into a validated [`Flow`].
pub struct FlowBuilder {
    name: String,
    nodes: Vec<NodeSpec>,
    connections: Vec<Connection>,
    start: Option<NodeId>,
    event_buffer: usize,
}

impl FlowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            connections: Vec::new(),
            start: None,
            event_buffer: 1000,
        }
    }

    /// Adds a node. The first node added is the start node unless
    /// [`FlowBuilder::start_at`] says otherwise.
    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id;
        if self.start.is_none() {
            self.start = Some(id);
        }
        self.nodes.push(node);
        id
    }

    pub fn start_at(&mut self, node: NodeId) -> &mut Self {
        self.start = Some(node);
        self
    }

    pub fn connect(&mut self, from: NodeId, action: impl Into<Action>, to: NodeId) -> &mut Self {
        self.connections.push(Connection {
            from_node: from,
            action: action.into(),
            to_node: to,
        });
        self
    }

    /// Edge taken when `from` finalizes without choosing an action.
    pub fn then(&mut self, from: NodeId, to: NodeId) -> &mut Self {
        self.connect(from, Action::DEFAULT, to)
    }

    /// Links `nodes` in order with default edges.
    pub fn chain(&mut self, nodes: &[NodeId]) -> &mut Self {
        for pair in nodes.windows(2) {
            self.then(pair[0], pair[1]);
        }
        self
    }

    /// Connects every member of `A` from `from` to the node `route` picks.
    pub fn branch<A: ActionSet>(&mut self, from: NodeId, mut route: impl FnMut(A) -> NodeId) -> &mut Self {
        for action in A::ALL.iter().copied() {
            let to = route(action);
            self.connect(from, action.action(), to);
        }
        self
    }

    pub fn event_buffer(&mut self, capacity: usize) -> &mut Self {
        self.event_buffer = capacity;
        self
    }

    pub fn build(self) -> Result<Flow, WorkflowError> {
        let start = self.start.ok_or(WorkflowError::MissingStart)?;

        let mut graph: DiGraph<NodeId, Action> = DiGraph::new();
        let mut node_to_index: HashMap<NodeId, NodeIndex> = HashMap::new();
        for node in &self.nodes {
            node.retry_policy.validate(&node.name)?;
            if node_to_index.insert(node.id, graph.add_node(node.id)).is_some() {
                return Err(WorkflowError::Invalid(format!("node '{}' added twice", node.name)));
            }
        }

        let start_idx = *node_to_index
            .get(&start)
            .ok_or(WorkflowError::NodeNotFound(start))?;

        let names: HashMap<NodeId, &str> = self.nodes.iter().map(|n| (n.id, n.name.as_str())).collect();
        let mut routes: HashMap<NodeId, HashMap<Action, NodeId>> = HashMap::new();

        for conn in &self.connections {
            let from_idx = node_to_index
                .get(&conn.from_node)
                .ok_or(WorkflowError::NodeNotFound(conn.from_node))?;
            let to_idx = node_to_index
                .get(&conn.to_node)
                .ok_or(WorkflowError::NodeNotFound(conn.to_node))?;

            let table = routes.entry(conn.from_node).or_default();
            if table.insert(conn.action.clone(), conn.to_node).is_some() {
                return Err(WorkflowError::DuplicateEdge {
                    node: names[&conn.from_node].to_string(),
                    action: conn.action.clone(),
                });
            }
            graph.add_edge(*from_idx, *to_idx, conn.action.clone());
        }

        for node in &self.nodes {
            let Some(declared) = &node.actions else {
                continue;
            };
            let declared: HashSet<&Action> = declared.iter().collect();
            let table = routes.get(&node.id);

            if let Some(table) = table {
                if let Some(action) = table.keys().find(|a| !declared.contains(a)) {
                    return Err(WorkflowError::UndeclaredAction {
                        node: node.name.clone(),
                        action: action.clone(),
                    });
                }
            }
            for action in &declared {
                if !table.is_some_and(|t| t.contains_key(*action)) {
                    return Err(WorkflowError::MissingBranch {
                        node: node.name.clone(),
                        action: (*action).clone(),
                    });
                }
            }
        }

        let mut reachable = HashSet::new();
        let mut dfs = Dfs::new(&graph, start_idx);
        while let Some(idx) = dfs.next(&graph) {
            reachable.insert(graph[idx]);
        }
        if let Some(orphan) = self.nodes.iter().find(|n| !reachable.contains(&n.id)) {
            return Err(WorkflowError::Unreachable(orphan.name.clone()));
        }

        tracing::debug!(
            flow = %self.name,
            nodes = self.nodes.len(),
            edges = self.connections.len(),
            "Built flow"
        );

        Ok(Flow {
            id: Uuid::new_v4(),
            name: self.name,
            start,
            nodes: self.nodes.into_iter().map(|n| (n.id, n)).collect(),
            routes,
            bus: EventBus::new(self.event_buffer),
        })
    }
}
