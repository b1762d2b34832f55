use crate::{Action, EventEmitter, ExecutionId, NodeError, NodeId, SharedContext};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Core trait that all executable nodes implement.
///
/// An activation runs the three phases in order: `prepare` reads the
/// context, `execute` does the work (and is the only phase that is
/// retried), `finalize` writes results back and picks the outgoing action.
/// Any phase may await; the flow never runs two phases of one activation
/// at the same time.
#[async_trait]
pub trait Node: Send + Sync {
    type Prep: Send + Sync;
    type Exec: Send;

    /// Name used in logs, events and the audit trail
    fn name(&self) -> &str;

    /// Read what the node needs. Must not mutate the context.
    async fn prepare(&self, ctx: &SharedContext) -> Result<Self::Prep, NodeError>;

    async fn execute(&self, prep: &Self::Prep, scope: &ExecScope) -> Result<Self::Exec, NodeError>;

    /// Called once retries are exhausted. The default re-raises `error`.
    async fn fallback(
        &self,
        _prep: &Self::Prep,
        error: NodeError,
        _scope: &ExecScope,
    ) -> Result<Self::Exec, NodeError> {
        Err(error)
    }

    async fn finalize(
        &self,
        ctx: &mut SharedContext,
        prep: Self::Prep,
        exec: Self::Exec,
    ) -> Result<Transition, NodeError>;
}

/// Synchronous counterpart of [`Node`].
///
/// Wrap with [`Blocking`] to place it in a flow. Phases run inline on the
/// executor, so bodies should be short.
pub trait BlockingNode: Send + Sync {
    type Prep: Send + Sync;
    type Exec: Send;

    fn name(&self) -> &str;

    fn prepare(&self, ctx: &SharedContext) -> Result<Self::Prep, NodeError>;

    fn execute(&self, prep: &Self::Prep, scope: &ExecScope) -> Result<Self::Exec, NodeError>;

    fn fallback(
        &self,
        _prep: &Self::Prep,
        error: NodeError,
        _scope: &ExecScope,
    ) -> Result<Self::Exec, NodeError> {
        Err(error)
    }

    fn finalize(
        &self,
        ctx: &mut SharedContext,
        prep: Self::Prep,
        exec: Self::Exec,
    ) -> Result<Transition, NodeError>;
}

/// Adapts a [`BlockingNode`] to the async [`Node`] interface.
pub struct Blocking<N>(pub N);

#[async_trait]
impl<N: BlockingNode> Node for Blocking<N> {
    type Prep = N::Prep;
    type Exec = N::Exec;

    fn name(&self) -> &str {
        self.0.name()
    }

    async fn prepare(&self, ctx: &SharedContext) -> Result<Self::Prep, NodeError> {
        self.0.prepare(ctx)
    }

    async fn execute(&self, prep: &Self::Prep, scope: &ExecScope) -> Result<Self::Exec, NodeError> {
        self.0.execute(prep, scope)
    }

    async fn fallback(
        &self,
        prep: &Self::Prep,
        error: NodeError,
        scope: &ExecScope,
    ) -> Result<Self::Exec, NodeError> {
        self.0.fallback(prep, error, scope)
    }

    async fn finalize(
        &self,
        ctx: &mut SharedContext,
        prep: Self::Prep,
        exec: Self::Exec,
    ) -> Result<Transition, NodeError> {
        self.0.finalize(ctx, prep, exec)
    }
}

/// What `execute` and `fallback` can see about the current attempt
#[derive(Clone)]
pub struct ExecScope {
    pub execution_id: ExecutionId,
    pub node_id: NodeId,

    /// 1-based attempt index
    pub attempt: u32,
    pub max_attempts: u32,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Run-level cancellation; long external calls should select on it
    pub cancellation: CancellationToken,
}

impl ExecScope {
    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Result of the finalize phase
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    /// `None` routes on [`Action::DEFAULT`]
    pub action: Option<Action>,
    pub summary: Option<String>,
}

impl Transition {
    pub fn to(action: impl Into<Action>) -> Self {
        Self {
            action: Some(action.into()),
            summary: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn action(&self) -> Action {
        self.action.clone().unwrap_or(Action::DEFAULT)
    }
}
