//! Drives one node activation: prepare, execute with retry, fallback,
//! finalize.

use crate::{
    Action, ErrorClass, EventBus, ExecScope, ExecutionEvent, ExecutionId, Node, NodeError, NodeId,
    NodeStatus, Phase, RetryPolicy, SharedContext,
};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline observed at the start of every phase
#[derive(Clone, Debug)]
pub struct Interrupt {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Interrupt {
    pub fn new(token: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { token, deadline }
    }

    pub fn never() -> Self {
        Self::new(CancellationToken::new(), None)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn check(&self) -> Result<(), NodeError> {
        if self.deadline_passed() {
            return Err(NodeError::DeadlineExceeded);
        }
        if self.token.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        Ok(())
    }

    /// Sleeps for `wait`, waking early if the run is interrupted.
    pub async fn sleep(&self, wait: Duration) -> Result<(), NodeError> {
        if !wait.is_zero() {
            tokio::select! {
                _ = self.token.cancelled() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
        self.check()
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Everything an activation needs from the run driving it
#[derive(Clone)]
pub struct ActivationScope {
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub activation: u64,
    pub policy: RetryPolicy,
    pub interrupt: Interrupt,
    pub bus: EventBus,
}

impl ActivationScope {
    fn exec_scope(&self, attempt: u32) -> ExecScope {
        ExecScope {
            execution_id: self.execution_id,
            node_id: self.node_id,
            attempt,
            max_attempts: self.policy.max_attempts.max(1),
            events: self.bus.create_emitter(self.execution_id, self.node_id),
            cancellation: self.interrupt.token().clone(),
        }
    }

    fn transition(&self, status: NodeStatus, attempt: u32) {
        self.bus.emit(ExecutionEvent::NodeTransition {
            execution_id: self.execution_id,
            node_id: self.node_id,
            status,
            attempt,
            timestamp: Utc::now(),
        });
    }

    fn enter(&self, status: NodeStatus, phase: Phase, attempt: u32) -> Result<(), ActivationFailure> {
        self.transition(status, attempt);
        self.interrupt
            .check()
            .map_err(|error| ActivationFailure { phase, attempt, error })
    }
}

/// A successful activation
#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    pub action: Action,
    pub summary: Option<String>,
    pub attempts: u32,
    pub used_fallback: bool,
}

/// A failed activation: which phase, which attempt, and why
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationFailure {
    pub phase: Phase,
    pub attempt: u32,
    pub error: NodeError,
}

/// Object-safe view of a node, implemented for every [`Node`].
#[async_trait]
pub trait Activate: Send + Sync {
    fn name(&self) -> &str;

    async fn activate(
        &self,
        ctx: &mut SharedContext,
        scope: &ActivationScope,
    ) -> Result<Activation, ActivationFailure>;
}

#[async_trait]
impl<N: Node> Activate for N {
    fn name(&self) -> &str {
        Node::name(self)
    }

    async fn activate(
        &self,
        ctx: &mut SharedContext,
        scope: &ActivationScope,
    ) -> Result<Activation, ActivationFailure> {
        let result = run_phases(self, ctx, scope).await;
        let status = match result {
            Ok(_) => NodeStatus::Succeeded,
            Err(_) => NodeStatus::Failed,
        };
        let attempt = match &result {
            Ok(activation) => activation.attempts,
            Err(failure) => failure.attempt,
        };
        scope.transition(status, attempt);
        result
    }
}

async fn run_phases<N: Node>(
    node: &N,
    ctx: &mut SharedContext,
    scope: &ActivationScope,
) -> Result<Activation, ActivationFailure> {
    scope.enter(NodeStatus::Preparing, Phase::Prepare, 0)?;
    let prep = node.prepare(ctx).await.map_err(|error| ActivationFailure {
        phase: Phase::Prepare,
        attempt: 0,
        error,
    })?;

    let (exec, attempts, used_fallback) = execute_with_retry(node, &prep, scope).await?;

    scope.enter(NodeStatus::Finalizing, Phase::Finalize, attempts)?;
    let transition = node
        .finalize(ctx, prep, exec)
        .await
        .map_err(|error| ActivationFailure {
            phase: Phase::Finalize,
            attempt: attempts,
            error,
        })?;

    Ok(Activation {
        action: transition.action(),
        summary: transition.summary,
        attempts,
        used_fallback,
    })
}

async fn execute_with_retry<N: Node>(
    node: &N,
    prep: &N::Prep,
    scope: &ActivationScope,
) -> Result<(N::Exec, u32, bool), ActivationFailure> {
    let max_attempts = scope.policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let status = if attempt == 1 {
            NodeStatus::Executing
        } else {
            NodeStatus::Retrying
        };
        scope.enter(status, Phase::Execute, attempt)?;

        let exec_scope = scope.exec_scope(attempt);
        let error = match node.execute(prep, &exec_scope).await {
            Ok(exec) => return Ok((exec, attempt, false)),
            Err(error) => error,
        };

        if error.class() != ErrorClass::Execution {
            return Err(ActivationFailure {
                phase: Phase::Execute,
                attempt,
                error,
            });
        }

        if attempt < max_attempts {
            let wait = scope.policy.delay_for(attempt);
            tracing::warn!(
                node = Node::name(node),
                attempt,
                max_attempts,
                wait_ms = wait.as_millis() as u64,
                "Execute failed, retrying: {}",
                error
            );
            scope.bus.emit(ExecutionEvent::NodeRetrying {
                execution_id: scope.execution_id,
                node_id: scope.node_id,
                attempt,
                error: error.to_string(),
                wait_ms: wait.as_millis() as u64,
                timestamp: Utc::now(),
            });
            scope
                .interrupt
                .sleep(wait)
                .await
                .map_err(|error| ActivationFailure {
                    phase: Phase::Execute,
                    attempt,
                    error,
                })?;
            attempt += 1;
            continue;
        }

        tracing::warn!(
            node = Node::name(node),
            attempts = attempt,
            "Retries exhausted, invoking fallback: {}",
            error
        );
        scope.bus.emit(ExecutionEvent::NodeFallback {
            execution_id: scope.execution_id,
            node_id: scope.node_id,
            attempts: attempt,
            error: error.to_string(),
            timestamp: Utc::now(),
        });
        return node
            .fallback(prep, error, &exec_scope)
            .await
            .map(|exec| (exec, attempt, true))
            .map_err(|error| ActivationFailure {
                phase: Phase::Fallback,
                attempt,
                error,
            });
    }
}
