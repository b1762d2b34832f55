use crate::{FlowRun, RunConfig, Termination};
use chrono::Utc;
use flowcore::{
    Action, ActionRecord, ActivationFailure, ActivationScope, EventBus, ExecutionEvent,
    ExecutionId, FatalCause, FatalError, FlowError, Interrupt, NodeError, NodeId, NodeSpec,
    NodeStatus, Phase, RoutingError, SharedContext, WorkflowId,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A validated node graph, driven one activation at a time.
///
/// A `Flow` holds no per-run state and can drive any number of runs,
/// including concurrent ones, each over its own [`SharedContext`].
pub struct Flow {
    pub(crate) id: WorkflowId,
    pub(crate) name: String,
    pub(crate) start: NodeId,
    pub(crate) nodes: HashMap<NodeId, NodeSpec>,
    pub(crate) routes: HashMap<NodeId, HashMap<Action, NodeId>>,
    pub(crate) bus: EventBus,
}

/// How the stepping loop stopped
enum Stop {
    Terminated {
        last_action: Action,
        termination: Termination,
        activations: u64,
    },
    Aborted {
        cause: FatalCause,
        activations: u64,
    },
}

impl Flow {
    pub fn id(&self) -> WorkflowId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeSpec> {
        self.nodes.get(&id)
    }

    /// Target of `(from, action)` in the routing table
    pub fn successor(&self, from: NodeId, action: &Action) -> Option<NodeId> {
        self.routes.get(&from).and_then(|table| table.get(action)).copied()
    }

    /// Subscribe to execution events of every run of this flow
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.bus.subscribe()
    }

    pub async fn run(&self, ctx: SharedContext, config: &RunConfig) -> Result<FlowRun, FlowError> {
        self.run_with_cancel(ctx, config, CancellationToken::new()).await
    }

    /// Runs the flow until no edge matches the emitted action.
    ///
    /// Cancelling `cancel` stops the run at the start of the next phase.
    pub async fn run_with_cancel(
        &self,
        mut ctx: SharedContext,
        config: &RunConfig,
        cancel: CancellationToken,
    ) -> Result<FlowRun, FlowError> {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();

        self.bus.emit(ExecutionEvent::FlowStarted {
            execution_id,
            flow: self.name.clone(),
            timestamp: Utc::now(),
        });
        tracing::info!("Starting flow '{}' ({})", self.name, execution_id);

        ctx.seal();

        let token = cancel.child_token();
        let deadline = config.timeout().map(|t| tokio::time::Instant::now() + t);
        let watchdog = deadline.map(|deadline| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                token.cancel();
            })
        });
        let interrupt = Interrupt::new(token, deadline);

        let stop = self.drive(&mut ctx, config, execution_id, &interrupt).await;

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        let duration_ms = start_time.elapsed().as_millis() as u64;
        let (success, activations) = match &stop {
            Stop::Terminated { activations, .. } => (true, *activations),
            Stop::Aborted { activations, .. } => (false, *activations),
        };
        self.bus.emit(ExecutionEvent::FlowCompleted {
            execution_id,
            success,
            activations,
            duration_ms,
            timestamp: Utc::now(),
        });

        match stop {
            Stop::Terminated {
                last_action,
                termination,
                activations,
            } => {
                tracing::info!(
                    "Flow '{}' finished after {} activations in {}ms",
                    self.name,
                    activations,
                    duration_ms
                );
                Ok(FlowRun {
                    execution_id,
                    last_action,
                    termination,
                    activations,
                    context: ctx,
                })
            }
            Stop::Aborted { cause, activations } => {
                tracing::error!("Flow '{}' aborted: {}", self.name, cause);
                Err(FatalError {
                    cause,
                    activation: activations,
                    trail: ctx.history().as_slice().to_vec(),
                    context: ctx,
                }
                .into())
            }
        }
    }

    async fn drive(
        &self,
        ctx: &mut SharedContext,
        config: &RunConfig,
        execution_id: ExecutionId,
        interrupt: &Interrupt,
    ) -> Stop {
        let mut current = self.start;
        let mut activations = 0u64;

        loop {
            if let Some(limit) = config.max_activations {
                if activations >= limit {
                    return Stop::Aborted {
                        cause: FatalCause::ActivationLimit { limit },
                        activations,
                    };
                }
            }
            if let Err(error) = interrupt.check() {
                return Stop::Aborted {
                    cause: interrupt_cause(&error, config),
                    activations,
                };
            }

            // Built flows only route to known nodes.
            let Some(spec) = self.nodes.get(&current) else {
                return Stop::Aborted {
                    cause: FatalCause::Node {
                        node: current.to_string(),
                        node_id: current,
                        phase: Phase::Prepare,
                        attempt: 0,
                        error: NodeError::Preparation("node missing from flow".to_string()),
                    },
                    activations,
                };
            };

            activations += 1;
            let activation = activations;
            let started = Instant::now();

            tracing::info!(node = %spec.name, activation, "Activating node");
            self.bus.emit(ExecutionEvent::NodeStarted {
                execution_id,
                node_id: spec.id,
                node: spec.name.clone(),
                activation,
                timestamp: Utc::now(),
            });

            let scope = ActivationScope {
                execution_id,
                node_id: spec.id,
                activation,
                policy: spec.retry_policy.clone(),
                interrupt: interrupt.clone(),
                bus: self.bus.clone(),
            };

            match spec.node.activate(ctx, &scope).await {
                Ok(outcome) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    let summary = outcome.summary.clone().unwrap_or_else(|| {
                        if outcome.used_fallback {
                            format!("{} completed via fallback", spec.name)
                        } else {
                            format!("{} completed", spec.name)
                        }
                    });
                    ctx.history_mut().push(ActionRecord {
                        timestamp: Utc::now(),
                        execution_id,
                        activation,
                        node_id: spec.id,
                        node: spec.name.clone(),
                        phase: Phase::Finalize,
                        status: NodeStatus::Succeeded,
                        attempts: outcome.attempts,
                        action_emitted: Some(outcome.action.clone()),
                        summary,
                    });
                    self.bus.emit(ExecutionEvent::NodeCompleted {
                        execution_id,
                        node_id: spec.id,
                        action: outcome.action.clone(),
                        attempts: outcome.attempts,
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                    tracing::info!(
                        node = %spec.name,
                        action = %outcome.action,
                        "Node completed in {}ms",
                        duration_ms
                    );

                    let next = self.successor(current, &outcome.action);
                    self.bus.emit(ExecutionEvent::Routed {
                        execution_id,
                        from: current,
                        action: outcome.action.clone(),
                        to: next,
                        timestamp: Utc::now(),
                    });

                    match next {
                        Some(next) => {
                            tracing::debug!(from = %spec.name, action = %outcome.action, "Routing to next node");
                            current = next;
                        }
                        None => {
                            let termination = if self.routes.contains_key(&current)
                                || !outcome.action.is_default()
                            {
                                let routing = RoutingError {
                                    node: spec.name.clone(),
                                    node_id: current,
                                    action: outcome.action.clone(),
                                };
                                tracing::info!("{}; terminating", routing);
                                Termination::Unrouted(routing)
                            } else {
                                Termination::EndOfGraph {
                                    node: spec.name.clone(),
                                }
                            };
                            return Stop::Terminated {
                                last_action: outcome.action,
                                termination,
                                activations,
                            };
                        }
                    }
                }
                Err(failure) => {
                    let ActivationFailure { phase, attempt, error } = failure;
                    tracing::error!(node = %spec.name, %phase, attempt, "Node failed: {}", error);
                    ctx.history_mut().push(ActionRecord {
                        timestamp: Utc::now(),
                        execution_id,
                        activation,
                        node_id: spec.id,
                        node: spec.name.clone(),
                        phase,
                        status: NodeStatus::Failed,
                        attempts: attempt,
                        action_emitted: None,
                        summary: error.to_string(),
                    });
                    self.bus.emit(ExecutionEvent::NodeFailed {
                        execution_id,
                        node_id: spec.id,
                        phase,
                        attempt,
                        error: error.to_string(),
                        timestamp: Utc::now(),
                    });

                    let cause = match error {
                        NodeError::Cancelled | NodeError::DeadlineExceeded => {
                            // External calls report a fired watchdog as plain cancellation.
                            match interrupt.check() {
                                Err(deadline @ NodeError::DeadlineExceeded) => {
                                    interrupt_cause(&deadline, config)
                                }
                                _ => interrupt_cause(&error, config),
                            }
                        }
                        error => FatalCause::Node {
                            node: spec.name.clone(),
                            node_id: spec.id,
                            phase,
                            attempt,
                            error,
                        },
                    };
                    return Stop::Aborted { cause, activations };
                }
            }
        }
    }
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("start", &self.start)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

fn interrupt_cause(error: &NodeError, config: &RunConfig) -> FatalCause {
    match error {
        NodeError::DeadlineExceeded => FatalCause::Timeout {
            after: config.timeout().unwrap_or(Duration::ZERO),
        },
        _ => FatalCause::Cancelled,
    }
}
