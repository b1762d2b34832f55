use super::call_with_timeout;
use crate::collaborators::{Decision, DecisionMaker};
use crate::local::RuleBasedDecider;
use async_trait::async_trait;
use flowcore::{Action, ActionSet, ExecScope, Node, NodeError, SharedContext, Transition};
use std::sync::Arc;
use tracing::{info, warn};

/// The actions the decision node routes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Plan,
    Implement,
    Test,
    Refactor,
    Complete,
}

impl ActionSet for Step {
    const ALL: &'static [Self] = &[
        Step::Plan,
        Step::Implement,
        Step::Test,
        Step::Refactor,
        Step::Complete,
    ];

    fn label(self) -> &'static str {
        match self {
            Step::Plan => "plan",
            Step::Implement => "implement",
            Step::Test => "test",
            Step::Refactor => "refactor",
            Step::Complete => "complete",
        }
    }
}

/// Picks the next step of the agent loop.
///
/// Each activation counts as one iteration; reaching `max_iterations`
/// forces `complete`. Labels the decider returns outside [`Step`] are
/// emitted as-is and leave the flow unrouted.
pub struct DecideAction {
    decider: Arc<dyn DecisionMaker>,
    timeout_secs: u64,
    max_plan_attempts: usize,
}

impl DecideAction {
    pub fn new(decider: Arc<dyn DecisionMaker>, timeout_secs: u64, max_plan_attempts: usize) -> Self {
        Self {
            decider,
            timeout_secs,
            max_plan_attempts,
        }
    }
}

#[async_trait]
impl Node for DecideAction {
    type Prep = SharedContext;
    type Exec = Decision;

    fn name(&self) -> &str {
        "decide_action"
    }

    async fn prepare(&self, ctx: &SharedContext) -> Result<SharedContext, NodeError> {
        Ok(ctx.clone())
    }

    async fn execute(&self, snapshot: &SharedContext, scope: &ExecScope) -> Result<Decision, NodeError> {
        call_with_timeout(self.timeout_secs, scope, self.decider.decide(snapshot)).await
    }

    async fn fallback(
        &self,
        snapshot: &SharedContext,
        error: NodeError,
        scope: &ExecScope,
    ) -> Result<Decision, NodeError> {
        let decision = RuleBasedDecider.choose(snapshot);
        warn!("Decision failed ({}), falling back to rules: {}", error, decision.action);
        scope
            .events
            .warn(format!("Using rule-based decision after: {}", error));
        Ok(decision)
    }

    async fn finalize(
        &self,
        ctx: &mut SharedContext,
        _snapshot: SharedContext,
        decision: Decision,
    ) -> Result<Transition, NodeError> {
        ctx.current_iteration += 1;
        info!(
            "Decision point {} (state {}, {} errors)",
            ctx.current_iteration,
            ctx.state,
            ctx.errors.len()
        );

        if ctx.current_iteration >= ctx.max_iterations {
            warn!("Reached maximum iterations ({}), completing", ctx.max_iterations);
            return Ok(Transition::to(Step::Complete.action()).with_summary(format!(
                "complete: reached maximum iterations ({})",
                ctx.max_iterations
            )));
        }

        let label = decision.action.trim().to_lowercase();
        let (action, reasoning) = match Step::parse(&label) {
            Some(Step::Plan)
                if ctx.history().count_action(&Step::Plan.action()) >= self.max_plan_attempts =>
            {
                (
                    Step::Implement.action(),
                    "Moving to implementation after multiple planning attempts".to_string(),
                )
            }
            Some(step) => (step.action(), decision.reasoning),
            None => {
                warn!("Decider returned unknown action '{}'", label);
                (Action::from(label), decision.reasoning)
            }
        };

        info!("Decided: {} ({})", action, reasoning);
        let summary = format!("{}: {}", action, reasoning);
        Ok(Transition::to(action).with_summary(summary))
    }
}
