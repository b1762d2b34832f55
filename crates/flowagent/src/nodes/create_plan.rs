use super::call_with_timeout;
use crate::collaborators::Planner;
use crate::plan::{default_plan, prioritize_steps, validate_plan};
use async_trait::async_trait;
use flowcore::{
    ExecScope, Node, NodeError, Plan, PlanStep, ProjectContext, Requirements, SharedContext,
    Transition,
};
use std::sync::Arc;
use tracing::{info, warn};

pub struct PlanInputs {
    task: String,
    requirements: Requirements,
    context: ProjectContext,
}

/// Asks the planner for steps, falling back to the default template.
pub struct CreatePlan {
    planner: Arc<dyn Planner>,
    timeout_secs: u64,
    max_steps: usize,
}

impl CreatePlan {
    pub fn new(planner: Arc<dyn Planner>, timeout_secs: u64, max_steps: usize) -> Self {
        Self {
            planner,
            timeout_secs,
            max_steps,
        }
    }
}

#[async_trait]
impl Node for CreatePlan {
    type Prep = PlanInputs;
    type Exec = Vec<PlanStep>;

    fn name(&self) -> &str {
        "create_plan"
    }

    async fn prepare(&self, ctx: &SharedContext) -> Result<PlanInputs, NodeError> {
        Ok(PlanInputs {
            task: ctx.task.clone(),
            requirements: ctx.requirements.clone(),
            context: ctx.context.clone(),
        })
    }

    async fn execute(&self, inputs: &PlanInputs, scope: &ExecScope) -> Result<Vec<PlanStep>, NodeError> {
        let steps = call_with_timeout(
            self.timeout_secs,
            scope,
            self.planner.plan(
                &inputs.task,
                &inputs.requirements,
                &inputs.context,
                self.max_steps,
            ),
        )
        .await?;

        if steps.is_empty() {
            return Err(NodeError::execution("planner returned no steps"));
        }
        Ok(steps)
    }

    async fn fallback(
        &self,
        inputs: &PlanInputs,
        error: NodeError,
        scope: &ExecScope,
    ) -> Result<Vec<PlanStep>, NodeError> {
        warn!("Planning failed ({}), using the default plan", error);
        scope.events.warn(format!("Using default plan: {}", error));
        Ok(default_plan(&inputs.task))
    }

    async fn finalize(
        &self,
        ctx: &mut SharedContext,
        _inputs: PlanInputs,
        steps: Vec<PlanStep>,
    ) -> Result<Transition, NodeError> {
        let validation = validate_plan(&steps);
        let steps = prioritize_steps(&steps);
        if !validation.is_valid {
            warn!("Plan validation issues: {:?}", validation.issues);
        }
        for (i, step) in steps.iter().enumerate() {
            info!("  {}. {} [{:?}]", i + 1, step.name, step.kind);
        }

        let summary = format!("{} steps", steps.len());
        ctx.plan = Plan {
            steps,
            current_step: 0,
            validation,
        };
        ctx.set_state("planned");
        Ok(Transition::default().with_summary(summary))
    }
}
