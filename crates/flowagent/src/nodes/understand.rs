use super::call_with_timeout;
use crate::collaborators::RequirementsAnalyzer;
use async_trait::async_trait;
use flowcore::{ExecScope, Node, NodeError, Requirements, SharedContext, Transition};
use std::sync::Arc;
use tracing::{info, warn};

/// Turns the task text into structured requirements.
///
/// A missing task is a preparation error. If the analyzer keeps failing the
/// task text itself becomes the main goal.
pub struct UnderstandRequirements {
    analyzer: Arc<dyn RequirementsAnalyzer>,
    timeout_secs: u64,
}

impl UnderstandRequirements {
    pub fn new(analyzer: Arc<dyn RequirementsAnalyzer>, timeout_secs: u64) -> Self {
        Self {
            analyzer,
            timeout_secs,
        }
    }
}

#[async_trait]
impl Node for UnderstandRequirements {
    type Prep = String;
    type Exec = Requirements;

    fn name(&self) -> &str {
        "understand_requirements"
    }

    async fn prepare(&self, ctx: &SharedContext) -> Result<String, NodeError> {
        let task = ctx.task.trim();
        if task.is_empty() {
            return Err(NodeError::MissingInput("task".to_string()));
        }
        Ok(task.to_string())
    }

    async fn execute(&self, task: &String, scope: &ExecScope) -> Result<Requirements, NodeError> {
        call_with_timeout(self.timeout_secs, scope, self.analyzer.understand(task)).await
    }

    async fn fallback(
        &self,
        task: &String,
        error: NodeError,
        scope: &ExecScope,
    ) -> Result<Requirements, NodeError> {
        warn!("Requirements analysis failed ({}), using the task as the goal", error);
        scope.events.warn(format!("Using simplified requirements: {}", error));
        Ok(Requirements {
            main_goal: task.clone(),
            ..Requirements::default()
        })
    }

    async fn finalize(
        &self,
        ctx: &mut SharedContext,
        _task: String,
        requirements: Requirements,
    ) -> Result<Transition, NodeError> {
        info!("Requirements understood: {}", requirements.main_goal);
        let summary = requirements.main_goal.clone();
        ctx.requirements = requirements;
        ctx.set_state("requirements_understood");
        Ok(Transition::default().with_summary(summary))
    }
}
