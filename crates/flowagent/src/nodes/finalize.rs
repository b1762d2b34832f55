use flowcore::{BlockingNode, ExecScope, FinalSummary, NodeError, SharedContext, Transition};
use tracing::info;

/// Writes the run summary and marks the task completed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalizeProject;

impl BlockingNode for FinalizeProject {
    type Prep = FinalSummary;
    type Exec = FinalSummary;

    fn name(&self) -> &str {
        "finalize_project"
    }

    fn prepare(&self, ctx: &SharedContext) -> Result<FinalSummary, NodeError> {
        Ok(FinalSummary {
            task: ctx.task.clone(),
            files_created: ctx.implementation.files_created.clone(),
            files_modified: ctx.implementation.files_modified.clone(),
            tests_passed: ctx.test_results.as_ref().is_some_and(|r| r.success),
            total_actions: ctx.history().len(),
            status: String::new(),
        })
    }

    fn execute(&self, draft: &FinalSummary, _scope: &ExecScope) -> Result<FinalSummary, NodeError> {
        Ok(FinalSummary {
            status: "completed".to_string(),
            ..draft.clone()
        })
    }

    fn finalize(
        &self,
        ctx: &mut SharedContext,
        _draft: FinalSummary,
        summary: FinalSummary,
    ) -> Result<Transition, NodeError> {
        info!(
            "Task completed: {} files created, tests {}, {} actions",
            summary.files_created.len(),
            if summary.tests_passed { "passed" } else { "failed" },
            summary.total_actions
        );
        ctx.summary = Some(summary);
        ctx.set_state("completed");
        Ok(Transition::default().with_summary("completed"))
    }
}
