use super::call_with_timeout;
use crate::collaborators::{AssistantReport, AssistantRequest, AssistantTask, CodeAssistant};
use crate::PermissionMode;
use async_trait::async_trait;
use flowcore::{ExecScope, Node, NodeError, SharedContext, TestResults, Transition};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub struct RefactorInputs {
    project_path: PathBuf,
    test_results: Option<TestResults>,
    issues: Vec<String>,
    files_created: Vec<String>,
}

/// Asks the assistant to fix recorded issues, then clears them.
pub struct RefactorCode {
    assistant: Arc<dyn CodeAssistant>,
    timeout_secs: u64,
    permission: PermissionMode,
}

impl RefactorCode {
    pub fn new(assistant: Arc<dyn CodeAssistant>, timeout_secs: u64, permission: PermissionMode) -> Self {
        Self {
            assistant,
            timeout_secs,
            permission,
        }
    }
}

#[async_trait]
impl Node for RefactorCode {
    type Prep = RefactorInputs;
    type Exec = AssistantReport;

    fn name(&self) -> &str {
        "refactor_code"
    }

    async fn prepare(&self, ctx: &SharedContext) -> Result<RefactorInputs, NodeError> {
        let mut issues = Vec::new();
        if ctx.test_results.as_ref().is_some_and(|r| !r.success) {
            issues.push("Test failures detected".to_string());
        }
        for error in &ctx.errors {
            if !issues.contains(error) {
                issues.push(error.clone());
            }
        }
        Ok(RefactorInputs {
            project_path: ctx.context.project_path.clone(),
            test_results: ctx.test_results.clone(),
            issues,
            files_created: ctx.implementation.files_created.clone(),
        })
    }

    async fn execute(&self, inputs: &RefactorInputs, scope: &ExecScope) -> Result<AssistantReport, NodeError> {
        let test_output = inputs
            .test_results
            .as_ref()
            .map(|r| r.output.as_str())
            .unwrap_or("No test output");
        let prompt = format!(
            "Refactor and improve the implementation.\n\n\
             Files: {:?}\nIssues: {:?}\nTest output: {}\n\n\
             Fix the issues above and improve structure, error handling and documentation.",
            inputs.files_created, inputs.issues, test_output,
        );

        let request = AssistantRequest {
            task: AssistantTask::Refactor,
            prompt,
            step: None,
            project_path: inputs.project_path.clone(),
            allowed_tools: vec!["Read".to_string(), "Write".to_string(), "Bash".to_string()],
            permission: self.permission,
        };
        call_with_timeout(self.timeout_secs, scope, self.assistant.run(request)).await
    }

    async fn fallback(
        &self,
        _inputs: &RefactorInputs,
        error: NodeError,
        _scope: &ExecScope,
    ) -> Result<AssistantReport, NodeError> {
        warn!("Refactor failed: {}", error);
        Ok(AssistantReport::with_log(format!("Refactor failed: {}", error)))
    }

    async fn finalize(
        &self,
        ctx: &mut SharedContext,
        inputs: RefactorInputs,
        report: AssistantReport,
    ) -> Result<Transition, NodeError> {
        for path in report.files_created {
            ctx.implementation.record_created(path);
        }
        for path in report.files_modified {
            ctx.implementation.record_modified(path);
        }
        ctx.implementation.tool_uses.extend(report.tool_uses);

        ctx.errors.clear();
        ctx.set_state("refactored");
        info!("Refactored, {} issues addressed", inputs.issues.len());
        Ok(Transition::default().with_summary(format!("{} issues addressed", inputs.issues.len())))
    }
}
