use super::call_with_timeout;
use crate::collaborators::{AssistantReport, AssistantRequest, AssistantTask, CodeAssistant};
use crate::PermissionMode;
use async_trait::async_trait;
use flowcore::{
    ExecScope, Node, NodeError, PlanStep, Requirements, SharedContext, StepKind, Transition,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ImplementInputs {
    step: Option<PlanStep>,
    position: usize,
    total: usize,
    project_path: PathBuf,
    requirements: Requirements,
    previous_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImplementOutcome {
    Done(AssistantReport),
    /// Routed on the `error` action
    Failed(String),
}

/// Hands the current plan step to the code assistant.
pub struct ImplementCode {
    assistant: Arc<dyn CodeAssistant>,
    timeout_secs: u64,
    permission: PermissionMode,
}

impl ImplementCode {
    pub fn new(assistant: Arc<dyn CodeAssistant>, timeout_secs: u64, permission: PermissionMode) -> Self {
        Self {
            assistant,
            timeout_secs,
            permission,
        }
    }

    fn request(&self, inputs: &ImplementInputs, step: &PlanStep) -> AssistantRequest {
        let mut tools = if step.tools_needed.is_empty() {
            vec!["Read".to_string(), "Write".to_string()]
        } else {
            step.tools_needed.clone()
        };
        if step.kind == StepKind::Test && !tools.iter().any(|t| t == "Bash") {
            tools.push("Bash".to_string());
        }

        let requirements = serde_json::to_string_pretty(&inputs.requirements).unwrap_or_default();
        let prompt = format!(
            "Implement step {}/{} of the coding task.\n\n\
             Step: {}\nDescription: {}\nType: {:?}\n\n\
             Project path: {}\nFiles created so far: {:?}\n\n\
             Requirements:\n{}\n\n\
             Create or modify the files this step needs.",
            inputs.position,
            inputs.total,
            step.name,
            step.description,
            step.kind,
            inputs.project_path.display(),
            inputs.previous_files,
            requirements,
        );

        AssistantRequest {
            task: AssistantTask::Implement,
            prompt,
            step: Some(step.clone()),
            project_path: inputs.project_path.clone(),
            allowed_tools: tools,
            permission: self.permission,
        }
    }
}

#[async_trait]
impl Node for ImplementCode {
    type Prep = ImplementInputs;
    type Exec = ImplementOutcome;

    fn name(&self) -> &str {
        "implement_code"
    }

    async fn prepare(&self, ctx: &SharedContext) -> Result<ImplementInputs, NodeError> {
        Ok(ImplementInputs {
            step: ctx.plan.current().cloned(),
            position: ctx.plan.current_step + 1,
            total: ctx.plan.steps.len(),
            project_path: ctx.context.project_path.clone(),
            requirements: ctx.requirements.clone(),
            previous_files: ctx.implementation.files_created.clone(),
        })
    }

    async fn execute(&self, inputs: &ImplementInputs, scope: &ExecScope) -> Result<ImplementOutcome, NodeError> {
        let Some(step) = &inputs.step else {
            return Ok(ImplementOutcome::Failed("No step to implement".to_string()));
        };

        info!("Implementing step {}/{}: {}", inputs.position, inputs.total, step.name);
        scope.events.progress(
            inputs.position as f64 / inputs.total.max(1) as f64 * 100.0,
            Some(step.name.clone()),
        );

        let request = self.request(inputs, step);
        let report = call_with_timeout(self.timeout_secs, scope, self.assistant.run(request)).await?;
        Ok(ImplementOutcome::Done(report))
    }

    async fn fallback(
        &self,
        _inputs: &ImplementInputs,
        error: NodeError,
        _scope: &ExecScope,
    ) -> Result<ImplementOutcome, NodeError> {
        Ok(ImplementOutcome::Failed(format!("Implementation failed: {}", error)))
    }

    async fn finalize(
        &self,
        ctx: &mut SharedContext,
        _inputs: ImplementInputs,
        outcome: ImplementOutcome,
    ) -> Result<Transition, NodeError> {
        let report = match outcome {
            ImplementOutcome::Done(report) => report,
            ImplementOutcome::Failed(message) => {
                warn!("{}", message);
                ctx.implementation.errors.push(message.clone());
                ctx.push_error(message.clone());
                return Ok(Transition::to("error").with_summary(message));
            }
        };

        let implementation = &mut ctx.implementation;
        for tool_use in &report.tool_uses {
            if let Some(path) = tool_use.written_file() {
                if tool_use.name == "Write" {
                    implementation.record_created(path);
                } else {
                    implementation.record_modified(path);
                }
            }
        }
        for path in report.files_created {
            implementation.record_created(path);
        }
        for path in report.files_modified {
            implementation.record_modified(path);
        }
        implementation.tool_uses.extend(report.tool_uses);

        ctx.plan.advance();
        ctx.set_state("implementing");

        let summary = format!(
            "step {}/{} done, {} files created",
            ctx.plan.current_step,
            ctx.plan.steps.len(),
            ctx.implementation.files_created.len()
        );
        info!("{}", summary);
        Ok(Transition::default().with_summary(summary))
    }
}
