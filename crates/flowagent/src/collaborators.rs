//! The boundary between the agent nodes and the systems they call.
//!
//! Nodes only see these traits. The defaults in [`crate::local`] cover
//! everything except the code assistant, which is always supplied by the
//! caller.

use crate::local::{FsProjectAnalyzer, HeuristicRequirements, RuleBasedDecider, TemplatePlanner};
use crate::PermissionMode;
use async_trait::async_trait;
use flowcore::{
    NodeError, PlanStep, ProjectContext, Requirements, SharedContext, Todo, ToolUse,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Turns raw task text into structured requirements.
#[async_trait]
pub trait RequirementsAnalyzer: Send + Sync {
    /// Fails with [`NodeError::Preparation`] on empty text.
    async fn understand(&self, task: &str) -> Result<Requirements, NodeError>;
}

/// Scans a project directory.
///
/// A path that does not exist yields an empty snapshot, never an error.
pub trait ProjectAnalyzer: Send + Sync {
    fn analyze(&self, path: &Path) -> ProjectSnapshot;
}

/// Picks the next action from a full context snapshot.
#[async_trait]
pub trait DecisionMaker: Send + Sync {
    async fn decide(&self, ctx: &SharedContext) -> Result<Decision, NodeError>;
}

/// Breaks a task into plan steps.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        task: &str,
        requirements: &Requirements,
        context: &ProjectContext,
        max_steps: usize,
    ) -> Result<Vec<PlanStep>, NodeError>;
}

/// External code generation, testing and refactoring tool.
#[async_trait]
pub trait CodeAssistant: Send + Sync {
    async fn run(&self, request: AssistantRequest) -> Result<AssistantReport, NodeError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSnapshot {
    pub existing_files: Vec<String>,
    pub dependencies: BTreeMap<String, String>,
    pub file_types: BTreeMap<String, usize>,
    pub entry_points: Vec<String>,
    pub total_files: usize,
    pub total_lines: usize,
    pub todos: Vec<Todo>,
}

impl ProjectSnapshot {
    pub fn apply_to(self, context: &mut ProjectContext) {
        context.existing_files = self.existing_files;
        context.dependencies.extend(self.dependencies);
        context.file_types = self.file_types;
        context.entry_points = self.entry_points;
        context.total_files = self.total_files;
        context.total_lines = self.total_lines;
        context.todos = self.todos;
    }
}

/// A decision collaborator's answer. `action` is a raw label and may be
/// outside the set the graph routes on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Decision {
    pub fn new(action: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            reasoning: reasoning.into(),
            confidence: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantTask {
    Implement,
    Test,
    Refactor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantRequest {
    pub task: AssistantTask,
    pub prompt: String,
    pub step: Option<PlanStep>,
    pub project_path: PathBuf,
    pub allowed_tools: Vec<String>,
    pub permission: PermissionMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantReport {
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub tool_uses: Vec<ToolUse>,
    pub raw_log: String,
}

impl AssistantReport {
    pub fn with_log(raw_log: impl Into<String>) -> Self {
        Self {
            raw_log: raw_log.into(),
            ..Self::default()
        }
    }
}

/// Everything the agent nodes call out to
#[derive(Clone)]
pub struct Collaborators {
    pub requirements: Arc<dyn RequirementsAnalyzer>,
    pub project: Arc<dyn ProjectAnalyzer>,
    pub decider: Arc<dyn DecisionMaker>,
    pub planner: Arc<dyn Planner>,
    pub assistant: Arc<dyn CodeAssistant>,
}

impl Collaborators {
    /// Local defaults around a caller-supplied assistant.
    pub fn local(assistant: Arc<dyn CodeAssistant>) -> Self {
        Self {
            requirements: Arc::new(HeuristicRequirements),
            project: Arc::new(FsProjectAnalyzer::default()),
            decider: Arc::new(RuleBasedDecider),
            planner: Arc::new(TemplatePlanner),
            assistant,
        }
    }

    pub fn with_requirements(mut self, requirements: Arc<dyn RequirementsAnalyzer>) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_project(mut self, project: Arc<dyn ProjectAnalyzer>) -> Self {
        self.project = project;
        self
    }

    pub fn with_decider(mut self, decider: Arc<dyn DecisionMaker>) -> Self {
        self.decider = decider;
        self
    }

    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = planner;
        self
    }
}
