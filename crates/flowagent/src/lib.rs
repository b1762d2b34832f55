//! A coding agent expressed as a flow graph.
//!
//! The agent decides, plans, implements, tests and refactors in a loop
//! until the decision node completes. Every outside system it talks to sits
//! behind a trait in [`collaborators`]; [`local`] provides deterministic
//! in-process defaults for all of them except the code assistant.

pub mod collaborators;
mod config;
pub mod flows;
pub mod local;
pub mod nodes;
pub mod plan;

pub use collaborators::{
    AssistantReport, AssistantRequest, AssistantTask, CodeAssistant, Collaborators, Decision,
    DecisionMaker, Planner, ProjectAnalyzer, ProjectSnapshot, RequirementsAnalyzer,
};
pub use config::{AgentConfig, PermissionMode};
pub use flows::{
    advanced_coding_flow, coding_agent_flow, flow_for_complexity, iterative_coding_flow,
    simple_coding_flow,
};
pub use local::{FsProjectAnalyzer, HeuristicRequirements, RuleBasedDecider, TemplatePlanner};
pub use nodes::Step;
pub use plan::{
    default_plan, estimate_complexity, prioritize_steps, validate_plan, Complexity,
    ComplexityEstimate,
};
