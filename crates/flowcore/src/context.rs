//! The shared context every node of a run reads and writes.
//!
//! The key set is fixed by the types below. Nodes grow sequences and maps
//! but never add or remove keys; caller-defined keys live in [`Extensions`],
//! which is sealed when a run starts.

use crate::{ContextError, History, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirements {
    pub main_goal: String,
    pub features: Vec<String>,
    pub constraints: Vec<String>,
    pub suggested_tech: Vec<String>,
    pub deliverables: Vec<String>,
}

impl Requirements {
    pub fn is_empty(&self) -> bool {
        self.main_goal.is_empty() && self.features.is_empty() && self.constraints.is_empty()
    }
}

/// A TODO/FIXME comment found in the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub file: String,
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectContext {
    pub project_path: PathBuf,
    pub existing_files: Vec<String>,
    /// Manifest file name to its path relative to the project root.
    pub dependencies: BTreeMap<String, String>,
    pub file_types: BTreeMap<String, usize>,
    pub entry_points: Vec<String>,
    pub total_files: usize,
    pub total_lines: usize,
    pub todos: Vec<Todo>,
}

impl Default for ProjectContext {
    fn default() -> Self {
        Self {
            project_path: PathBuf::from("."),
            existing_files: Vec::new(),
            dependencies: BTreeMap::new(),
            file_types: BTreeMap::new(),
            entry_points: Vec::new(),
            total_files: 0,
            total_lines: 0,
            todos: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Plan,
    #[default]
    Implement,
    Test,
    Refactor,
}

/// One step of an implementation plan. `name` is the step text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub dependencies: Vec<u32>,
    #[serde(default)]
    pub tools_needed: Vec<String>,
}

impl PlanStep {
    pub fn new(id: u32, name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            kind,
            dependencies: Vec::new(),
            tools_needed: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.dependencies.extend(ids);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tools_needed.extend(tools.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanValidation {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    pub current_step: usize,
    pub validation: PlanValidation,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn current(&self) -> Option<&PlanStep> {
        self.steps.get(self.current_step)
    }

    pub fn remaining(&self) -> usize {
        self.steps.len().saturating_sub(self.current_step)
    }

    pub fn advance(&mut self) {
        self.current_step += 1;
    }
}

/// A tool invocation reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

impl ToolUse {
    /// The `file_path` argument of a file-writing tool, if any.
    pub fn written_file(&self) -> Option<&str> {
        match self.name.as_str() {
            "Write" | "Edit" | "MultiEdit" => self.input.get("file_path")?.as_str(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Implementation {
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub tool_uses: Vec<ToolUse>,
    pub errors: Vec<String>,
}

impl Implementation {
    pub fn is_empty(&self) -> bool {
        self.files_created.is_empty() && self.files_modified.is_empty() && self.tool_uses.is_empty()
    }

    pub fn record_created(&mut self, path: impl Into<String>) {
        push_unique(&mut self.files_created, path.into());
    }

    pub fn record_modified(&mut self, path: impl Into<String>) {
        push_unique(&mut self.files_modified, path.into());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestResults {
    pub success: bool,
    pub errors: Vec<String>,
    pub output: String,
    pub details: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalSummary {
    pub task: String,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub tests_passed: bool,
    pub total_actions: usize,
    pub status: String,
}

/// Caller-declared context slots.
///
/// Keys may only be declared before [`Extensions::seal`]; afterwards only
/// the values of declared keys may change, and a value keeps its kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extensions {
    slots: BTreeMap<String, Value>,
    #[serde(skip)]
    sealed: bool,
}

impl Extensions {
    pub fn declare(&mut self, key: impl Into<String>, initial: impl Into<Value>) -> Result<(), ContextError> {
        let key = key.into();
        if self.sealed && !self.slots.contains_key(&key) {
            return Err(ContextError::Sealed(key));
        }
        self.slots.insert(key, initial.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.slots.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<(), ContextError> {
        let value = value.into();
        let sealed = self.sealed;
        let slot = self
            .slots
            .get_mut(key)
            .ok_or_else(|| ContextError::UnknownKey(key.to_string()))?;

        if sealed && !value.is_null() && !slot.same_kind(&value) {
            return Err(ContextError::TypeMismatch {
                key: key.to_string(),
                expected: slot.kind(),
                actual: value.kind(),
            });
        }
        *slot = value;
        Ok(())
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }
}

/// Mutable aggregate visible to every node during one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedContext {
    pub task: String,
    pub requirements: Requirements,
    pub context: ProjectContext,
    pub plan: Plan,
    pub implementation: Implementation,
    pub test_results: Option<TestResults>,
    pub errors: Vec<String>,
    pub state: String,
    pub current_iteration: u32,
    pub max_iterations: u32,
    pub summary: Option<FinalSummary>,
    history: History,
    extensions: Extensions,
    #[serde(skip)]
    branched_at: Option<BranchPoint>,
}

/// Sequence lengths of a context at the moment it was branched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BranchPoint {
    errors: usize,
    implementation_errors: usize,
    tool_uses: usize,
    history: usize,
}

impl Default for SharedContext {
    fn default() -> Self {
        Self {
            task: String::new(),
            requirements: Requirements::default(),
            context: ProjectContext::default(),
            plan: Plan::default(),
            implementation: Implementation::default(),
            test_results: None,
            errors: Vec::new(),
            state: "initial".to_string(),
            current_iteration: 0,
            max_iterations: 10,
            summary: None,
            history: History::new(),
            extensions: Extensions::default(),
            branched_at: None,
        }
    }
}

impl SharedContext {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Self::default()
        }
    }

    pub fn with_project_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.context.project_path = path.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Append-only access to the audit trail.
    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Freezes the extension key set for the duration of a run.
    pub fn seal(&mut self) {
        self.extensions.seal();
    }

    pub fn set_state(&mut self, state: impl Into<String>) {
        self.state = state.into();
    }

    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Copy of this context that remembers where it diverged, so
    /// [`absorb`](Self::absorb) only takes what the copy added afterwards.
    pub fn branch(&self) -> SharedContext {
        let mut copy = self.clone();
        copy.branched_at = Some(BranchPoint {
            errors: self.errors.len(),
            implementation_errors: self.implementation.errors.len(),
            tool_uses: self.implementation.tool_uses.len(),
            history: self.history.len(),
        });
        copy
    }

    /// Folds a branched copy of this context back in.
    ///
    /// Sequences grow only with entries the branch added after it diverged;
    /// the plan, requirements and scalar fields of `self` are left alone.
    /// A branch not made with [`branch`](Self::branch) is compared against
    /// `self` entry by entry instead.
    pub fn absorb(&mut self, branch: &SharedContext) {
        let point = branch.branched_at.unwrap_or_else(|| BranchPoint {
            errors: shared_prefix(&self.errors, &branch.errors),
            implementation_errors: shared_prefix(
                &self.implementation.errors,
                &branch.implementation.errors,
            ),
            tool_uses: shared_prefix(
                &self.implementation.tool_uses,
                &branch.implementation.tool_uses,
            ),
            history: shared_prefix(self.history.iter(), branch.history.iter()),
        });

        for file in &branch.implementation.files_created {
            self.implementation.record_created(file.clone());
        }
        for file in &branch.implementation.files_modified {
            self.implementation.record_modified(file.clone());
        }
        self.implementation
            .tool_uses
            .extend(branch.implementation.tool_uses.iter().skip(point.tool_uses).cloned());
        self.implementation
            .errors
            .extend(branch.implementation.errors.iter().skip(point.implementation_errors).cloned());
        self.errors.extend(branch.errors.iter().skip(point.errors).cloned());
        for record in branch.history.iter().skip(point.history) {
            self.history.push(record.clone());
        }
    }
}

fn shared_prefix<'a, T, I>(ours: I, theirs: I) -> usize
where
    T: PartialEq + 'a,
    I: IntoIterator<Item = &'a T>,
{
    ours.into_iter()
        .zip(theirs)
        .take_while(|(a, b)| a == b)
        .count()
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ctx = SharedContext::new("build a thing");
        assert_eq!(ctx.state, "initial");
        assert_eq!(ctx.max_iterations, 10);
        assert!(ctx.history().is_empty());
        assert!(ctx.plan.current().is_none());
    }

    #[test]
    fn test_extensions_sealed_schema() {
        let mut ctx = SharedContext::default();
        ctx.extensions_mut().declare("reviewer", "alice").unwrap();
        ctx.seal();

        assert_eq!(
            ctx.extensions_mut().declare("late", 1i64),
            Err(ContextError::Sealed("late".to_string()))
        );
        assert_eq!(
            ctx.extensions_mut().set("missing", true),
            Err(ContextError::UnknownKey("missing".to_string()))
        );
        assert!(matches!(
            ctx.extensions_mut().set("reviewer", 3i64),
            Err(ContextError::TypeMismatch { .. })
        ));

        ctx.extensions_mut().set("reviewer", "bob").unwrap();
        assert_eq!(ctx.extensions().get("reviewer").and_then(Value::as_str), Some("bob"));
    }

    #[test]
    fn test_record_created_dedups() {
        let mut implementation = Implementation::default();
        implementation.record_created("src/main.rs");
        implementation.record_created("src/main.rs");
        assert_eq!(implementation.files_created, vec!["src/main.rs"]);
    }

    fn write_use(path: &str) -> ToolUse {
        ToolUse {
            name: "Write".to_string(),
            input: serde_json::json!({ "file_path": path }),
        }
    }

    #[test]
    fn test_absorb_merges_branch_growth() {
        let mut base = SharedContext::new("task");
        base.implementation.record_created("a.rs");
        base.push_error("pre-existing");
        base.implementation.errors.push("impl-pre".to_string());
        base.implementation.tool_uses.push(write_use("a.rs"));

        let mut branch = base.branch();
        branch.implementation.record_created("a.rs");
        branch.implementation.record_created("b.rs");
        branch.implementation.tool_uses.push(write_use("b.rs"));
        branch.push_error("lint failed");

        base.absorb(&branch);
        assert_eq!(base.implementation.files_created, vec!["a.rs", "b.rs"]);
        assert_eq!(base.errors, vec!["pre-existing", "lint failed"]);
        assert_eq!(base.implementation.errors, vec!["impl-pre"]);
        assert_eq!(
            base.implementation.tool_uses,
            vec![write_use("a.rs"), write_use("b.rs")]
        );
    }

    #[test]
    fn test_absorb_sibling_branches_keep_identical_entries() {
        let mut base = SharedContext::new("task");
        base.push_error("pre-existing");

        let mut first = base.branch();
        first.push_error("lint failed");
        let mut second = base.branch();
        second.push_error("lint failed");

        base.absorb(&first);
        base.absorb(&second);
        assert_eq!(base.errors, vec!["pre-existing", "lint failed", "lint failed"]);
    }

    #[test]
    fn test_absorb_plain_clone_skips_shared_entries() {
        let mut base = SharedContext::new("task");
        base.push_error("pre-existing");
        base.implementation.errors.push("impl-pre".to_string());

        let mut copy = base.clone();
        copy.push_error("branch");

        base.absorb(&copy);
        assert_eq!(base.errors, vec!["pre-existing", "branch"]);
        assert_eq!(base.implementation.errors, vec!["impl-pre"]);
    }

    #[test]
    fn test_tool_use_written_file() {
        let write = ToolUse {
            name: "Write".to_string(),
            input: serde_json::json!({ "file_path": "index.html" }),
        };
        let read = ToolUse {
            name: "Read".to_string(),
            input: serde_json::json!({ "file_path": "index.html" }),
        };
        assert_eq!(write.written_file(), Some("index.html"));
        assert_eq!(read.written_file(), None);
    }
}
