//! In-process collaborators that need no external service.

use crate::collaborators::{
    Decision, DecisionMaker, Planner, ProjectAnalyzer, ProjectSnapshot, RequirementsAnalyzer,
};
use crate::plan::default_plan;
use async_trait::async_trait;
use flowcore::{NodeError, PlanStep, ProjectContext, Requirements, SharedContext, Todo};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

const CONSTRAINT_WORDS: &[&str] = &["must", "should", "without", "only"];

/// Line-based requirement extraction.
///
/// The first non-empty line is the goal, bullet lines are features and
/// lines phrased as obligations are constraints.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicRequirements;

#[async_trait]
impl RequirementsAnalyzer for HeuristicRequirements {
    async fn understand(&self, task: &str) -> Result<Requirements, NodeError> {
        let mut lines = task.lines().map(str::trim).filter(|l| !l.is_empty());
        let main_goal = lines
            .next()
            .ok_or_else(|| NodeError::preparation("task description is empty"))?
            .to_string();

        let mut requirements = Requirements {
            main_goal,
            ..Requirements::default()
        };
        for line in lines {
            if let Some(item) = strip_bullet(line) {
                requirements.features.push(item.to_string());
            } else {
                let lower = line.to_lowercase();
                if lower
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|w| CONSTRAINT_WORDS.contains(&w))
                {
                    requirements.constraints.push(line.to_string());
                }
            }
        }
        Ok(requirements)
    }
}

fn strip_bullet(line: &str) -> Option<&str> {
    let item = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| {
            let digits = line.find(|c: char| !c.is_ascii_digit())?;
            if digits == 0 {
                return None;
            }
            line[digits..].strip_prefix(". ")
        })?;
    let item = item.trim();
    (!item.is_empty()).then_some(item)
}

const SKIP_DIRS: &[&str] = &["node_modules", "__pycache__", "venv", "env", "target"];
const ENTRY_POINTS: &[&str] = &[
    "main.py", "app.py", "index.js", "main.js", "index.ts", "main.ts", "main.rs", "lib.rs",
];
const MANIFESTS: &[&str] = &[
    "requirements.txt",
    "package.json",
    "Cargo.toml",
    "go.mod",
    "pom.xml",
];

/// Walks the project tree with `walkdir`, skipping hidden entries and
/// dependency or build directories.
#[derive(Debug, Clone)]
pub struct FsProjectAnalyzer {
    skip_dirs: Vec<String>,
}

impl Default for FsProjectAnalyzer {
    fn default() -> Self {
        Self {
            skip_dirs: SKIP_DIRS.iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl FsProjectAnalyzer {
    pub fn skip_dir(mut self, name: impl Into<String>) -> Self {
        self.skip_dirs.push(name.into());
        self
    }

    fn keep(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            return false;
        }
        !(entry.file_type().is_dir() && self.skip_dirs.iter().any(|d| *d == name))
    }
}

impl ProjectAnalyzer for FsProjectAnalyzer {
    fn analyze(&self, path: &Path) -> ProjectSnapshot {
        let mut snapshot = ProjectSnapshot::default();
        if !path.is_dir() {
            debug!("Project path {} does not exist, nothing to scan", path.display());
            return snapshot;
        }

        let walker = WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.keep(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(path)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let name = entry.file_name().to_string_lossy().into_owned();

            if let Some(ext) = entry.path().extension() {
                *snapshot
                    .file_types
                    .entry(format!(".{}", ext.to_string_lossy()))
                    .or_insert(0) += 1;
            }
            if ENTRY_POINTS.contains(&name.as_str()) {
                snapshot.entry_points.push(relative.clone());
            }
            if MANIFESTS.contains(&name.as_str()) {
                snapshot
                    .dependencies
                    .entry(name.clone())
                    .or_insert_with(|| relative.clone());
            }

            // Binary files contribute to the file count only.
            if let Ok(text) = std::fs::read_to_string(entry.path()) {
                for (n, line) in text.lines().enumerate() {
                    snapshot.total_lines += 1;
                    if line.contains("TODO") || line.contains("FIXME") {
                        snapshot.todos.push(Todo {
                            file: relative.clone(),
                            line: n + 1,
                            text: line.trim().to_string(),
                        });
                    }
                }
            }

            snapshot.existing_files.push(relative);
            snapshot.total_files += 1;
        }

        debug!(
            "Scanned {}: {} files, {} lines",
            path.display(),
            snapshot.total_files,
            snapshot.total_lines
        );
        snapshot
    }
}

/// Fixed decision rules over the context snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedDecider;

impl RuleBasedDecider {
    pub fn choose(&self, ctx: &SharedContext) -> Decision {
        if ctx.plan.is_empty() {
            return Decision::new("plan", "No plan exists yet");
        }
        if !ctx.errors.is_empty() && ctx.state != "refactored" {
            return Decision::new("refactor", "Errors need to be addressed");
        }
        if ctx.plan.remaining() > 0 {
            return Decision::new("implement", "Plan steps remain");
        }
        if ctx.state == "refactored" {
            return Decision::new("test", "Verify the refactored code");
        }
        match &ctx.test_results {
            None => Decision::new("test", "Implementation has not been tested"),
            Some(_) if ctx.state == "implementing" => {
                Decision::new("test", "Implementation changed since the last test run")
            }
            Some(results) if !results.success => {
                Decision::new("refactor", "Tests are failing")
            }
            Some(_) => Decision::new("complete", "All steps implemented and tests pass"),
        }
    }
}

#[async_trait]
impl DecisionMaker for RuleBasedDecider {
    async fn decide(&self, ctx: &SharedContext) -> Result<Decision, NodeError> {
        Ok(self.choose(ctx))
    }
}

/// Always answers with the default five-step plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplatePlanner;

#[async_trait]
impl Planner for TemplatePlanner {
    async fn plan(
        &self,
        task: &str,
        _requirements: &Requirements,
        _context: &ProjectContext,
        max_steps: usize,
    ) -> Result<Vec<PlanStep>, NodeError> {
        let mut steps = default_plan(task);
        steps.truncate(max_steps.max(1));
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcore::TestResults;
    use std::fs;

    #[tokio::test]
    async fn test_requirements_from_task_text() {
        let task = "Build a todo CLI\n\n- add items\n* list items\n2. remove items\nIt must run offline.\nNice to have colors.";
        let req = HeuristicRequirements.understand(task).await.unwrap();
        assert_eq!(req.main_goal, "Build a todo CLI");
        assert_eq!(req.features, vec!["add items", "list items", "remove items"]);
        assert_eq!(req.constraints, vec!["It must run offline."]);
    }

    #[tokio::test]
    async fn test_empty_task_is_a_preparation_error() {
        let err = HeuristicRequirements.understand("  \n ").await.unwrap_err();
        assert!(matches!(err, NodeError::Preparation(_)));
    }

    #[test]
    fn test_scan_project_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {\n    // TODO: args\n}\n").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "x\n").unwrap();
        fs::write(root.join(".git/HEAD"), "ref\n").unwrap();

        let snapshot = FsProjectAnalyzer::default().analyze(root);
        assert_eq!(snapshot.existing_files, vec!["Cargo.toml", "src/main.rs"]);
        assert_eq!(snapshot.total_files, 2);
        assert_eq!(snapshot.total_lines, 5);
        assert_eq!(snapshot.entry_points, vec!["src/main.rs"]);
        assert_eq!(snapshot.dependencies.get("Cargo.toml").map(String::as_str), Some("Cargo.toml"));
        assert_eq!(snapshot.file_types.get(".rs"), Some(&1));
        assert_eq!(snapshot.file_types.get(".toml"), Some(&1));
        assert_eq!(snapshot.todos.len(), 1);
        assert_eq!(snapshot.todos[0].file, "src/main.rs");
        assert_eq!(snapshot.todos[0].line, 2);
        assert_eq!(snapshot.todos[0].text, "// TODO: args");
    }

    #[test]
    fn test_missing_path_scans_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = FsProjectAnalyzer::default().analyze(&dir.path().join("nope"));
        assert_eq!(snapshot, ProjectSnapshot::default());
    }

    #[test]
    fn test_decision_rules() {
        let decider = RuleBasedDecider;
        let mut ctx = SharedContext::new("task");
        assert_eq!(decider.choose(&ctx).action, "plan");

        ctx.plan.steps = default_plan("task");
        assert_eq!(decider.choose(&ctx).action, "implement");

        ctx.push_error("boom");
        assert_eq!(decider.choose(&ctx).action, "refactor");

        ctx.set_state("refactored");
        ctx.plan.current_step = ctx.plan.steps.len();
        assert_eq!(decider.choose(&ctx).action, "test");

        ctx.errors.clear();
        ctx.set_state("tested");
        ctx.test_results = Some(TestResults::default());
        assert_eq!(decider.choose(&ctx).action, "refactor");

        ctx.test_results = Some(TestResults {
            success: true,
            ..TestResults::default()
        });
        assert_eq!(decider.choose(&ctx).action, "complete");

        ctx.set_state("implementing");
        assert_eq!(decider.choose(&ctx).action, "test");
    }
}
