use crate::collaborators::{ProjectAnalyzer, ProjectSnapshot};
use flowcore::{BlockingNode, ExecScope, NodeError, SharedContext, Transition};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Scans the project directory into `context`.
pub struct AnalyzeContext {
    analyzer: Arc<dyn ProjectAnalyzer>,
}

impl AnalyzeContext {
    pub fn new(analyzer: Arc<dyn ProjectAnalyzer>) -> Self {
        Self { analyzer }
    }
}

impl BlockingNode for AnalyzeContext {
    type Prep = PathBuf;
    type Exec = ProjectSnapshot;

    fn name(&self) -> &str {
        "analyze_context"
    }

    fn prepare(&self, ctx: &SharedContext) -> Result<PathBuf, NodeError> {
        Ok(ctx.context.project_path.clone())
    }

    fn execute(&self, path: &PathBuf, _scope: &ExecScope) -> Result<ProjectSnapshot, NodeError> {
        Ok(self.analyzer.analyze(path))
    }

    fn finalize(
        &self,
        ctx: &mut SharedContext,
        path: PathBuf,
        snapshot: ProjectSnapshot,
    ) -> Result<Transition, NodeError> {
        let summary = format!(
            "{} files, {} lines",
            snapshot.total_files, snapshot.total_lines
        );
        info!("Analyzed {}: {}", path.display(), summary);
        if !snapshot.entry_points.is_empty() {
            info!("Entry points: {}", snapshot.entry_points.join(", "));
        }
        snapshot.apply_to(&mut ctx.context);
        ctx.set_state("context_analyzed");
        Ok(Transition::default().with_summary(summary))
    }
}
