//! The coding-agent nodes.

mod analyze;
mod create_plan;
mod decide;
mod finalize;
mod implement;
mod refactor;
mod understand;

pub use analyze::AnalyzeContext;
pub use create_plan::CreatePlan;
pub use decide::{DecideAction, Step};
pub use finalize::FinalizeProject;
pub use implement::{ImplementCode, ImplementOutcome};
pub use refactor::RefactorCode;
pub use run_tests::{suggested_test_commands, TestImplementation};
pub use understand::UnderstandRequirements;

use flowcore::{ExecScope, NodeError};
use std::future::Future;
use std::time::Duration;

/// Runs a collaborator call under a per-call timeout, giving up early if
/// the run is cancelled.
pub(crate) async fn call_with_timeout<T, F>(
    seconds: u64,
    scope: &ExecScope,
    call: F,
) -> Result<T, NodeError>
where
    F: Future<Output = Result<T, NodeError>>,
{
    tokio::select! {
        _ = scope.cancellation.cancelled() => Err(NodeError::Cancelled),
        result = tokio::time::timeout(Duration::from_secs(seconds), call) => {
            result.map_err(|_| NodeError::Timeout { seconds })?
        }
    }
}
