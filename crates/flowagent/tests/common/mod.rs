// crates/flowagent/tests/common/mod.rs

#![allow(dead_code)]

use async_trait::async_trait;
use flowagent::{AssistantReport, AssistantRequest, AssistantTask, CodeAssistant, Decision, DecisionMaker};
use flowcore::{NodeError, SharedContext, ToolUse};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Writes one file per implement call and answers test runs from a script,
/// repeating the last log.
pub struct ScriptedAssistant {
    test_logs: Vec<&'static str>,
    implement_delay: Option<Duration>,
    pub calls: Arc<Mutex<Vec<AssistantTask>>>,
}

impl ScriptedAssistant {
    pub fn passing() -> Self {
        Self::with_test_logs(&["2 tests ran, all ok"])
    }

    pub fn with_test_logs(logs: &[&'static str]) -> Self {
        Self {
            test_logs: logs.to_vec(),
            implement_delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn slow_implement(mut self, delay: Duration) -> Self {
        self.implement_delay = Some(delay);
        self
    }

    pub fn count(&self, task: AssistantTask) -> usize {
        self.calls.lock().unwrap().iter().filter(|t| **t == task).count()
    }
}

#[async_trait]
impl CodeAssistant for ScriptedAssistant {
    async fn run(&self, request: AssistantRequest) -> Result<AssistantReport, NodeError> {
        let nth = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.task);
            calls.iter().filter(|t| **t == request.task).count()
        };

        match request.task {
            AssistantTask::Implement => {
                if let Some(delay) = self.implement_delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(AssistantReport {
                    tool_uses: vec![ToolUse {
                        name: "Write".to_string(),
                        input: json!({ "file_path": format!("src/step_{}.py", nth) }),
                    }],
                    raw_log: "wrote file".to_string(),
                    ..AssistantReport::default()
                })
            }
            AssistantTask::Test => {
                let log = self
                    .test_logs
                    .get(nth - 1)
                    .or(self.test_logs.last())
                    .copied()
                    .unwrap_or_default();
                Ok(AssistantReport::with_log(log))
            }
            AssistantTask::Refactor => Ok(AssistantReport {
                files_modified: vec!["src/step_1.py".to_string()],
                raw_log: "cleaned up".to_string(),
                ..AssistantReport::default()
            }),
        }
    }
}

/// Always answers with the same label.
pub struct FixedDecider(pub &'static str);

#[async_trait]
impl DecisionMaker for FixedDecider {
    async fn decide(&self, _ctx: &SharedContext) -> Result<Decision, NodeError> {
        Ok(Decision::new(self.0, "scripted"))
    }
}

/// Fails every call.
#[derive(Default)]
pub struct BrokenDecider {
    pub calls: AtomicUsize,
}

#[async_trait]
impl DecisionMaker for BrokenDecider {
    async fn decide(&self, _ctx: &SharedContext) -> Result<Decision, NodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NodeError::execution("model unavailable"))
    }
}
