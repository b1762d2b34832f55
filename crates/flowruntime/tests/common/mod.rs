// crates/flowruntime/tests/common/mod.rs

#![allow(dead_code)]

use async_trait::async_trait;
use flowcore::{Action, BlockingNode, ExecScope, Node, NodeError, SharedContext, ToolUse, Transition};
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

/// Emits the scripted actions in order, repeating the last one.
pub struct Scripted {
    name: &'static str,
    script: Vec<&'static str>,
    pub calls: Arc<AtomicUsize>,
}

impl Scripted {
    pub fn new(name: &'static str, script: &[&'static str]) -> Self {
        Self {
            name,
            script: script.to_vec(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always finalizes without choosing an action.
    pub fn silent(name: &'static str) -> Self {
        Self::new(name, &[])
    }
}

#[async_trait]
impl Node for Scripted {
    type Prep = ();
    type Exec = usize;

    fn name(&self) -> &str {
        self.name
    }

    async fn prepare(&self, _ctx: &SharedContext) -> Result<(), NodeError> {
        Ok(())
    }

    async fn execute(&self, _prep: &(), _scope: &ExecScope) -> Result<usize, NodeError> {
        Ok(self.calls.fetch_add(1, Ordering::SeqCst))
    }

    async fn finalize(&self, ctx: &mut SharedContext, _prep: (), call: usize) -> Result<Transition, NodeError> {
        ctx.set_state(format!("{}-{}", self.name, call));
        let Some(last) = self.script.last() else {
            return Ok(Transition::default());
        };
        let label = self.script.get(call).unwrap_or(last);
        Ok(Transition::to(Action::from_static(*label)))
    }
}

/// Fails every execute attempt; counts attempts and finalize calls.
pub struct AlwaysFails {
    pub attempts: Arc<AtomicUsize>,
    pub finalized: Arc<AtomicUsize>,
}

impl AlwaysFails {
    pub fn new() -> Self {
        Self {
            attempts: Arc::new(AtomicUsize::new(0)),
            finalized: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Node for AlwaysFails {
    type Prep = ();
    type Exec = ();

    fn name(&self) -> &str {
        "always-fails"
    }

    async fn prepare(&self, _ctx: &SharedContext) -> Result<(), NodeError> {
        Ok(())
    }

    async fn execute(&self, _prep: &(), scope: &ExecScope) -> Result<(), NodeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NodeError::execution(format!("boom on attempt {}", scope.attempt)))
    }

    async fn finalize(&self, _ctx: &mut SharedContext, _prep: (), _exec: ()) -> Result<Transition, NodeError> {
        self.finalized.fetch_add(1, Ordering::SeqCst);
        Ok(Transition::default())
    }
}

/// Waits for cancellation or `duration`, whichever comes first.
pub struct Sleeper {
    pub duration: Duration,
}

#[async_trait]
impl Node for Sleeper {
    type Prep = ();
    type Exec = ();

    fn name(&self) -> &str {
        "sleeper"
    }

    async fn prepare(&self, _ctx: &SharedContext) -> Result<(), NodeError> {
        Ok(())
    }

    async fn execute(&self, _prep: &(), scope: &ExecScope) -> Result<(), NodeError> {
        tokio::select! {
            _ = scope.cancellation.cancelled() => Err(NodeError::Cancelled),
            _ = tokio::time::sleep(self.duration) => Ok(()),
        }
    }

    async fn finalize(&self, _ctx: &mut SharedContext, _prep: (), _exec: ()) -> Result<Transition, NodeError> {
        Ok(Transition::default())
    }
}

/// Batch worker. The item is written into `task` as `"<name>:<delay_ms>"`;
/// a name of `fail` fails every attempt.
pub struct Worker {
    pub log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Node for Worker {
    type Prep = (String, u64);
    type Exec = String;

    fn name(&self) -> &str {
        "worker"
    }

    async fn prepare(&self, ctx: &SharedContext) -> Result<(String, u64), NodeError> {
        let (name, delay) = ctx
            .task
            .split_once(':')
            .ok_or_else(|| NodeError::MissingInput("task".to_string()))?;
        let delay = delay.parse().map_err(|_| NodeError::InvalidInput {
            field: "task".to_string(),
            reason: "delay is not a number".to_string(),
        })?;
        Ok((name.to_string(), delay))
    }

    async fn execute(&self, prep: &(String, u64), _scope: &ExecScope) -> Result<String, NodeError> {
        tokio::time::sleep(Duration::from_millis(prep.1)).await;
        if prep.0 == "fail" {
            return Err(NodeError::execution("item rejected"));
        }
        self.log.lock().unwrap().push(prep.0.clone());
        Ok(format!("{}.out", prep.0))
    }

    async fn finalize(&self, ctx: &mut SharedContext, _prep: (String, u64), file: String) -> Result<Transition, NodeError> {
        ctx.implementation.tool_uses.push(ToolUse {
            name: "Write".to_string(),
            input: serde_json::json!({ "file_path": &file }),
        });
        ctx.implementation.record_created(file);
        Ok(Transition::default())
    }
}

/// Synchronous node that counts characters of the task.
pub struct CountTask;

impl BlockingNode for CountTask {
    type Prep = String;
    type Exec = usize;

    fn name(&self) -> &str {
        "count-task"
    }

    fn prepare(&self, ctx: &SharedContext) -> Result<String, NodeError> {
        if ctx.task.is_empty() {
            return Err(NodeError::preparation("task is empty"));
        }
        Ok(ctx.task.clone())
    }

    fn execute(&self, task: &String, _scope: &ExecScope) -> Result<usize, NodeError> {
        Ok(task.chars().count())
    }

    fn finalize(&self, ctx: &mut SharedContext, _prep: String, count: usize) -> Result<Transition, NodeError> {
        ctx.set_state(format!("counted-{}", count));
        Ok(Transition::default().with_summary(format!("task has {} chars", count)))
    }
}
