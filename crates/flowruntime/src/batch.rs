//! One sub-flow per input item, sequentially or with bounded concurrency.

use crate::{Flow, FlowRun, RunConfig};
use flowcore::{FlowError, SharedContext};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BatchMode {
    Sequential,
    Concurrent { limit: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub mode: BatchMode,
    /// Stop launching new items after the first failure. Items already
    /// running are left to finish.
    pub fail_fast: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            mode: BatchMode::Sequential,
            fail_fast: false,
        }
    }
}

impl BatchConfig {
    pub fn concurrent(limit: usize) -> Self {
        Self {
            mode: BatchMode::Concurrent { limit },
            ..Self::default()
        }
    }

    fn limit(&self) -> usize {
        match self.mode {
            BatchMode::Sequential => 1,
            BatchMode::Concurrent { limit } => limit.max(1),
        }
    }
}

/// Outcome of one item's sub-flow
#[derive(Debug)]
pub enum ItemOutcome {
    Succeeded(FlowRun),
    Failed(FlowError),
    /// Never started, because an earlier item failed under `fail_fast`.
    Skipped,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Succeeded(_))
    }

    pub fn run(&self) -> Option<&FlowRun> {
        match self {
            ItemOutcome::Succeeded(run) => Some(run),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FlowError> {
        match self {
            ItemOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Per-item outcomes, in input order
#[derive(Debug)]
pub struct BatchReport {
    pub items: Vec<ItemOutcome>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn all_succeeded(&self) -> bool {
        self.items.iter().all(ItemOutcome::is_success)
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| matches!(item, ItemOutcome::Failed(_)))
            .map(|(index, _)| index)
            .collect()
    }

    /// Folds every successful item's context into `base`, in input order.
    pub fn merge_into(&self, base: &mut SharedContext) {
        self.merge_with(base, |base, run| base.absorb(&run.context));
    }

    pub fn merge_with<F>(&self, base: &mut SharedContext, mut merge: F)
    where
        F: FnMut(&mut SharedContext, &FlowRun),
    {
        for run in self.items.iter().filter_map(ItemOutcome::run) {
            merge(base, run);
        }
    }
}

/// Runs one instance of a flow per input item.
///
/// Each item gets its own copy of the base context; instances never share a
/// mutable context. Results are merged only through [`BatchReport`].
pub struct BatchFlow<'f> {
    flow: &'f Flow,
    config: BatchConfig,
    run_config: RunConfig,
}

impl<'f> BatchFlow<'f> {
    pub fn new(flow: &'f Flow, config: BatchConfig) -> Self {
        Self {
            flow,
            config,
            run_config: RunConfig::default(),
        }
    }

    pub fn with_run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = run_config;
        self
    }

    pub async fn run<I, F>(&self, base: &SharedContext, inputs: Vec<I>, seed: F) -> BatchReport
    where
        F: FnMut(&mut SharedContext, I),
    {
        self.run_with_cancel(base, inputs, seed, CancellationToken::new()).await
    }

    /// `seed` writes one input item into that item's copy of `base`.
    pub async fn run_with_cancel<I, F>(
        &self,
        base: &SharedContext,
        inputs: Vec<I>,
        mut seed: F,
        cancel: CancellationToken,
    ) -> BatchReport
    where
        F: FnMut(&mut SharedContext, I),
    {
        let total = inputs.len();
        let limit = self.config.limit();
        let flow = self.flow;
        let run_config = &self.run_config;

        tracing::info!(
            flow = flow.name(),
            items = total,
            limit,
            "Starting batch"
        );

        let mut slots: Vec<Option<ItemOutcome>> = (0..total).map(|_| None).collect();
        let mut pending = inputs.into_iter().enumerate();
        let mut running = FuturesUnordered::new();
        let mut halted = false;

        loop {
            while !halted && running.len() < limit {
                let Some((index, item)) = pending.next() else {
                    break;
                };
                let mut ctx = base.branch();
                seed(&mut ctx, item);
                let token = cancel.child_token();
                running.push(async move { (index, flow.run_with_cancel(ctx, run_config, token).await) });
            }

            let Some((index, result)) = running.next().await else {
                break;
            };

            let outcome = match result {
                Ok(run) => ItemOutcome::Succeeded(run),
                Err(error) => {
                    tracing::warn!(flow = flow.name(), index, "Batch item failed: {}", error);
                    if self.config.fail_fast {
                        halted = true;
                    }
                    ItemOutcome::Failed(error)
                }
            };
            slots[index] = Some(outcome);
        }

        let items: Vec<ItemOutcome> = slots
            .into_iter()
            .map(|slot| slot.unwrap_or(ItemOutcome::Skipped))
            .collect();

        tracing::info!(
            flow = flow.name(),
            succeeded = items.iter().filter(|i| i.is_success()).count(),
            items = total,
            "Batch finished"
        );

        BatchReport { items }
    }
}
