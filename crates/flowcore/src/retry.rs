use crate::WorkflowError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for a node's execute phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub wait_ms: u64,
    /// `1.0` keeps the wait fixed between attempts.
    pub backoff_multiplier: f64,
    pub max_wait_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            wait_ms: 0,
            backoff_multiplier: 1.0,
            max_wait_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Fixed-interval policy.
    pub fn new(max_attempts: u32, wait: Duration) -> Self {
        Self {
            max_attempts,
            wait_ms: wait.as_millis() as u64,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait_ms = Some(max_wait.as_millis() as u64);
        self
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let scaled = self.wait_ms as f64 * self.backoff_multiplier.powi(exponent);
        let mut millis = if scaled.is_finite() { scaled as u64 } else { u64::MAX };
        if let Some(cap) = self.max_wait_ms {
            millis = millis.min(cap);
        }
        Duration::from_millis(millis)
    }

    pub fn validate(&self, node: &str) -> Result<(), WorkflowError> {
        if self.max_attempts == 0 {
            return Err(WorkflowError::InvalidRetryPolicy {
                node: node.to_string(),
                reason: "max_attempts must be at least 1".to_string(),
            });
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(WorkflowError::InvalidRetryPolicy {
                node: node.to_string(),
                reason: format!("backoff_multiplier must be >= 1.0, got {}", self.backoff_multiplier),
            });
        }
        Ok(())
    }
}
