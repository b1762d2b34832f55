use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tool-permission mode handed to the code assistant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionMode {
    #[default]
    Ask,
    AcceptEdits,
    DenyEdits,
}

impl PermissionMode {
    pub fn allows_edits(self) -> bool {
        !matches!(self, PermissionMode::DenyEdits)
    }
}

/// Settings for the coding-agent nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub requirements_timeout_secs: u64,
    pub decision_timeout_secs: u64,
    pub plan_timeout_secs: u64,
    pub implement_timeout_secs: u64,
    pub test_timeout_secs: u64,
    pub refactor_timeout_secs: u64,

    /// Plan decisions allowed before the decision node moves on to implementing
    pub max_plan_attempts: usize,
    pub max_plan_steps: usize,

    pub implement_permission: PermissionMode,
    pub test_permission: PermissionMode,
    pub refactor_permission: PermissionMode,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            requirements_timeout_secs: 60,
            decision_timeout_secs: 60,
            plan_timeout_secs: 120,
            implement_timeout_secs: 300,
            test_timeout_secs: 180,
            refactor_timeout_secs: 240,
            max_plan_attempts: 3,
            max_plan_steps: 10,
            implement_permission: PermissionMode::AcceptEdits,
            test_permission: PermissionMode::Ask,
            refactor_permission: PermissionMode::AcceptEdits,
        }
    }
}

impl AgentConfig {
    pub fn from_json(json: &str) -> flowcore::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON config file; missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> flowcore::Result<Self> {
        let path = path.as_ref();
        let config = Self::from_json(&std::fs::read_to_string(path)?)?;
        tracing::debug!(path = %path.display(), "Loaded agent config");
        Ok(config)
    }

    pub fn implement_timeout(&self) -> Duration {
        Duration::from_secs(self.implement_timeout_secs)
    }
}
