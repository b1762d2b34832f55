use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Symbolic label a node emits to select its outgoing edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(Cow<'static, str>);

impl Action {
    /// Emitted when finalize does not choose an action.
    pub const DEFAULT: Action = Action(Cow::Borrowed("default"));

    pub fn new(label: impl Into<Cow<'static, str>>) -> Self {
        Self(label.into())
    }

    pub const fn from_static(label: &'static str) -> Self {
        Self(Cow::Borrowed(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.as_str() == "default"
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::DEFAULT
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Action {
    fn from(label: &'static str) -> Self {
        Action::from_static(label)
    }
}

impl From<String> for Action {
    fn from(label: String) -> Self {
        Action(Cow::Owned(label))
    }
}

/// A closed set of actions valid at one decision point.
///
/// Declaring a node with an `ActionSet` lets the flow builder check that
/// every member has an edge and that no edge uses a label outside the set.
pub trait ActionSet: Copy + Send + Sync + 'static {
    const ALL: &'static [Self];

    fn label(self) -> &'static str;

    fn action(self) -> Action {
        Action::from_static(self.label())
    }

    fn parse(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.label() == label)
    }

    fn actions() -> Vec<Action> {
        Self::ALL.iter().map(|a| a.action()).collect()
    }
}
