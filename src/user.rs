//! Per-user state: the variable store, the active scenario's failure policy,
//! and the response observers registered on the user.
//!
//! Each simulated user owns its own [`User`]; nothing in here is shared
//! between users, so writes need no synchronization.

use crate::dispatcher::ResponseEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Per-user mapping from variable name to its current value.
///
/// A variable can hold `None`, which is what a failed save writes so that
/// later templates never observe a stale value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables {
    values: HashMap<String, Option<String>>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, always overwriting the previous one.
    pub fn set(&mut self, name: impl Into<String>, value: Option<String>) {
        self.values.insert(name.into(), value);
    }

    /// Current value of a variable; `None` when unset or set to `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_deref())
    }

    /// Whether the variable exists, even if its value is `None`.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<String>)> {
        self.values.iter()
    }
}

impl FromIterator<(String, Option<String>)> for Variables {
    fn from_iter<I: IntoIterator<Item = (String, Option<String>)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// What the request loop should do when a response handler fails.
///
/// The handlers themselves never act on this; they always return the error
/// and leave the decision to the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    /// Log and carry on with the next request
    #[default]
    Continue,

    /// Run the failed request again
    RetryTask,

    /// Abort the current iteration and start the scenario over
    RestartScenario,

    /// Stop the user entirely
    StopUser,
}

/// A simulated user as seen by the response handlers.
pub struct User {
    name: String,
    scenario: String,
    failure_action: FailureAction,
    variables: Variables,
    observers: Vec<Arc<dyn ResponseEvent>>,
}

impl User {
    pub fn new(name: impl Into<String>, scenario: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scenario: scenario.into(),
            failure_action: FailureAction::default(),
            variables: Variables::new(),
            observers: Vec::new(),
        }
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_failure_action(mut self, failure_action: FailureAction) -> Self {
        self.failure_action = failure_action;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the currently active scenario.
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn failure_action(&self) -> FailureAction {
        self.failure_action
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Store a variable for use in subsequent templates.
    pub fn set_context_variable(&mut self, name: &str, value: Option<String>) {
        self.variables.set(name, value);
    }

    /// Register a response observer. Observers are notified in registration order.
    pub fn add_observer(&mut self, observer: Arc<dyn ResponseEvent>) {
        self.observers.push(observer);
    }

    pub fn observers(&self) -> &[Arc<dyn ResponseEvent>] {
        &self.observers
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("name", &self.name)
            .field("scenario", &self.scenario)
            .field("failure_action", &self.failure_action)
            .field("variables", &self.variables)
            .field(
                "observers",
                &self.observers.iter().map(|o| o.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
