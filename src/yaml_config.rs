//! YAML test plan support.
//!
//! A test plan declares one scenario: its variables, its requests, and the
//! save/validate handlers attached to each request. Loading a plan builds a
//! [`Scenario`], so declaration mistakes surface at load time.
//!
//! ```yaml
//! version: "1.0"
//! scenario:
//!   name: checkout
//!   failure: stop_user
//!   variables:
//!     token: null
//!   requests:
//!     - name: login
//!       endpoint: /api/login
//!       contentType: json
//!       statusCodes: [201, -200]
//!       handlers:
//!         - type: save
//!           variable: token
//!           expression: "$.token"
//!         - type: validate
//!           condition: true
//!           expression: "$.status"
//!           matchWith: "error"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::content_type::ContentType;
use crate::errors::ConfigError;
use crate::handler::HandlerAction;
use crate::request::{HandlerType, RequestTask};
use crate::scenario::Scenario;
use crate::transformer::TransformerRegistry;
use crate::user::FailureAction;

const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// Errors that can occur when loading or parsing a YAML test plan.
#[derive(Error, Debug)]
pub enum YamlConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Invalid handler on request '{request}': {source}")]
    Handler {
        request: String,
        #[source]
        source: ConfigError,
    },
}

/// Expected match count: a number or a template such as "{{ count }}".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YamlExpectedMatches {
    Count(i64),
    Template(String),
}

impl YamlExpectedMatches {
    pub fn to_template(&self) -> String {
        match self {
            YamlExpectedMatches::Count(n) => n.to_string(),
            YamlExpectedMatches::Template(s) => s.clone(),
        }
    }
}

impl Default for YamlExpectedMatches {
    fn default() -> Self {
        YamlExpectedMatches::Count(1)
    }
}

/// Which part of the response a handler reads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum YamlHandlerTarget {
    #[default]
    Payload,
    Metadata,
}

impl From<YamlHandlerTarget> for HandlerType {
    fn from(target: YamlHandlerTarget) -> Self {
        match target {
            YamlHandlerTarget::Payload => HandlerType::Payload,
            YamlHandlerTarget::Metadata => HandlerType::Metadata,
        }
    }
}

/// Handler definition in YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum YamlHandler {
    Save {
        variable: String,

        #[serde(flatten)]
        matcher: YamlMatcher,
    },
    Validate {
        condition: bool,

        #[serde(flatten)]
        matcher: YamlMatcher,
    },
}

/// Fields shared by save and validate handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlMatcher {
    #[serde(default)]
    pub target: YamlHandlerTarget,

    pub expression: String,

    #[serde(rename = "matchWith", default = "default_match_with")]
    pub match_with: String,

    #[serde(rename = "expectedMatches", default)]
    pub expected_matches: YamlExpectedMatches,

    #[serde(rename = "asJson", default)]
    pub as_json: bool,
}

fn default_match_with() -> String {
    ".*".to_string()
}

impl YamlMatcher {
    fn to_action(&self) -> HandlerAction {
        HandlerAction::new(self.expression.clone(), self.match_with.clone())
            .with_expected_matches(self.expected_matches.to_template())
            .with_as_json(self.as_json)
    }
}

/// Request definition in YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlRequest {
    pub name: String,

    #[serde(default)]
    pub endpoint: String,

    /// Short name ("json") or MIME type ("application/json")
    #[serde(rename = "contentType", default = "default_content_type")]
    pub content_type: String,

    /// Changes to the default accepted status codes; negative codes remove
    #[serde(rename = "statusCodes", default)]
    pub status_codes: Vec<i32>,

    #[serde(default)]
    pub handlers: Vec<YamlHandler>,
}

fn default_content_type() -> String {
    "undefined".to_string()
}

/// Scenario definition in YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlScenario {
    pub name: String,

    #[serde(default)]
    pub failure: FailureAction,

    /// Declared variables and their initial values (null for none)
    #[serde(default)]
    pub variables: BTreeMap<String, serde_yaml::Value>,

    pub requests: Vec<YamlRequest>,
}

/// Root YAML test plan structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlConfig {
    pub version: String,

    pub scenario: YamlScenario,
}

impl YamlConfig {
    /// Load a test plan from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, YamlConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a test plan from a YAML string.
    pub fn from_str(content: &str) -> Result<Self, YamlConfigError> {
        let config: YamlConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), YamlConfigError> {
        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            return Err(YamlConfigError::Validation(format!(
                "Unsupported version '{}', expected one of {:?}",
                self.version, SUPPORTED_VERSIONS
            )));
        }

        if self.scenario.name.trim().is_empty() {
            return Err(YamlConfigError::Validation(
                "scenario.name must not be empty".to_string(),
            ));
        }

        if self.scenario.requests.is_empty() {
            return Err(YamlConfigError::Validation(
                "At least one request must be defined".to_string(),
            ));
        }

        for (idx, request) in self.scenario.requests.iter().enumerate() {
            if request.name.trim().is_empty() {
                return Err(YamlConfigError::Validation(format!(
                    "scenario.requests[{}].name must not be empty",
                    idx
                )));
            }
        }

        Ok(())
    }

    /// Build the scenario using the default transformers.
    pub fn to_scenario(&self) -> Result<Scenario, YamlConfigError> {
        self.to_scenario_with_registry(Arc::new(TransformerRegistry::default()))
    }

    /// Build the scenario, checking expressions against `registry`.
    pub fn to_scenario_with_registry(
        &self,
        registry: Arc<TransformerRegistry>,
    ) -> Result<Scenario, YamlConfigError> {
        let mut scenario = Scenario::with_registry(self.scenario.name.clone(), registry);
        scenario.set_failure_action(self.scenario.failure);

        for (name, value) in &self.scenario.variables {
            scenario.declare_variable(name.clone(), yaml_scalar_to_string(name, value)?);
        }

        for request in &self.scenario.requests {
            let content_type: ContentType = request.content_type.parse().map_err(|e| {
                YamlConfigError::Validation(format!("request '{}': {}", request.name, e))
            })?;

            let mut task = RequestTask::new(request.name.clone(), request.endpoint.clone(), content_type);
            if let Some(response) = task.response_mut() {
                for code in &request.status_codes {
                    response.add_status_code(*code);
                }
            }
            scenario.add_request(task);

            for handler in &request.handlers {
                let result = match handler {
                    YamlHandler::Save { variable, matcher } => scenario.add_save_handler(
                        matcher.target.into(),
                        variable,
                        matcher.to_action(),
                    ),
                    YamlHandler::Validate { condition, matcher } => scenario
                        .add_validation_handler(matcher.target.into(), *condition, matcher.to_action()),
                };

                result.map_err(|source| YamlConfigError::Handler {
                    request: request.name.clone(),
                    source,
                })?;
            }
        }

        Ok(scenario)
    }
}

fn yaml_scalar_to_string(name: &str, value: &serde_yaml::Value) -> Result<Option<String>, YamlConfigError> {
    match value {
        serde_yaml::Value::Null => Ok(None),
        serde_yaml::Value::String(s) => Ok(Some(s.clone())),
        serde_yaml::Value::Number(n) => Ok(Some(n.to_string())),
        serde_yaml::Value::Bool(b) => Ok(Some(b.to_string())),
        _ => Err(YamlConfigError::Validation(format!(
            "variable '{}' must be a string, number, boolean or null",
            name
        ))),
    }
}
