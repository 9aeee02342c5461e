//! Scenario definitions: declared variables, requests, and the handlers
//! attached to them.
//!
//! Handlers are always attached to the most recently added request, the way
//! scenario steps read top to bottom. Declaration mistakes are reported here,
//! once, instead of on every response.

use crate::content_type::ContentType;
use crate::errors::ConfigError;
use crate::handler::{HandlerAction, ResponseHandlerAction, SaveHandlerAction, ValidationHandlerAction};
use crate::request::{HandlerType, RequestTask};
use crate::template::render;
use crate::transformer::TransformerRegistry;
use crate::user::{FailureAction, User, Variables};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A scenario as seen by the response handlers.
///
/// # Example
/// ```
/// use loadtest_handlers::content_type::ContentType;
/// use loadtest_handlers::handler::HandlerAction;
/// use loadtest_handlers::request::{HandlerType, RequestTask};
/// use loadtest_handlers::scenario::Scenario;
///
/// let mut scenario = Scenario::new("login");
/// scenario.declare_variable("token", None);
/// scenario.add_request(RequestTask::new("auth", "/api/auth", ContentType::Json));
/// scenario
///     .add_save_handler(HandlerType::Payload, "token", HandlerAction::new("$.token", ".*"))
///     .unwrap();
///
/// assert_eq!(scenario.requests()[0].response().unwrap().payload_handlers().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    failure_action: FailureAction,
    variables: BTreeMap<String, Option<String>>,
    requests: Vec<RequestTask>,
    registry: Arc<TransformerRegistry>,
}

impl Scenario {
    /// A scenario using the default JSON/XML/PLAIN transformers.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_registry(name, Arc::new(TransformerRegistry::default()))
    }

    pub fn with_registry(name: impl Into<String>, registry: Arc<TransformerRegistry>) -> Self {
        Self {
            name: name.into(),
            failure_action: FailureAction::default(),
            variables: BTreeMap::new(),
            requests: Vec::new(),
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registry handler expressions are checked against; share it with the dispatcher.
    pub fn registry(&self) -> Arc<TransformerRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn failure_action(&self) -> FailureAction {
        self.failure_action
    }

    pub fn set_failure_action(&mut self, failure_action: FailureAction) {
        self.failure_action = failure_action;
    }

    /// Declare a variable and its initial value.
    pub fn declare_variable(&mut self, name: impl Into<String>, initial: Option<String>) {
        self.variables.insert(name.into(), initial);
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn add_request(&mut self, request: RequestTask) {
        self.requests.push(request);
    }

    pub fn requests(&self) -> &[RequestTask] {
        &self.requests
    }

    pub fn request(&self, name: &str) -> Option<&RequestTask> {
        self.requests.iter().find(|r| r.name() == name)
    }

    /// Save the value resolved from the latest request's response into `variable`.
    pub fn add_save_handler(
        &mut self,
        handler_type: HandlerType,
        variable: &str,
        action: HandlerAction,
    ) -> Result<(), ConfigError> {
        if !self.is_declared(variable) {
            return Err(ConfigError::UndeclaredVariable(variable.to_string()));
        }

        self.attach(handler_type, Arc::new(SaveHandlerAction::new(variable, action)))
    }

    /// Fail the latest request's response depending on whether a value resolves.
    pub fn add_validation_handler(
        &mut self,
        handler_type: HandlerType,
        condition: bool,
        action: HandlerAction,
    ) -> Result<(), ConfigError> {
        self.attach(handler_type, Arc::new(ValidationHandlerAction::new(condition, action)))
    }

    fn attach(
        &mut self,
        handler_type: HandlerType,
        handler: Arc<dyn ResponseHandlerAction>,
    ) -> Result<(), ConfigError> {
        let expression = handler.action().expression();
        if expression.trim().is_empty() {
            return Err(ConfigError::EmptyExpression);
        }

        let request = self.requests.last_mut().ok_or(ConfigError::NoRequest)?;
        let request_name = request.name().to_string();
        let response = request
            .response_mut()
            .ok_or_else(|| ConfigError::NoResponse(request_name.clone()))?;

        let content_type = match handler_type {
            HandlerType::Metadata => ContentType::Json,
            HandlerType::Payload => response.content_type(),
        };

        if content_type == ContentType::Undefined {
            return Err(ConfigError::UndefinedContentType(request_name));
        }

        // Expressions with placeholders can only be checked once rendered
        if !expression.contains("{{") && !expression.contains("${") {
            if let Some(transformer) = self.registry.get(content_type) {
                if !transformer.validate_expression(expression) {
                    return Err(ConfigError::InvalidExpression {
                        expression: expression.to_string(),
                        content_type,
                    });
                }
            }
        }

        response.add_handler(handler, handler_type);
        Ok(())
    }

    /// Create a user running this scenario, seeded with the declared variables.
    ///
    /// Initial values may reference other declared variables.
    pub fn create_user(&self, name: impl Into<String>) -> User {
        let declared: Variables = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let variables: Variables = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.as_deref().map(|value| render(value, &declared))))
            .collect();

        User::new(name, self.name.clone())
            .with_variables(variables)
            .with_failure_action(self.failure_action)
    }
}
