//! Error types for response transformation and handling.
//!
//! Failures are split by where they originate: a payload could not be
//! transformed, a handler assertion did not hold, or a handler was declared
//! incorrectly. Every failure also maps to a [`FailureKind`] so that it can be
//! counted and reported per category.

use crate::content_type::ContentType;
use std::fmt;
use thiserror::Error;

/// Errors raised while transforming a payload or compiling an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("could not find a transformer for {0}")]
    UnregisteredContentType(ContentType),

    #[error("\"{expression}\" is not a valid expression for {content_type}")]
    InvalidExpression {
        expression: String,
        content_type: ContentType,
    },

    #[error("failed to transform input as {content_type}: {message}")]
    Parse {
        content_type: ContentType,
        message: String,
    },

    #[error("{content_type} expression cannot be applied to a {actual} document")]
    DocumentMismatch {
        content_type: ContentType,
        actual: ContentType,
    },
}

/// Errors surfaced by handler actions and the response dispatcher.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    /// A save did not find a value, or a validation assertion triggered.
    #[error("{0}")]
    ResponseHandler(String),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("template \"{template}\" rendered an invalid value: {message}")]
    Template { template: String, message: String },

    #[error("status code {status} is not one of the expected status codes {expected:?}")]
    StatusCode { status: u16, expected: Vec<u16> },
}

impl HandlerError {
    /// Category of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            HandlerError::ResponseHandler(_) => FailureKind::HandlerFailure,
            HandlerError::Transform(_) => FailureKind::TransformFailure,
            HandlerError::Template { .. } => FailureKind::TemplateFailure,
            HandlerError::StatusCode { .. } => FailureKind::StatusCodeFailure,
        }
    }
}

/// Errors raised when a handler is declared on a scenario.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("there are no requests in the scenario")]
    NoRequest,

    #[error("request \"{0}\" does not have a response to handle")]
    NoResponse(String),

    #[error("variable \"{0}\" has not been declared")]
    UndeclaredVariable(String),

    #[error("expression is empty")]
    EmptyExpression,

    #[error("content type must be specified for request \"{0}\" before adding payload handlers")]
    UndefinedContentType(String),

    #[error("\"{expression}\" is not a valid expression for {content_type}")]
    InvalidExpression {
        expression: String,
        content_type: ContentType,
    },
}

/// Categories of handler failures, used as metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Payload could not be transformed or an expression did not compile
    TransformFailure,

    /// Save found no value, or a validation triggered
    HandlerFailure,

    /// A templated field rendered to something unusable
    TemplateFailure,

    /// Response status code was not accepted by the request
    StatusCodeFailure,
}

impl FailureKind {
    /// Get the Prometheus label for this failure kind.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::TransformFailure => "transform_failure",
            FailureKind::HandlerFailure => "handler_failure",
            FailureKind::TemplateFailure => "template_failure",
            FailureKind::StatusCodeFailure => "status_code_failure",
        }
    }

    /// Get a human-readable description of this failure kind.
    pub fn description(&self) -> &'static str {
        match self {
            FailureKind::TransformFailure => "Payload Transform Failures",
            FailureKind::HandlerFailure => "Save/Validate Handler Failures",
            FailureKind::TemplateFailure => "Template Rendering Failures",
            FailureKind::StatusCodeFailure => "Unexpected Status Codes",
        }
    }

    /// Get all failure kinds in a consistent order.
    pub fn all() -> Vec<FailureKind> {
        vec![
            FailureKind::TransformFailure,
            FailureKind::HandlerFailure,
            FailureKind::TemplateFailure,
            FailureKind::StatusCodeFailure,
        ]
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
