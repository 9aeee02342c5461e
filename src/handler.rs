//! Save and validate handler actions.
//!
//! A handler action is bound to one request and runs against every response
//! that request receives. Each run goes through the same pipeline:
//!
//! 1. render `expression`, `match_with` and `expected_matches` against the user's variables
//! 2. evaluate the expression with the transformer for the response's content type
//! 3. keep the values that fully match `match_with` (first capture group, or the whole match)
//! 4. check the number of matches against `expected_matches`
//!
//! The outcome is either a resolved value or `None`. [`SaveHandlerAction`]
//! stores it in a variable; [`ValidationHandlerAction`] turns it into a
//! pass or a failure.

use crate::content_type::ContentType;
use crate::errors::{HandlerError, TransformError};
use crate::template::{render, render_expected_matches};
use crate::transformer::{Document, TransformerRegistry};
use crate::user::User;
use serde_json::Value;
use std::fmt;
use tracing::{debug, error};

/// How many post-filter matches a handler expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedMatches {
    /// Any number of matches, but at least one (`-1`)
    Unbounded,

    /// Exactly this many matches
    Exactly(usize),
}

impl ExpectedMatches {
    /// Interpret a rendered count; `-1` (or any negative value) is unbounded.
    pub fn from_count(count: i64) -> Self {
        if count < 0 {
            ExpectedMatches::Unbounded
        } else {
            ExpectedMatches::Exactly(count as usize)
        }
    }
}

impl fmt::Display for ExpectedMatches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedMatches::Unbounded => write!(f, "-1"),
            ExpectedMatches::Exactly(n) => write!(f, "{}", n),
        }
    }
}

/// Outcome of checking matches against the expected count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Count satisfied; the value to save or validate
    Value(String),

    /// Unbounded, but nothing matched
    NoValues,

    /// Fewer matches than expected
    TooFew,

    /// More matches than expected
    TooMany,
}

/// Format values as a JSON array, `["a", "b"]`.
///
/// Non-ASCII characters are written as `\uXXXX` escapes (UTF-16, lowercase hex).
fn json_array(values: &[String]) -> String {
    let items: Vec<String> = values
        .iter()
        .map(|v| escape_non_ascii(&Value::String(v.clone()).to_string()))
        .collect();
    format!("[{}]", items.join(", "))
}

fn escape_non_ascii(json: &str) -> String {
    if json.is_ascii() {
        return json.to_string();
    }

    let mut escaped = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            escaped.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    escaped
}

/// Check a list of matches against the expected count and build the resolved value.
///
/// A single match resolves to itself, several matches are joined with newlines,
/// and `as_json` wraps the matches in a JSON array instead.
///
/// # Example
/// ```
/// use loadtest_handlers::handler::{resolve, ExpectedMatches, Resolution};
///
/// let matches = vec!["a".to_string(), "b".to_string()];
///
/// assert_eq!(
///     resolve(&matches, ExpectedMatches::Unbounded, true),
///     Resolution::Value(r#"["a", "b"]"#.to_string())
/// );
/// assert_eq!(resolve(&matches, ExpectedMatches::Exactly(1), false), Resolution::TooMany);
/// ```
pub fn resolve(matches: &[String], expected: ExpectedMatches, as_json: bool) -> Resolution {
    match expected {
        ExpectedMatches::Unbounded if matches.is_empty() => return Resolution::NoValues,
        ExpectedMatches::Exactly(n) if matches.len() < n => return Resolution::TooFew,
        ExpectedMatches::Exactly(n) if matches.len() > n => return Resolution::TooMany,
        _ => {}
    }

    let value = if as_json {
        json_array(matches)
    } else if matches.len() == 1 {
        matches[0].clone()
    } else {
        matches.join("\n")
    };

    Resolution::Value(value)
}

/// A resolved match together with the rendered expression and pattern that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub value: Option<String>,
    pub expression: String,
    pub match_with: String,
}

/// Fields shared by every handler action.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerAction {
    expression: String,
    match_with: String,
    expected_matches: String,
    as_json: bool,
}

impl HandlerAction {
    /// A handler expecting exactly one match.
    pub fn new(expression: impl Into<String>, match_with: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            match_with: match_with.into(),
            expected_matches: "1".to_string(),
            as_json: false,
        }
    }

    /// Set the expected number of matches. May be a template, e.g. `{{ count }}`.
    pub fn with_expected_matches(mut self, expected_matches: impl Into<String>) -> Self {
        self.expected_matches = expected_matches.into();
        self
    }

    pub fn with_as_json(mut self, as_json: bool) -> Self {
        self.as_json = as_json;
        self
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn match_with(&self) -> &str {
        &self.match_with
    }

    pub fn expected_matches(&self) -> &str {
        &self.expected_matches
    }

    pub fn as_json(&self) -> bool {
        self.as_json
    }

    /// Extract, filter and count matches in `payload`.
    ///
    /// Count mismatches are not errors: they resolve to `None` and are logged.
    /// `condition` is the validation condition of the caller (`false` for saves);
    /// when it is `true` a short count is expected and not logged.
    pub fn get_match(
        &self,
        registry: &TransformerRegistry,
        content_type: ContentType,
        payload: &Document,
        user: &User,
        condition: bool,
    ) -> Result<MatchResult, HandlerError> {
        let variables = user.variables();
        let expression = render(&self.expression, variables);
        let match_with = render(&self.match_with, variables);
        let expected =
            ExpectedMatches::from_count(render_expected_matches(&self.expected_matches, variables)?);

        let transformer = registry
            .get(content_type)
            .ok_or(TransformError::UnregisteredContentType(content_type))?;

        if !transformer.validate_expression(&expression) {
            return Err(TransformError::InvalidExpression {
                expression,
                content_type,
            }
            .into());
        }

        let extractor = transformer.compile_expression(&expression)?;
        let values = extractor(payload)?;

        let filter = registry.plain().match_filter(&match_with)?;
        let matches: Vec<String> = values.iter().filter_map(|v| filter.apply(v)).collect();

        let value = match resolve(&matches, expected, self.as_json) {
            Resolution::Value(value) => {
                debug!(
                    user = %user.name(),
                    expression = %expression,
                    match_with = %match_with,
                    value = %value,
                    "Resolved value"
                );
                Some(value)
            }
            Resolution::NoValues => {
                error!(
                    user = %user.name(),
                    "\"{}\": \"{}\" matched no values", expression, match_with
                );
                None
            }
            Resolution::TooFew => {
                if !condition {
                    error!(
                        user = %user.name(),
                        expected = %expected,
                        matched = matches.len(),
                        "\"{}\": \"{}\" matched too few values: {:?}", expression, match_with, values
                    );
                }
                None
            }
            Resolution::TooMany => {
                error!(
                    user = %user.name(),
                    expected = %expected,
                    matched = matches.len(),
                    "\"{}\": \"{}\" matched too many values: {:?}", expression, match_with, values
                );
                None
            }
        };

        Ok(MatchResult {
            value,
            expression,
            match_with,
        })
    }
}

/// Policy applied to a response by a handler bound to a request.
pub trait ResponseHandlerAction: Send + Sync + fmt::Debug {
    /// The shared expression/pattern/count fields.
    fn action(&self) -> &HandlerAction;

    /// Run the handler against a transformed payload.
    fn apply(
        &self,
        registry: &TransformerRegistry,
        content_type: ContentType,
        payload: &Document,
        user: &mut User,
    ) -> Result<(), HandlerError>;
}

/// Stores the resolved value in a user variable.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveHandlerAction {
    variable: String,
    action: HandlerAction,
}

impl SaveHandlerAction {
    pub fn new(variable: impl Into<String>, action: HandlerAction) -> Self {
        Self {
            variable: variable.into(),
            action,
        }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }
}

impl ResponseHandlerAction for SaveHandlerAction {
    fn action(&self) -> &HandlerAction {
        &self.action
    }

    /// The variable is written before failing, so a miss leaves it `None`
    /// rather than holding the value from a previous response.
    fn apply(
        &self,
        registry: &TransformerRegistry,
        content_type: ContentType,
        payload: &Document,
        user: &mut User,
    ) -> Result<(), HandlerError> {
        let result = self
            .action
            .get_match(registry, content_type, payload, user, false)?;

        user.set_context_variable(&self.variable, result.value.clone());

        if result.value.is_none() {
            return Err(HandlerError::ResponseHandler(format!(
                "\"{}\" did not match value",
                result.expression
            )));
        }

        Ok(())
    }
}

/// Fails the response depending on whether a value resolved.
///
/// With `condition == true` the handler fails when a value *is* resolved;
/// with `condition == false` it fails when *no* value is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationHandlerAction {
    condition: bool,
    action: HandlerAction,
}

impl ValidationHandlerAction {
    pub fn new(condition: bool, action: HandlerAction) -> Self {
        Self { condition, action }
    }

    pub fn condition(&self) -> bool {
        self.condition
    }
}

impl ResponseHandlerAction for ValidationHandlerAction {
    fn action(&self) -> &HandlerAction {
        &self.action
    }

    fn apply(
        &self,
        registry: &TransformerRegistry,
        content_type: ContentType,
        payload: &Document,
        user: &mut User,
    ) -> Result<(), HandlerError> {
        let result = self
            .action
            .get_match(registry, content_type, payload, user, self.condition)?;

        let triggered = result.value.is_some() == self.condition;

        if triggered {
            return Err(HandlerError::ResponseHandler(format!(
                "\"{}\": \"{}\" was {}",
                result.expression,
                result.match_with,
                result.value.as_deref().unwrap_or("None")
            )));
        }

        Ok(())
    }
}
