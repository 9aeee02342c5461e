//! Template rendering for handler fields.
//!
//! Handler expressions, match patterns and expected match counts may reference
//! user variables, which are resolved every time the handler runs.
//!
//! Supported syntax:
//! - `{{ variable_name }}` (whitespace inside the braces is optional)
//! - `${variable_name}`
//!
//! Unknown variables, and variables holding no value, render as the empty string.

use crate::errors::HandlerError;
use crate::user::Variables;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}|\$\{([A-Za-z_][A-Za-z0-9_.]*)\}")
            .unwrap();
}

/// Render a template string against a user's variables.
///
/// # Example
/// ```
/// use loadtest_handlers::template::render;
/// use loadtest_handlers::user::Variables;
///
/// let mut vars = Variables::new();
/// vars.set("user_id", Some("12345".to_string()));
///
/// assert_eq!(render("$.users[?@.id == '{{ user_id }}']", &vars), "$.users[?@.id == '12345']");
/// assert_eq!(render("/users/${user_id}", &vars), "/users/12345");
/// ```
pub fn render(template: &str, variables: &Variables) -> String {
    if !template.contains("{{") && !template.contains("${") {
        return template.to_string();
    }

    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            variables.get(name).unwrap_or_default().to_string()
        })
        .into_owned()
}

/// Render an expected-matches template to a signed count.
///
/// `-1` is the "any number, but at least one" sentinel; anything below that is rejected.
pub fn render_expected_matches(template: &str, variables: &Variables) -> Result<i64, HandlerError> {
    let rendered = render(template, variables);

    let value: i64 = rendered.trim().parse().map_err(|_| HandlerError::Template {
        template: template.to_string(),
        message: format!("'{}' is not an integer", rendered),
    })?;

    if value < -1 {
        return Err(HandlerError::Template {
            template: template.to_string(),
            message: format!("{} is not a valid number of matches", value),
        });
    }

    Ok(value)
}
