//! Content type tags attached to a request/response pair.
//!
//! The tag selects which transformer parses the payload and which expression
//! language (JSONPath, XPath, regex) handler expressions are written in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared content type of a response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// No content type declared; payload handlers can never run against it
    #[default]
    Undefined,

    /// JSON documents, queried with JSONPath (e.g. "$.user.id")
    Json,

    /// XML documents, queried with XPath (e.g. "/root/user/@id")
    Xml,

    /// Plain text, queried with a regular expression
    Plain,
}

impl ContentType {
    /// Upper-case name used in error and log messages.
    pub fn name(&self) -> &'static str {
        match self {
            ContentType::Undefined => "UNDEFINED",
            ContentType::Json => "JSON",
            ContentType::Xml => "XML",
            ContentType::Plain => "PLAIN",
        }
    }

    /// Get all content types in a consistent order.
    pub fn all() -> Vec<ContentType> {
        vec![
            ContentType::Undefined,
            ContentType::Json,
            ContentType::Xml,
            ContentType::Plain,
        ]
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ContentType {
    type Err = String;

    /// Accepts the short names as well as the common MIME types.
    ///
    /// # Example
    /// ```
    /// use loadtest_handlers::content_type::ContentType;
    ///
    /// assert_eq!("application/json".parse::<ContentType>(), Ok(ContentType::Json));
    /// assert_eq!("xml".parse::<ContentType>(), Ok(ContentType::Xml));
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Drop MIME parameters such as "; charset=utf-8"
        let value = s.split(';').next().unwrap_or_default().trim().to_lowercase();

        match value.as_str() {
            "undefined" | "" => Ok(ContentType::Undefined),
            "json" | "application/json" => Ok(ContentType::Json),
            "xml" | "application/xml" | "text/xml" => Ok(ContentType::Xml),
            "plain" | "text/plain" => Ok(ContentType::Plain),
            other => Err(format!("Unknown content type: '{}'", other)),
        }
    }
}
