//! Content transformers and path extractors.
//!
//! A [`Transformer`] turns a raw payload into a [`Document`] and compiles
//! path expressions into [`Extractor`]s over that document. Transformers are
//! collected in a [`TransformerRegistry`], built once at startup and shared
//! read-only between users.
//!
//! | Content type | Document          | Expression language |
//! |--------------|-------------------|---------------------|
//! | JSON         | `serde_json`      | JSONPath (RFC 9535) |
//! | XML          | `sxd_document`    | XPath 1.0           |
//! | PLAIN        | the raw text      | regular expression  |

use crate::content_type::ContentType;
use crate::errors::TransformError;
use regex::Regex;
use serde_json::Value;
use serde_json_path::JsonPath;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A parsed payload.
pub enum Document {
    Json(Value),
    Xml(sxd_document::Package),
    Plain(String),
}

impl Document {
    /// Content type this document was parsed as.
    pub fn content_type(&self) -> ContentType {
        match self {
            Document::Json(_) => ContentType::Json,
            Document::Xml(_) => ContentType::Xml,
            Document::Plain(_) => ContentType::Plain,
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Document::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Document::Xml(_) => f.write_str("Xml(..)"),
            Document::Plain(text) => f.debug_tuple("Plain").field(text).finish(),
        }
    }
}

/// A compiled expression: evaluates against a document and returns every
/// matching value as a string, in document order.
pub type Extractor = Box<dyn Fn(&Document) -> Result<Vec<String>, TransformError>>;

/// Parser and expression compiler for one content type.
pub trait Transformer: Send + Sync {
    /// The content type this transformer is registered under.
    fn content_type(&self) -> ContentType;

    /// Parse a raw payload.
    fn parse(&self, raw: &str) -> Result<Document, TransformError>;

    /// Whether the expression is syntactically valid for this content type.
    fn validate_expression(&self, expression: &str) -> bool;

    /// Compile an expression into a reusable extractor.
    fn compile_expression(&self, expression: &str) -> Result<Extractor, TransformError>;
}

/// Convert a JSON node to the string handlers match against.
///
/// Strings are returned without quotes; arrays and objects as compact JSON.
pub fn json_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// JSON payloads queried with JSONPath.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTransformer;

impl Transformer for JsonTransformer {
    fn content_type(&self) -> ContentType {
        ContentType::Json
    }

    fn parse(&self, raw: &str) -> Result<Document, TransformError> {
        serde_json::from_str(raw)
            .map(Document::Json)
            .map_err(|e| TransformError::Parse {
                content_type: ContentType::Json,
                message: e.to_string(),
            })
    }

    fn validate_expression(&self, expression: &str) -> bool {
        JsonPath::parse(expression).is_ok()
    }

    fn compile_expression(&self, expression: &str) -> Result<Extractor, TransformError> {
        let path = JsonPath::parse(expression).map_err(|e| {
            debug!(expression = %expression, error = %e, "Invalid JSONPath");
            TransformError::InvalidExpression {
                expression: expression.to_string(),
                content_type: ContentType::Json,
            }
        })?;

        Ok(Box::new(move |document: &Document| match document {
            Document::Json(value) => Ok(path
                .query(value)
                .all()
                .into_iter()
                .map(json_value_to_string)
                .collect()),
            other => Err(TransformError::DocumentMismatch {
                content_type: ContentType::Json,
                actual: other.content_type(),
            }),
        }))
    }
}

/// XML payloads queried with XPath.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlTransformer;

impl XmlTransformer {
    fn xpath_value_to_strings(value: sxd_xpath::Value<'_>) -> Vec<String> {
        match value {
            sxd_xpath::Value::Nodeset(nodes) => nodes
                .document_order()
                .iter()
                .map(|node| node.string_value())
                .collect(),
            sxd_xpath::Value::String(s) => vec![s],
            sxd_xpath::Value::Number(n) => {
                // Integral values print without a decimal point while they fit exactly
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    vec![format!("{}", n as i64)]
                } else {
                    vec![n.to_string()]
                }
            }
            sxd_xpath::Value::Boolean(b) => vec![b.to_string()],
        }
    }
}

impl Transformer for XmlTransformer {
    fn content_type(&self) -> ContentType {
        ContentType::Xml
    }

    fn parse(&self, raw: &str) -> Result<Document, TransformError> {
        sxd_document::parser::parse(raw)
            .map(Document::Xml)
            .map_err(|e| TransformError::Parse {
                content_type: ContentType::Xml,
                message: format!("{:?}", e),
            })
    }

    fn validate_expression(&self, expression: &str) -> bool {
        !expression.trim().is_empty() && sxd_xpath::Factory::new().build(expression).is_ok()
    }

    fn compile_expression(&self, expression: &str) -> Result<Extractor, TransformError> {
        if !self.validate_expression(expression) {
            return Err(TransformError::InvalidExpression {
                expression: expression.to_string(),
                content_type: ContentType::Xml,
            });
        }

        let expression = expression.to_string();

        Ok(Box::new(move |document: &Document| match document {
            Document::Xml(package) => {
                let document = package.as_document();
                match sxd_xpath::evaluate_xpath(&document, &expression) {
                    Ok(value) => Ok(Self::xpath_value_to_strings(value)),
                    Err(e) => {
                        debug!(expression = %expression, error = ?e, "XPath evaluation failed");
                        Ok(Vec::new())
                    }
                }
            }
            other => Err(TransformError::DocumentMismatch {
                content_type: ContentType::Xml,
                actual: other.content_type(),
            }),
        }))
    }
}

/// Full-match regular expression applied to a single string.
///
/// Yields the first capture group when the pattern has one, otherwise the
/// whole match. Empty results count as no match. A pattern that is not a
/// valid regular expression is matched as literal text.
#[derive(Debug, Clone)]
pub struct MatchFilter {
    pattern: String,
    regex: Regex,
}

impl MatchFilter {
    pub fn new(pattern: &str) -> Result<Self, TransformError> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))
            .or_else(|_| Regex::new(&format!("^{}$", regex::escape(pattern))))
            .map_err(|_| TransformError::InvalidExpression {
                expression: pattern.to_string(),
                content_type: ContentType::Plain,
            })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Apply the pattern to one value.
    ///
    /// # Example
    /// ```
    /// use loadtest_handlers::transformer::MatchFilter;
    ///
    /// let filter = MatchFilter::new(r"user-(\d+)").unwrap();
    /// assert_eq!(filter.apply("user-123"), Some("123".to_string()));
    /// assert_eq!(filter.apply("admin-user-123"), None);
    /// ```
    pub fn apply(&self, value: &str) -> Option<String> {
        let captures = self.regex.captures(value)?;

        captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .map(|m| m.to_string())
    }
}

/// Plain text payloads, and the match-with filter for every content type.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTransformer;

impl PlainTransformer {
    /// Compile a match-with pattern for filtering extracted values.
    pub fn match_filter(&self, pattern: &str) -> Result<MatchFilter, TransformError> {
        MatchFilter::new(pattern)
    }
}

impl Transformer for PlainTransformer {
    fn content_type(&self) -> ContentType {
        ContentType::Plain
    }

    fn parse(&self, raw: &str) -> Result<Document, TransformError> {
        Ok(Document::Plain(raw.to_string()))
    }

    fn validate_expression(&self, expression: &str) -> bool {
        MatchFilter::new(expression).is_ok()
    }

    fn compile_expression(&self, expression: &str) -> Result<Extractor, TransformError> {
        let filter = self.match_filter(expression)?;

        Ok(Box::new(move |document: &Document| match document {
            Document::Plain(text) => Ok(filter.apply(text).into_iter().collect()),
            other => Err(TransformError::DocumentMismatch {
                content_type: ContentType::Plain,
                actual: other.content_type(),
            }),
        }))
    }
}

/// Transformers keyed by content type.
///
/// Populate it at startup, wrap it in an `Arc`, and hand it to every
/// dispatcher; it is never mutated afterwards.
pub struct TransformerRegistry {
    transformers: HashMap<ContentType, Arc<dyn Transformer>>,
    plain: PlainTransformer,
}

impl TransformerRegistry {
    /// A registry without any content-type transformers.
    ///
    /// The match-with filter is always available, even here.
    pub fn empty() -> Self {
        Self {
            transformers: HashMap::new(),
            plain: PlainTransformer,
        }
    }

    /// Register a transformer, replacing any previous one for the same content type.
    ///
    /// Transformers for `UNDEFINED` are refused.
    pub fn register(&mut self, transformer: Arc<dyn Transformer>) -> Option<Arc<dyn Transformer>> {
        let content_type = transformer.content_type();

        if content_type == ContentType::Undefined {
            warn!("Refusing to register a transformer for UNDEFINED");
            return None;
        }

        debug!(content_type = %content_type, "Registered transformer");
        self.transformers.insert(content_type, transformer)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.register(transformer);
        self
    }

    pub fn get(&self, content_type: ContentType) -> Option<&Arc<dyn Transformer>> {
        self.transformers.get(&content_type)
    }

    /// Parse a raw payload with the transformer registered for `content_type`.
    pub fn transform(&self, content_type: ContentType, raw: &str) -> Result<Document, TransformError> {
        self.get(content_type)
            .ok_or(TransformError::UnregisteredContentType(content_type))?
            .parse(raw)
    }

    /// The transformer used for match-with patterns.
    pub fn plain(&self) -> &PlainTransformer {
        &self.plain
    }

    /// Registered content types, in a consistent order.
    pub fn content_types(&self) -> Vec<ContentType> {
        ContentType::all()
            .into_iter()
            .filter(|ct| self.transformers.contains_key(ct))
            .collect()
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::empty()
            .with(Arc::new(JsonTransformer))
            .with(Arc::new(XmlTransformer))
            .with(Arc::new(PlainTransformer))
    }
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field("content_types", &self.content_types())
            .finish()
    }
}
