//! Request descriptors and the response handling attached to them.

use crate::content_type::ContentType;
use crate::handler::ResponseHandlerAction;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Which part of a response a handler runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerType {
    /// Response metadata (headers and the like), always handled as JSON
    Metadata,

    /// Response payload, handled as the request's declared content type
    Payload,
}

/// Response handling declared for one request.
///
/// Handlers run in the order they were added.
#[derive(Debug, Clone)]
pub struct RequestTaskResponse {
    content_type: ContentType,
    status_codes: BTreeSet<u16>,
    metadata_handlers: Vec<Arc<dyn ResponseHandlerAction>>,
    payload_handlers: Vec<Arc<dyn ResponseHandlerAction>>,
}

impl RequestTaskResponse {
    /// Accepts status 200 only.
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            status_codes: BTreeSet::from([200]),
            metadata_handlers: Vec::new(),
            payload_handlers: Vec::new(),
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn set_content_type(&mut self, content_type: ContentType) {
        self.content_type = content_type;
    }

    /// Add an acceptable status code; a negative code removes `abs(code)` instead.
    ///
    /// # Example
    /// ```
    /// use loadtest_handlers::content_type::ContentType;
    /// use loadtest_handlers::request::RequestTaskResponse;
    ///
    /// let mut response = RequestTaskResponse::new(ContentType::Json);
    /// response.add_status_code(302);
    /// response.add_status_code(-200);
    ///
    /// assert!(response.accepts(302));
    /// assert!(!response.accepts(200));
    /// ```
    pub fn add_status_code(&mut self, code: i32) {
        let Ok(status) = u16::try_from(code.unsigned_abs()) else {
            return;
        };

        if code < 0 {
            self.status_codes.remove(&status);
        } else {
            self.status_codes.insert(status);
        }
    }

    pub fn accepts(&self, status: u16) -> bool {
        self.status_codes.contains(&status)
    }

    pub fn status_codes(&self) -> Vec<u16> {
        self.status_codes.iter().copied().collect()
    }

    pub fn add_handler(&mut self, handler: Arc<dyn ResponseHandlerAction>, handler_type: HandlerType) {
        match handler_type {
            HandlerType::Metadata => self.metadata_handlers.push(handler),
            HandlerType::Payload => self.payload_handlers.push(handler),
        }
    }

    pub fn metadata_handlers(&self) -> &[Arc<dyn ResponseHandlerAction>] {
        &self.metadata_handlers
    }

    pub fn payload_handlers(&self) -> &[Arc<dyn ResponseHandlerAction>] {
        &self.payload_handlers
    }

    /// Whether any handler, of either kind, is registered.
    pub fn has_handlers(&self) -> bool {
        !self.metadata_handlers.is_empty() || !self.payload_handlers.is_empty()
    }
}

/// A request declared in a scenario.
#[derive(Debug, Clone)]
pub struct RequestTask {
    name: String,
    endpoint: String,
    response: Option<RequestTaskResponse>,
}

impl RequestTask {
    /// A request whose response is handled as `content_type`.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            response: Some(RequestTaskResponse::new(content_type)),
        }
    }

    /// A request that never produces a response to handle (e.g. a fire-and-forget send).
    pub fn without_response(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            response: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn response(&self) -> Option<&RequestTaskResponse> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut RequestTaskResponse> {
        self.response.as_mut()
    }
}
