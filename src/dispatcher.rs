//! Response dispatching.
//!
//! Every observer registered on a user implements [`ResponseEvent`] and is
//! told about each completed request. [`ResponseHandler`] is the observer that
//! runs the save/validate handlers declared on the request: it transforms the
//! payload once and hands it to every payload handler, then hands the metadata
//! to every metadata handler.
//!
//! When handling fails, the other observers on the user are notified of the
//! failure before the error is returned, so each of them sees it exactly once.
//! [`fire_response`] stops at the failing observer: observers registered before
//! the [`ResponseHandler`] see the response and then its failure, observers
//! registered after it see only the failure.

use crate::content_type::ContentType;
use crate::errors::HandlerError;
use crate::request::RequestTask;
use crate::transformer::{Document, TransformerRegistry};
use crate::user::User;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// What was captured for one completed request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseContext {
    /// Response metadata, e.g. headers
    pub metadata: Option<Map<String, Value>>,

    /// Raw response payload
    pub payload: Option<String>,
}

impl ResponseContext {
    pub fn new(metadata: Option<Map<String, Value>>, payload: Option<String>) -> Self {
        Self { metadata, payload }
    }
}

/// An observer of completed requests.
pub trait ResponseEvent: Send + Sync {
    /// Name used to tell observers apart.
    fn name(&self) -> &str;

    /// Called once per completed request, or once per failure reported by another observer.
    fn on_response(
        &self,
        name: &str,
        context: &ResponseContext,
        request: &RequestTask,
        user: &mut User,
        exception: Option<&HandlerError>,
    ) -> Result<(), HandlerError>;
}

/// Notify every observer on the user about a completed request, in registration order.
///
/// Stops at the first observer that fails and returns its error.
pub fn fire_response(
    user: &mut User,
    name: &str,
    context: &ResponseContext,
    request: &RequestTask,
) -> Result<(), HandlerError> {
    let observers: Vec<Arc<dyn ResponseEvent>> = user.observers().to_vec();

    for observer in observers {
        observer.on_response(name, context, request, user, None)?;
    }

    Ok(())
}

/// Report a failure to every observer on the user, except the one named `skip`.
///
/// Errors returned by the observers are logged at debug level and dropped.
pub fn fire_failure(
    user: &mut User,
    name: &str,
    context: &ResponseContext,
    request: &RequestTask,
    exception: &HandlerError,
    skip: Option<&str>,
) {
    let observers: Vec<Arc<dyn ResponseEvent>> = user
        .observers()
        .iter()
        .filter(|o| Some(o.name()) != skip)
        .cloned()
        .collect();

    for observer in observers {
        if let Err(e) = observer.on_response(name, context, request, user, Some(exception)) {
            debug!(
                observer = %observer.name(),
                error = %e,
                "Ignoring error from response observer"
            );
        }
    }
}

/// Runs the save/validate handlers registered on a request.
pub struct ResponseHandler {
    registry: Arc<TransformerRegistry>,
}

impl ResponseHandler {
    pub const NAME: &'static str = "response_handler";

    pub fn new(registry: Arc<TransformerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TransformerRegistry {
        &self.registry
    }

    /// Run every handler on `request` against the captured response.
    ///
    /// Payload handlers run first, then metadata handlers. If the payload
    /// cannot be transformed, no payload handler runs, the metadata handlers
    /// still do, and the transform error is returned.
    pub fn handle(
        &self,
        context: &ResponseContext,
        request: &RequestTask,
        user: &mut User,
    ) -> Result<(), HandlerError> {
        let Some(response) = request.response() else {
            return Ok(());
        };

        if !response.has_handlers() {
            return Ok(());
        }

        let mut failure: Option<HandlerError> = None;

        if !response.payload_handlers().is_empty() {
            let content_type = response.content_type();
            let raw = context.payload.as_deref().unwrap_or_default();

            match self.registry.transform(content_type, raw) {
                Ok(payload) => {
                    for handler in response.payload_handlers() {
                        handler.apply(&self.registry, content_type, &payload, user)?;
                    }
                }
                Err(e) => {
                    error!(
                        user = %user.name(),
                        request = %request.name(),
                        content_type = %content_type,
                        error = %e,
                        "Failed to transform payload"
                    );
                    failure = Some(e.into());
                }
            }
        }

        if !response.metadata_handlers().is_empty() {
            let metadata = Document::Json(Value::Object(context.metadata.clone().unwrap_or_default()));

            for handler in response.metadata_handlers() {
                let result = handler.apply(&self.registry, ContentType::Json, &metadata, user);

                match (result, &failure) {
                    (Err(e), Some(_)) => {
                        error!(
                            user = %user.name(),
                            request = %request.name(),
                            error = %e,
                            "Metadata handler failed after payload transform failure"
                        );
                    }
                    (Err(e), None) => return Err(e),
                    (Ok(()), _) => {}
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl ResponseEvent for ResponseHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    /// Failures reported by other observers are not handled again.
    fn on_response(
        &self,
        name: &str,
        context: &ResponseContext,
        request: &RequestTask,
        user: &mut User,
        exception: Option<&HandlerError>,
    ) -> Result<(), HandlerError> {
        if exception.is_some() {
            return Ok(());
        }

        match self.handle(context, request, user) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(
                    user = %user.name(),
                    scenario = %user.scenario(),
                    request = %name,
                    endpoint = %request.endpoint(),
                    failure_action = ?user.failure_action(),
                    error = %e,
                    "Response handling failed"
                );

                fire_failure(user, name, context, request, &e, Some(self.name()));

                Err(e)
            }
        }
    }
}
