//! Integration tests for saving and validating values from responses.
//!
//! These drive whole requests through the dispatcher the way a running user
//! would: a scenario declares requests and handlers, a user is created from
//! it, and captured responses are fired at the user's observers.

use loadtest_handlers::content_type::ContentType;
use loadtest_handlers::dispatcher::{fire_response, ResponseContext, ResponseHandler};
use loadtest_handlers::errors::{FailureKind, HandlerError, TransformError};
use loadtest_handlers::handler::{
    HandlerAction, ResponseHandlerAction, SaveHandlerAction, ValidationHandlerAction,
};
use loadtest_handlers::request::{HandlerType, RequestTask};
use loadtest_handlers::scenario::Scenario;
use loadtest_handlers::transformer::{
    Document, Extractor, JsonTransformer, Transformer, TransformerRegistry,
};
use loadtest_handlers::user::User;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn registry() -> Arc<TransformerRegistry> {
    Arc::new(TransformerRegistry::default())
}

fn payload(body: &str) -> ResponseContext {
    ResponseContext::new(None, Some(body.to_string()))
}

fn json_request(handlers: Vec<Arc<dyn ResponseHandlerAction>>) -> RequestTask {
    let mut request = RequestTask::new("get", "/api/test", ContentType::Json);
    let response = request.response_mut().unwrap();
    for handler in handlers {
        response.add_handler(handler, HandlerType::Payload);
    }
    request
}

fn dispatch(request: &RequestTask, context: &ResponseContext, user: &mut User) -> Result<(), HandlerError> {
    ResponseHandler::new(registry()).handle(context, request, user)
}

#[test]
fn test_save_single_match() {
    let request = json_request(vec![Arc::new(SaveHandlerAction::new(
        "x",
        HandlerAction::new("$.test.value", "test"),
    ))]);
    let mut user = User::new("user-1", "test");

    dispatch(&request, &payload(r#"{"test": {"value": "test"}}"#), &mut user).unwrap();

    assert_eq!(user.variables().get("x"), Some("test"));
}

#[test]
fn test_save_all_matches_as_json() {
    let request = json_request(vec![Arc::new(SaveHandlerAction::new(
        "values",
        HandlerAction::new("$.test[*].value", ".*")
            .with_expected_matches("-1")
            .with_as_json(true),
    ))]);
    let mut user = User::new("user-1", "test");

    dispatch(
        &request,
        &payload(r#"{"test": [{"value": "a"}, {"value": "b"}]}"#),
        &mut user,
    )
    .unwrap();

    assert_eq!(user.variables().get("values"), Some(r#"["a", "b"]"#));
}

#[test]
fn test_save_miss_clears_variable_and_fails() {
    let request = json_request(vec![Arc::new(SaveHandlerAction::new(
        "x",
        HandlerAction::new("$.test.value", "test"),
    ))]);
    let mut user = User::new("user-1", "test");
    user.set_context_variable("x", Some("stale".to_string()));

    let err = dispatch(&request, &payload(r#"{"test": {"value": "nottest"}}"#), &mut user)
        .unwrap_err();

    assert!(err.to_string().contains("did not match value"));
    assert_eq!(err.kind(), FailureKind::HandlerFailure);
    assert!(user.variables().contains("x"));
    assert_eq!(user.variables().get("x"), None);
}

#[test]
fn test_validation_condition_true_fails_on_match() {
    let request = json_request(vec![Arc::new(ValidationHandlerAction::new(
        true,
        HandlerAction::new("$.test.value", "test"),
    ))]);
    let mut user = User::new("user-1", "test");

    let err = dispatch(&request, &payload(r#"{"test": {"value": "test"}}"#), &mut user)
        .unwrap_err();
    assert_eq!(err.to_string(), r#""$.test.value": "test" was test"#);

    dispatch(&request, &payload(r#"{"test": {"value": "nottest"}}"#), &mut user).unwrap();
}

#[test]
fn test_validation_xor_law() {
    let matching = r#"{"status": "ok"}"#;
    let missing = r#"{"status": "error"}"#;

    for condition in [true, false] {
        for (body, resolves) in [(matching, true), (missing, false)] {
            let request = json_request(vec![Arc::new(ValidationHandlerAction::new(
                condition,
                HandlerAction::new("$.status", "ok"),
            ))]);
            let mut user = User::new("user-1", "test");

            let result = dispatch(&request, &payload(body), &mut user);

            assert_eq!(
                result.is_err(),
                resolves == condition,
                "condition={} resolves={}",
                condition,
                resolves
            );
        }
    }
}

#[test]
fn test_undefined_content_type_skips_payload_handlers() {
    let mut request = RequestTask::new("get", "/api/test", ContentType::Undefined);
    let response = request.response_mut().unwrap();
    response.add_handler(
        Arc::new(SaveHandlerAction::new("body", HandlerAction::new("$.id", ".*"))),
        HandlerType::Payload,
    );
    response.add_handler(
        Arc::new(SaveHandlerAction::new("session", HandlerAction::new("$.session", ".*"))),
        HandlerType::Metadata,
    );

    let mut metadata = Map::new();
    metadata.insert("session".to_string(), Value::String("s-42".to_string()));
    let context = ResponseContext::new(Some(metadata), Some(r#"{"id": 1}"#.to_string()));
    let mut user = User::new("user-1", "test");

    let err = dispatch(&request, &context, &mut user).unwrap_err();

    assert!(matches!(
        err,
        HandlerError::Transform(TransformError::UnregisteredContentType(ContentType::Undefined))
    ));
    assert!(err.to_string().contains("UNDEFINED"));
    assert!(!user.variables().contains("body"));
    assert_eq!(user.variables().get("session"), Some("s-42"));
}

/// Records the payload each invocation received.
#[derive(Debug)]
struct RecordingHandler {
    id: &'static str,
    action: HandlerAction,
    calls: Arc<Mutex<Vec<(&'static str, String)>>>,
}

impl ResponseHandlerAction for RecordingHandler {
    fn action(&self) -> &HandlerAction {
        &self.action
    }

    fn apply(
        &self,
        _registry: &TransformerRegistry,
        _content_type: ContentType,
        payload: &Document,
        _user: &mut User,
    ) -> Result<(), HandlerError> {
        self.calls
            .lock()
            .unwrap()
            .push((self.id, format!("{:?}", payload)));
        Ok(())
    }
}

#[test]
fn test_payload_handlers_run_in_order_with_same_payload() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let handlers: Vec<Arc<dyn ResponseHandlerAction>> = ["h1", "h2", "h3"]
        .into_iter()
        .map(|id| {
            Arc::new(RecordingHandler {
                id,
                action: HandlerAction::new("$.id", ".*"),
                calls: calls.clone(),
            }) as Arc<dyn ResponseHandlerAction>
        })
        .collect();
    let request = json_request(handlers);
    let mut user = User::new("user-1", "test");

    dispatch(&request, &payload(r#"{"id": 9}"#), &mut user).unwrap();

    let calls = calls.lock().unwrap();
    let ids: Vec<&str> = calls.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec!["h1", "h2", "h3"]);
    assert!(calls.iter().all(|(_, seen)| seen == &calls[0].1));
    assert!(calls[0].1.contains("9"));
}

/// JSON transformer that counts how often it parses.
struct CountingTransformer {
    parses: AtomicUsize,
}

impl Transformer for CountingTransformer {
    fn content_type(&self) -> ContentType {
        ContentType::Json
    }

    fn parse(&self, raw: &str) -> Result<Document, TransformError> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        JsonTransformer.parse(raw)
    }

    fn validate_expression(&self, expression: &str) -> bool {
        JsonTransformer.validate_expression(expression)
    }

    fn compile_expression(&self, expression: &str) -> Result<Extractor, TransformError> {
        JsonTransformer.compile_expression(expression)
    }
}

#[test]
fn test_custom_transformer_registered_late() {
    let counting = Arc::new(CountingTransformer {
        parses: AtomicUsize::new(0),
    });
    let registry = Arc::new(TransformerRegistry::default().with(counting.clone()));
    let handler = ResponseHandler::new(registry);
    let mut user = User::new("user-1", "test");

    // No handlers: nothing is parsed, nothing fails
    let empty = RequestTask::new("ping", "/ping", ContentType::Json);
    handler
        .handle(&payload("definitely not json"), &empty, &mut user)
        .unwrap();
    assert_eq!(counting.parses.load(Ordering::SeqCst), 0);

    // Several handlers share a single parse
    let request = json_request(vec![
        Arc::new(SaveHandlerAction::new("a", HandlerAction::new("$.a", ".*"))),
        Arc::new(SaveHandlerAction::new("b", HandlerAction::new("$.b", ".*"))),
    ]);
    handler
        .handle(&payload(r#"{"a": 1, "b": 2}"#), &request, &mut user)
        .unwrap();

    assert_eq!(counting.parses.load(Ordering::SeqCst), 1);
    assert_eq!(user.variables().get("a"), Some("1"));
    assert_eq!(user.variables().get("b"), Some("2"));
}

#[test]
fn test_saved_values_feed_later_handlers() {
    let request = json_request(vec![
        Arc::new(SaveHandlerAction::new("field", HandlerAction::new("$.pick", ".*"))),
        Arc::new(SaveHandlerAction::new(
            "picked",
            HandlerAction::new("$.{{ field }}", ".*"),
        )),
    ]);
    let mut user = User::new("user-1", "test");

    dispatch(&request, &payload(r#"{"pick": "color", "color": "red"}"#), &mut user).unwrap();

    assert_eq!(user.variables().get("picked"), Some("red"));
}

#[test]
fn test_templated_expected_matches() {
    let request = json_request(vec![Arc::new(SaveHandlerAction::new(
        "ids",
        HandlerAction::new("$.items[*].id", ".*")
            .with_expected_matches("{{ count }}")
            .with_as_json(true),
    ))]);
    let body = payload(r#"{"items": [{"id": 1}, {"id": 2}]}"#);

    let mut user = User::new("user-1", "test");
    user.set_context_variable("count", Some("2".to_string()));
    dispatch(&request, &body, &mut user).unwrap();
    assert_eq!(user.variables().get("ids"), Some(r#"["1", "2"]"#));

    user.set_context_variable("count", Some("3".to_string()));
    assert!(dispatch(&request, &body, &mut user).is_err());
    assert_eq!(user.variables().get("ids"), None);

    user.set_context_variable("count", Some("many".to_string()));
    let err = dispatch(&request, &body, &mut user).unwrap_err();
    assert_eq!(err.kind(), FailureKind::TemplateFailure);
}

#[test]
fn test_match_with_capture_group() {
    let request = json_request(vec![Arc::new(SaveHandlerAction::new(
        "order_id",
        HandlerAction::new("$.location", "/orders/([0-9]+)"),
    ))]);
    let mut user = User::new("user-1", "test");

    dispatch(&request, &payload(r#"{"location": "/orders/1234"}"#), &mut user).unwrap();

    assert_eq!(user.variables().get("order_id"), Some("1234"));
}

#[test]
fn test_xml_payload() {
    let mut scenario = Scenario::new("xml");
    scenario.declare_variable("name", None);
    scenario.declare_variable("count", None);
    scenario.add_request(RequestTask::new("list", "/api/list", ContentType::Xml));
    scenario
        .add_save_handler(
            HandlerType::Payload,
            "name",
            HandlerAction::new("/root/item[@id='2']/name", ".*"),
        )
        .unwrap();
    scenario
        .add_save_handler(HandlerType::Payload, "count", HandlerAction::new("count(//item)", ".*"))
        .unwrap();

    let mut user = scenario.create_user("user-1");
    user.add_observer(Arc::new(ResponseHandler::new(scenario.registry())));

    let body = payload(
        "<root><item id=\"1\"><name>first</name></item><item id=\"2\"><name>second</name></item></root>",
    );
    let request = scenario.request("list").unwrap();
    fire_response(&mut user, "list", &body, request).unwrap();

    assert_eq!(user.variables().get("name"), Some("second"));
    assert_eq!(user.variables().get("count"), Some("2"));
}

#[test]
fn test_plain_payload() {
    let mut scenario = Scenario::new("plain");
    scenario.declare_variable("version", None);
    scenario.add_request(RequestTask::new("version", "/version", ContentType::Plain));
    scenario
        .add_save_handler(
            HandlerType::Payload,
            "version",
            HandlerAction::new("version: ([0-9.]+)", ".*"),
        )
        .unwrap();

    let mut user = scenario.create_user("user-1");
    let handler = ResponseHandler::new(scenario.registry());
    let request = scenario.request("version").unwrap();

    handler
        .handle(&payload("version: 2.4.1"), request, &mut user)
        .unwrap();

    assert_eq!(user.variables().get("version"), Some("2.4.1"));
}
