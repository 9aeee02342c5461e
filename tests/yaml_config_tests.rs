//! Integration tests for YAML test plans.
//!
//! Plans are written to temporary files, loaded, and then used to check
//! captured responses end to end.

use loadtest_handlers::content_type::ContentType;
use loadtest_handlers::dispatcher::{fire_response, ResponseContext, ResponseHandler};
use loadtest_handlers::errors::ConfigError;
use loadtest_handlers::metrics::MetricsObserver;
use loadtest_handlers::user::FailureAction;
use loadtest_handlers::yaml_config::{YamlConfig, YamlConfigError};
use serde_json::{Map, Value};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const PLAN: &str = r#"
version: "1.0"
scenario:
  name: "orders"
  failure: restart_scenario
  variables:
    token: null
    order_id: null
    item_count: 2
  requests:
    - name: "login"
      endpoint: "/api/login"
      contentType: "application/json; charset=utf-8"
      handlers:
        - type: save
          variable: token
          expression: "$.token"
        - type: validate
          condition: true
          expression: "$.status"
          matchWith: "locked"
    - name: "create-order"
      endpoint: "/api/orders"
      contentType: json
      statusCodes: [201, -200]
      handlers:
        - type: save
          target: metadata
          variable: order_id
          expression: "$.location"
          matchWith: "/orders/([0-9]+)"
        - type: validate
          condition: false
          expression: "$.items[*].sku"
          expectedMatches: "{{ item_count }}"
    - name: "health"
      endpoint: "/health"
"#;

fn write_plan(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_plan_from_file() {
    let file = write_plan(PLAN);
    let config = YamlConfig::from_file(file.path()).unwrap();

    assert_eq!(config.version, "1.0");
    assert_eq!(config.scenario.name, "orders");
    assert_eq!(config.scenario.requests.len(), 3);

    let scenario = config.to_scenario().unwrap();
    assert_eq!(scenario.failure_action(), FailureAction::RestartScenario);

    let login = scenario.request("login").unwrap().response().unwrap();
    assert_eq!(login.content_type(), ContentType::Json);
    assert_eq!(login.payload_handlers().len(), 2);
    assert_eq!(login.status_codes(), vec![200]);

    let order = scenario.request("create-order").unwrap().response().unwrap();
    assert_eq!(order.status_codes(), vec![201]);
    assert_eq!(order.metadata_handlers().len(), 1);
    assert_eq!(order.payload_handlers().len(), 1);

    let health = scenario.request("health").unwrap().response().unwrap();
    assert_eq!(health.content_type(), ContentType::Undefined);
    assert!(!health.has_handlers());
}

#[test]
fn test_missing_file() {
    let result = YamlConfig::from_file("/nonexistent/plan.yaml");
    assert!(matches!(result, Err(YamlConfigError::FileRead(_))));
}

#[test]
fn test_malformed_yaml() {
    let file = write_plan("version: \"1.0\"\nscenario: [not, a, map]\n");
    let result = YamlConfig::from_file(file.path());
    assert!(matches!(result, Err(YamlConfigError::YamlParse(_))));
}

#[test]
fn test_payload_handler_on_undefined_content_type() {
    let yaml = r#"
version: "1.0"
scenario:
  name: "bad"
  variables:
    body: null
  requests:
    - name: "raw"
      endpoint: "/raw"
      handlers:
        - type: save
          variable: body
          expression: ".*"
"#;

    let err = YamlConfig::from_str(yaml).unwrap().to_scenario().unwrap_err();

    match err {
        YamlConfigError::Handler { request, source } => {
            assert_eq!(request, "raw");
            assert_eq!(source, ConfigError::UndefinedContentType("raw".to_string()));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_invalid_expression_rejected_at_load() {
    let yaml = r#"
version: "1.0"
scenario:
  name: "bad"
  requests:
    - name: "feed"
      endpoint: "/feed.xml"
      contentType: xml
      handlers:
        - type: validate
          condition: false
          expression: "//item["
"#;

    let err = YamlConfig::from_str(yaml).unwrap().to_scenario().unwrap_err();
    assert!(err.to_string().contains("feed"));
}

#[test]
fn test_plan_end_to_end() {
    let file = write_plan(PLAN);
    let scenario = YamlConfig::from_file(file.path())
        .unwrap()
        .to_scenario()
        .unwrap();

    let mut user = scenario.create_user("user-1");
    user.add_observer(Arc::new(MetricsObserver));
    user.add_observer(Arc::new(ResponseHandler::new(scenario.registry())));
    assert_eq!(user.variables().get("item_count"), Some("2"));

    // login: token saved, status is not "locked"
    let login = scenario.request("login").unwrap();
    let context = ResponseContext::new(
        None,
        Some(r#"{"token": "abc123", "status": "active"}"#.to_string()),
    );
    fire_response(&mut user, "login", &context, login).unwrap();
    assert_eq!(user.variables().get("token"), Some("abc123"));

    // create-order: id from the location header, exactly item_count skus
    let order = scenario.request("create-order").unwrap();
    let mut metadata = Map::new();
    metadata.insert("location".to_string(), Value::String("/orders/77".to_string()));
    let context = ResponseContext::new(
        Some(metadata.clone()),
        Some(r#"{"items": [{"sku": "A-1"}, {"sku": "B-2"}]}"#.to_string()),
    );
    fire_response(&mut user, "create-order", &context, order).unwrap();
    assert_eq!(user.variables().get("order_id"), Some("77"));

    // Three skus where two are expected
    let context = ResponseContext::new(
        Some(metadata),
        Some(r#"{"items": [{"sku": "A-1"}, {"sku": "B-2"}, {"sku": "C-3"}]}"#.to_string()),
    );
    let err = fire_response(&mut user, "create-order", &context, order).unwrap_err();
    assert_eq!(err.to_string(), r#""$.items[*].sku": ".*" was None"#);
    assert_eq!(user.failure_action(), FailureAction::RestartScenario);

    // A locked account fails validation
    let context = ResponseContext::new(None, Some(r#"{"token": "t", "status": "locked"}"#.to_string()));
    let err = fire_response(&mut user, "login", &context, login).unwrap_err();
    assert!(err.to_string().contains("was locked"));
}
