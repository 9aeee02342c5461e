use std::process;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use loadtest_handlers::config::{Config, LogFormat};
use loadtest_handlers::dispatcher::{fire_failure, fire_response, ResponseHandler};
use loadtest_handlers::errors::HandlerError;
use loadtest_handlers::metrics::{gather_metrics_string, register_metrics, MetricsObserver};
use loadtest_handlers::yaml_config::YamlConfig;

/// Prints helpful configuration documentation.
fn print_config_help() {
    eprintln!("Required environment variables:");
    eprintln!("  SCENARIO_FILE           - YAML test plan declaring variables, requests and handlers");
    eprintln!();
    eprintln!("Optional environment variables:");
    eprintln!("  RESPONSE_FILE           - Captured response payload (default: empty payload)");
    eprintln!("  METADATA_FILE           - Captured response metadata as a JSON object");
    eprintln!("  REQUEST_NAME            - Request in the plan the response belongs to (default: first)");
    eprintln!("  STATUS_CODE             - Response status code checked against the request's accepted codes");
    eprintln!("  USER_NAME               - Name of the simulated user (default: user-1)");
    eprintln!("  LOG_FORMAT              - text or json (default: text)");
    eprintln!("  RUST_LOG                - Log filter (default: info)");
    eprintln!("  METRIC_NAMESPACE        - Prometheus metric namespace (default: loadtest_handlers)");
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            process::exit(1);
        }
    };

    init_logging(config.log_format);
    register_metrics()?;

    config.print_summary();

    let plan = YamlConfig::from_file(&config.scenario_file)?;
    let scenario = plan.to_scenario()?;

    let request = match &config.request_name {
        Some(name) => scenario.request(name),
        None => scenario.requests().first(),
    };
    let Some(request) = request else {
        eprintln!(
            "Request '{}' not found in scenario '{}'",
            config.request_name.as_deref().unwrap_or("<first>"),
            scenario.name()
        );
        process::exit(1);
    };

    let context = config.load_response()?;

    let mut user = scenario.create_user(config.user_name.clone());
    user.add_observer(Arc::new(MetricsObserver));
    user.add_observer(Arc::new(ResponseHandler::new(scenario.registry())));

    let status_failure = match (config.status_code, request.response()) {
        (Some(status), Some(response)) if !response.accepts(status) => {
            Some(HandlerError::StatusCode {
                status,
                expected: response.status_codes(),
            })
        }
        _ => None,
    };

    let result = match status_failure {
        Some(e) => {
            // Handlers never run on a rejected status
            fire_failure(&mut user, request.name(), &context, request, &e, None);
            Err(e)
        }
        None => fire_response(&mut user, request.name(), &context, request),
    };

    println!("--- VARIABLES ---");
    let mut variables: Vec<_> = user.variables().iter().collect();
    variables.sort_by(|a, b| a.0.cmp(b.0));
    for (name, value) in variables {
        println!("{} = {}", name, value.as_deref().unwrap_or("<none>"));
    }

    println!("\n--- FINAL METRICS ---\n{}", gather_metrics_string(prometheus::default_registry()));
    println!("--- END OF FINAL METRICS ---\n");

    match result {
        Ok(()) => {
            info!(request = %request.name(), "Response passed all handlers");
            Ok(())
        }
        Err(e) => {
            error!(
                request = %request.name(),
                failure_action = ?user.failure_action(),
                error = %e,
                "Response check failed"
            );
            eprintln!("FAILED: {} (failure action: {:?})", e, user.failure_action());
            process::exit(1);
        }
    }
}
