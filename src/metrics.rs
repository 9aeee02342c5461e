use crate::dispatcher::{ResponseContext, ResponseEvent};
use crate::errors::HandlerError;
use crate::request::RequestTask;
use crate::user::User;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use std::env;

lazy_static::lazy_static! {
    pub static ref METRIC_NAMESPACE: String =
        env::var("METRIC_NAMESPACE").unwrap_or_else(|_| "loadtest_handlers".to_string());

    pub static ref RESPONSES_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("response_handler_responses_total", "Number of response notifications received")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["request"]
        ).unwrap();

    pub static ref RESPONSE_FAILURES_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("response_handler_failures_total", "Number of failed responses by failure kind")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["request", "kind"]  // kind: FailureKind::label()
        ).unwrap();
}

/// Registers all metrics with the default Prometheus registry.
pub fn register_metrics() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    prometheus::default_registry().register(Box::new(RESPONSES_TOTAL.clone()))?;
    prometheus::default_registry().register(Box::new(RESPONSE_FAILURES_TOTAL.clone()))?;

    Ok(())
}

/// Gathers and encodes metrics as a string for final output.
pub fn gather_metrics_string(registry: &Registry) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# ERROR ENCODING METRICS: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        eprintln!("Error encoding metrics to UTF-8: {}", e);
        String::from("# ERROR ENCODING METRICS TO UTF-8")
    })
}

/// Counts responses and failures per request.
///
/// A response is counted from its completion notification and a failure from
/// its failure notification. Register it before the `ResponseHandler` so it
/// receives both for every response.
#[derive(Debug, Default)]
pub struct MetricsObserver;

impl MetricsObserver {
    pub const NAME: &'static str = "metrics";
}

impl ResponseEvent for MetricsObserver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn on_response(
        &self,
        name: &str,
        _context: &ResponseContext,
        _request: &RequestTask,
        _user: &mut User,
        exception: Option<&HandlerError>,
    ) -> Result<(), HandlerError> {
        match exception {
            None => RESPONSES_TOTAL.with_label_values(&[name]).inc(),
            Some(e) => RESPONSE_FAILURES_TOTAL
                .with_label_values(&[name, e.kind().label()])
                .inc(),
        }

        Ok(())
    }
}
