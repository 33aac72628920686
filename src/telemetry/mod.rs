//! Error telemetry
//!
//! Every router error path files an [`ErrorReport`]. Sinks must return
//! immediately: delivery happens off the request path and its own failures
//! never reach the caller.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::logger;
use crate::remote::http::{post_json, HttpClient};
use crate::router::ModelRequest;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Which error path produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    MissingModel,
    UnknownModel,
    HandlerFault,
    ApplicationError,
}

/// One error report with the request it belongs to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: ReportKind,
    pub error: Value,
    pub model_id: Option<String>,
    pub version: Option<String>,
    pub args: Map<String, Value>,
}

impl ErrorReport {
    pub fn new(kind: ReportKind, error: Value, request: &ModelRequest) -> Self {
        Self {
            kind,
            error,
            model_id: request.model_id.clone(),
            version: request.version.clone(),
            args: request.args.clone(),
        }
    }
}

/// Fire-and-forget error sink
pub trait TelemetrySink: Send + Sync {
    fn report(&self, report: ErrorReport);
}

/// Writes reports to the error log
pub struct LogTelemetry;

impl TelemetrySink for LogTelemetry {
    fn report(&self, report: ErrorReport) {
        let line = serde_json::to_string(&report)
            .unwrap_or_else(|e| format!("unserializable report ({e}): {report:?}"));
        logger::log_telemetry_report(&line);
    }
}

/// POSTs reports to a collector on a detached task
pub struct HttpTelemetry {
    client: HttpClient,
    endpoint: Arc<str>,
}

impl HttpTelemetry {
    pub fn new(client: HttpClient, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: Arc::from(endpoint),
        }
    }
}

impl TelemetrySink for HttpTelemetry {
    fn report(&self, report: ErrorReport) {
        let body = match serde_json::to_vec(&report) {
            Ok(body) => body,
            Err(e) => {
                logger::log_telemetry_failure(&format!("encode: {e}"));
                return;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            logger::log_telemetry_failure("no async runtime available");
            return;
        };

        let client = self.client.clone();
        let endpoint = Arc::clone(&self.endpoint);
        runtime.spawn(async move {
            if let Err(e) = post_json(&client, "telemetry", &endpoint, body, DELIVERY_TIMEOUT).await
            {
                logger::log_telemetry_failure(&e.to_string());
            }
        });
    }
}

#[cfg(test)]
pub mod testing {
    //! Recording sink shared by the router and HTTP handler tests

    use super::{ErrorReport, TelemetrySink};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingTelemetry {
        reports: Mutex<Vec<ErrorReport>>,
    }

    impl RecordingTelemetry {
        pub fn reports(&self) -> Vec<ErrorReport> {
            self.reports.lock().map(|r| r.clone()).unwrap_or_default()
        }
    }

    impl TelemetrySink for RecordingTelemetry {
        fn report(&self, report: ErrorReport) {
            if let Ok(mut reports) = self.reports.lock() {
                reports.push(report);
            }
        }
    }
}
