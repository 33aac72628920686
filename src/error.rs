//! Error types shared by the router, remote dispatch and public nodes

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure while calling a remote worker (or the telemetry collector)
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid endpoint '{endpoint}': {detail}")]
    InvalidEndpoint { endpoint: String, detail: String },

    #[error("transport error calling {target}: {detail}")]
    Transport { target: String, detail: String },

    #[error("{target} returned HTTP {status}: {body}")]
    Status {
        target: String,
        status: u16,
        body: String,
    },

    #[error("{target} timed out after {secs}s")]
    Timeout { target: String, secs: u64 },

    #[error("{target} returned an invalid payload: {detail}")]
    InvalidResponse { target: String, detail: String },
}

/// Failure inside a public node
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("unexpected output from {handle}: {detail}")]
    UnexpectedOutput {
        handle: &'static str,
        detail: String,
    },
}

/// Any failure raised while invoking a resolved handler
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Caller-visible error object: `{"type": ..., "message": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorOut {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl ErrorOut {
    pub fn api_error(message: impl Into<String>) -> Self {
        Self {
            kind: "api_error".to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: "invalid_request_error".to_string(),
            message: message.into(),
        }
    }

    /// Generic message used whenever internals must not leak
    pub fn unexpected() -> Self {
        Self::api_error("Unexpected error")
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "type": self.kind, "message": self.message })
    }

    /// Wrap as a handler result flagged as an application-level error
    pub fn into_result(self) -> Value {
        serde_json::json!({ "error": self.to_value() })
    }
}

/// Whether a handler result is an application-level error
pub fn is_error_result(result: &Value) -> bool {
    result.as_object().is_some_and(|obj| obj.contains_key("error"))
}
