//! Inbound request model
//!
//! A `ModelRequest` is built once per HTTP call and never mutated afterwards.

use hyper::header::{HeaderMap, ACCEPT};
use serde::Serialize;
use serde_json::{Map, Value};

/// Header selecting the handler
pub const MODEL_ID_HEADER: &str = "x-model-id";
/// Optional header used by the legacy image family's input negotiation
pub const VERSION_HEADER: &str = "x-substrate-version";

/// Decoded request: body arguments plus the headers the router consumes
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub args: Map<String, Value>,
    pub accept: Option<String>,
    pub model_id: Option<String>,
    pub version: Option<String>,
}

impl ModelRequest {
    #[cfg(test)]
    pub fn new(args: Map<String, Value>) -> Self {
        Self {
            args,
            ..Self::default()
        }
    }

    /// Build from a decoded body and the raw request headers
    pub fn from_headers(args: Map<String, Value>, headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
        };

        Self {
            args,
            accept: header(ACCEPT.as_str()),
            model_id: header(MODEL_ID_HEADER),
            version: header(VERSION_HEADER),
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_model_id(mut self, model_id: &str) -> Self {
        self.model_id = Some(model_id.to_string());
        self
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_accept(mut self, accept: &str) -> Self {
        self.accept = Some(accept.to_string());
        self
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// Request-scoped context handed to the resolved handler
    pub fn context(&self, model_id: &str) -> RequestContext {
        RequestContext {
            model_id: model_id.to_string(),
            version: self.version.clone(),
            accept: self.accept.clone(),
        }
    }
}

/// Metadata visible to handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept: Option<String>,
}
