//! HTTP response building module
//!
//! Builders for the responses the router sends, decoupled from routing logic.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde_json::Value;

use crate::error::ErrorOut;

/// Build JSON response
pub fn build_json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let json = serde_json::to_vec(body).unwrap_or_else(|e| {
        log_build_error("JSON", &e);
        ErrorOut::unexpected().to_value().to_string().into_bytes()
    });

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Content-Length", json.len())
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build `{"type": ..., "message": ...}` error response
pub fn build_error_response(status: StatusCode, error: &ErrorOut) -> Response<Full<Bytes>> {
    build_json_response(status, &error.to_value())
}

/// Build raw image response
pub fn build_image_response(content_type: &str, bytes: Bytes) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", content_type)
        .header("Content-Length", bytes.len())
        .body(Full::new(bytes))
        .unwrap_or_else(|e| {
            log_build_error("image", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<Full<Bytes>> {
    let mut response = build_error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &ErrorOut::invalid_request("Method not allowed"),
    );
    response.headers_mut().insert(
        "Allow",
        hyper::header::HeaderValue::from_static("POST, OPTIONS"),
    );
    response
}

/// Build 413 Payload Too Large response
pub fn build_413_response(max_body_size: u64) -> Response<Full<Bytes>> {
    build_error_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        &ErrorOut::invalid_request(format!(
            "Request body exceeds {max_body_size} bytes"
        )),
    )
}

/// Build OPTIONS response (preflight request)
pub fn build_options_response(enable_cors: bool) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Allow", "POST, OPTIONS");

    if enable_cors {
        builder = builder
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "POST, OPTIONS")
            .header(
                "Access-Control-Allow-Headers",
                "Content-Type, Accept, X-Model-Id, X-Substrate-Version",
            )
            .header("Access-Control-Max-Age", "86400");
    }

    builder.body(Full::new(Bytes::new())).unwrap_or_else(|e| {
        log_build_error("OPTIONS", &e);
        Response::new(Full::new(Bytes::new()))
    })
}

/// Build health check response
pub fn build_health_response(status: &str) -> Response<Full<Bytes>> {
    build_json_response(StatusCode::OK, &serde_json::json!({ "status": status }))
}

/// Drop the body of a built response, keeping status and headers (HEAD)
pub fn without_body(response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let (parts, _) = response.into_parts();
    Response::from_parts(parts, Full::new(Bytes::new()))
}

/// Log response build error
fn log_build_error(kind: &str, error: &dyn std::fmt::Display) {
    crate::logger::log_error(&format!("Failed to build {kind} response: {error}"));
}
