//! Request dispatch module
//!
//! Entry point for HTTP request processing: method validation, health checks,
//! body decoding and handing the decoded request to the model router.

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use crate::config::AppState;
use crate::error::ErrorOut;
use crate::http;
use crate::logger::{self, AccessLogEntry};
use crate::router::{ModelRequest, RouterResponse, MODEL_ID_HEADER};

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    let access_log = state.cached_access_log.load(Ordering::Relaxed);
    let entry = access_log.then(|| start_entry(&req, peer_addr));

    let mut response = route_request(req, &state).await;
    if let Ok(name) = HeaderValue::from_str(&state.config.http.server_name) {
        response.headers_mut().insert("Server", name);
    }

    if let Some(mut entry) = entry {
        entry.status = response.status().as_u16();
        entry.body_bytes = response
            .body()
            .size_hint()
            .exact()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or_default();
        entry.content_type = header_string(response.headers(), CONTENT_TYPE.as_str());
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

fn start_entry<B>(req: &Request<B>, peer_addr: SocketAddr) -> AccessLogEntry {
    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.model_id = header_string(req.headers(), MODEL_ID_HEADER);
    entry.user_agent = header_string(req.headers(), USER_AGENT.as_str());
    entry
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// Route by method and path
async fn route_request<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if req.method() == Method::POST {
        return handle_model_request(req, state).await;
    }

    let health = &state.config.http.health;
    let path = req.uri().path();
    let is_health =
        health.enabled && (path == health.liveness_path || path == health.readiness_path);
    match req.method() {
        &Method::OPTIONS => http::build_options_response(state.config.http.enable_cors),
        &Method::GET if is_health => http::build_health_response("ok"),
        &Method::HEAD if is_health => http::without_body(http::build_health_response("ok")),
        method => {
            logger::log_warning(&format!("Method not allowed: {method} {path}"));
            http::build_405_response()
        }
    }
}

/// Decode the body and headers, then let the router handle the request
async fn handle_model_request<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let max_body_size = state.config.http.max_body_size;
    if let Some(resp) = check_body_size(req.headers(), max_body_size) {
        return resp;
    }

    let (parts, body) = req.into_parts();
    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    let bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        // Chunked bodies carry no Content-Length
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            logger::log_error(&format!(
                "Request body exceeded {max_body_size} bytes while streaming"
            ));
            return http::build_413_response(max_body_size);
        }
        Err(e) => {
            logger::log_warning(&format!("Failed to read request body: {e}"));
            return http::build_error_response(
                StatusCode::BAD_REQUEST,
                &ErrorOut::invalid_request("Failed to read request body"),
            );
        }
    };

    let args = match parse_args(&bytes) {
        Ok(args) => args,
        Err(error) => return http::build_error_response(StatusCode::BAD_REQUEST, &error),
    };

    let request = ModelRequest::from_headers(args, &parts.headers);
    let mut response = into_http_response(state.router.handle(request).await);
    if state.config.http.enable_cors {
        response
            .headers_mut()
            .insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    }
    response
}

/// Decode a request body into router arguments; an empty body means no arguments
fn parse_args(body: &[u8]) -> Result<Map<String, Value>, ErrorOut> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(args)) => Ok(args),
        Ok(_) => Err(ErrorOut::invalid_request(
            "Request body must be a JSON object",
        )),
        Err(e) => Err(ErrorOut::invalid_request(format!(
            "Request body is not valid JSON: {e}"
        ))),
    }
}

fn into_http_response(response: RouterResponse) -> Response<Full<Bytes>> {
    match response {
        RouterResponse::Json { status, body } => http::build_json_response(status, &body),
        RouterResponse::Image {
            content_type,
            bytes,
        } => http::build_image_response(content_type, bytes),
    }
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size(headers: &HeaderMap, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let content_length = headers.get(CONTENT_LENGTH)?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_error(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(http::build_413_response(max_body_size))
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', skipping size check"
                ));
                None
            }
            _ => None,
        },
    )
}
