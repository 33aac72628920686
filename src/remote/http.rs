//! HTTP worker client
//!
//! Invokes remote handles by POSTing the call as JSON to the handle's
//! endpoint. Shared with the telemetry collector via [`post_json`].

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use std::time::Duration;

use super::{WorkerCall, WorkerClient};
use crate::config::WorkersConfig;
use crate::error::DispatchError;
use crate::logger;

/// Pooled HTTP/1.1 client
pub type HttpClient = Client<HttpConnector, Full<Bytes>>;

pub fn build_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// POST a JSON body and return the response body on a 2xx status
///
/// `target` names the callee in errors.
pub async fn post_json(
    client: &HttpClient,
    target: &str,
    url: &str,
    body: Vec<u8>,
    timeout: Duration,
) -> Result<Bytes, DispatchError> {
    let request = Request::post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .map_err(|e| DispatchError::InvalidEndpoint {
            endpoint: url.to_string(),
            detail: e.to_string(),
        })?;

    let exchange = async {
        let response = client
            .request(request)
            .await
            .map_err(|e| DispatchError::Transport {
                target: target.to_string(),
                detail: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| DispatchError::Transport {
                target: target.to_string(),
                detail: e.to_string(),
            })?
            .to_bytes();

        if status.is_success() {
            Ok::<Bytes, DispatchError>(body)
        } else {
            Err(DispatchError::Status {
                target: target.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            })
        }
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .unwrap_or_else(|_| {
            Err(DispatchError::Timeout {
                target: target.to_string(),
                secs: timeout.as_secs(),
            })
        })
}

/// Worker client backed by plain HTTP endpoints
pub struct HttpWorkerClient {
    client: HttpClient,
    config: WorkersConfig,
}

impl HttpWorkerClient {
    #[cfg(test)]
    pub fn new(config: WorkersConfig) -> Self {
        Self {
            client: build_client(),
            config,
        }
    }

    pub fn with_client(client: HttpClient, config: WorkersConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn invoke(&self, call: WorkerCall<'_>) -> Result<Value, DispatchError> {
        let target = call.handle.name();
        let url = self.config.endpoint_for(target);
        let body = serde_json::to_vec(&call).map_err(|e| DispatchError::InvalidResponse {
            target: target.to_string(),
            detail: format!("failed to encode call: {e}"),
        })?;

        logger::log_debug(&format!("POST {url} ({} bytes)", body.len()));

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let bytes = post_json(&self.client, target, &url, body, timeout).await?;

        serde_json::from_slice(&bytes).map_err(|e| DispatchError::InvalidResponse {
            target: target.to_string(),
            detail: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{RemoteHandle, VariantOptions};
    use crate::router::RequestContext;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use serde_json::{json, Map};
    use std::collections::HashMap;
    use std::convert::Infallible;
    use tokio::net::TcpListener;

    /// Serve one canned response per connection and echo the request body back
    /// under `"echo"` when the status is 200.
    async fn spawn_worker(status: StatusCode) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<hyper::body::Incoming>| async move {
                        let path = req.uri().path().to_string();
                        let body = req.into_body().collect().await.map(|c| c.to_bytes());
                        let echo: Value = body
                            .ok()
                            .and_then(|b| serde_json::from_slice(&b).ok())
                            .unwrap_or(Value::Null);
                        let payload = json!({"path": path, "echo": echo}).to_string();
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::from(payload)))
                                .expect("response"),
                        )
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn client_for(base_url: String) -> HttpWorkerClient {
        HttpWorkerClient::new(WorkersConfig {
            base_url,
            timeout_secs: 5,
            endpoints: HashMap::new(),
        })
    }

    #[tokio::test]
    async fn test_invoke_posts_call_envelope() {
        let client = client_for(spawn_worker(StatusCode::OK).await);
        let args: Map<String, Value> = json!({"prompt": "a red fox"})
            .as_object()
            .cloned()
            .unwrap_or_default();
        let options = VariantOptions::StableDiffusionXl {
            use_ssd: Some(true),
            use_hosted_url: None,
        };
        let context = RequestContext {
            model_id: "sdxl".to_string(),
            version: None,
            accept: None,
        };

        let result = client
            .invoke(WorkerCall {
                handle: RemoteHandle::StableDiffusionXl,
                args: &args,
                options: &options,
                context: &context,
            })
            .await
            .expect("worker answers");

        assert_eq!(result["path"], "/sdxl");
        assert_eq!(result["echo"]["handle"], "sdxl");
        assert_eq!(result["echo"]["args"]["prompt"], "a red fox");
        assert_eq!(result["echo"]["options"]["use_ssd"], true);
        assert_eq!(result["echo"]["context"]["model_id"], "sdxl");
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let client = client_for(spawn_worker(StatusCode::BAD_GATEWAY).await);
        let args = Map::new();
        let context = RequestContext {
            model_id: "lama".to_string(),
            version: None,
            accept: None,
        };

        let err = client
            .invoke(WorkerCall {
                handle: RemoteHandle::Lama,
                args: &args,
                options: &VariantOptions::None,
                context: &context,
            })
            .await
            .expect_err("502 must fail");

        assert!(matches!(err, DispatchError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_worker_is_transport_error() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("addr")
        };
        let err = post_json(
            &build_client(),
            "esrgan",
            &format!("http://{addr}/esrgan"),
            b"{}".to_vec(),
            Duration::from_secs(2),
        )
        .await
        .expect_err("nothing listening");
        assert!(matches!(err, DispatchError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_invalid_url_is_invalid_endpoint() {
        let err = post_json(
            &build_client(),
            "xtts",
            "not a url",
            Vec::new(),
            Duration::from_secs(1),
        )
        .await
        .expect_err("bad url");
        assert!(matches!(err, DispatchError::InvalidEndpoint { .. }));
    }
}
