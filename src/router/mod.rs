//! Request router
//!
//! Maps the `x-model-id` of a decoded request onto a handler, runs it and
//! shapes the result. Remote handles are looked up before public nodes, so a
//! node can never shadow a handle of the same name.
//!
//! Every failure is turned into a response here; nothing propagates to the
//! HTTP layer.

pub mod image;
pub mod request;

pub use image::{StorageIntent, StoreArgument, IMAGE_CONTENT_TYPE};
pub use request::{ModelRequest, RequestContext, MODEL_ID_HEADER};

use hyper::body::Bytes;
use hyper::StatusCode;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::error::{is_error_result, ErrorOut, HandlerError};
use crate::logger;
use crate::nodes::{NodeContext, NodeRegistry, PublicNode};
use crate::remote::{RemoteDispatch, RemoteHandle, WorkerClient};
use crate::telemetry::{ErrorReport, ReportKind, TelemetrySink};

/// Shaped router output, converted to an HTTP response by the handler layer
#[derive(Debug, Clone, PartialEq)]
pub enum RouterResponse {
    Json { status: StatusCode, body: Value },
    Image { content_type: &'static str, bytes: Bytes },
}

impl RouterResponse {
    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Json { status, .. } => *status,
            Self::Image { .. } => StatusCode::OK,
        }
    }

    fn error(status: StatusCode, error: &ErrorOut) -> Self {
        Self::Json {
            status,
            body: error.to_value(),
        }
    }
}

/// The handler a model id resolved to
pub enum Handler {
    Remote(RemoteDispatch),
    Public(Box<dyn PublicNode>),
}

impl Handler {
    /// Short label for logs
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Remote(_) => "remote",
            Self::Public(_) => "public node",
        }
    }

    async fn invoke(
        &self,
        workers: &dyn WorkerClient,
        args: &Map<String, Value>,
        context: &RequestContext,
    ) -> Result<Value, HandlerError> {
        match self {
            Self::Remote(dispatch) => Ok(dispatch.run(workers, args, context).await?),
            Self::Public(node) => {
                let ctx = NodeContext {
                    request: context,
                    workers,
                };
                Ok(node.run(&ctx).await?)
            }
        }
    }

    fn negotiates_image(&self) -> bool {
        matches!(self, Self::Remote(dispatch) if dispatch.handle.negotiates_image())
    }
}

/// Stateless router; shared by every connection
pub struct Router {
    nodes: NodeRegistry,
    workers: Arc<dyn WorkerClient>,
    telemetry: Arc<dyn TelemetrySink>,
    storage: Arc<dyn StorageIntent>,
}

impl Router {
    pub fn new(
        nodes: NodeRegistry,
        workers: Arc<dyn WorkerClient>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            nodes,
            workers,
            telemetry,
            storage: Arc::new(StoreArgument),
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn StorageIntent>) -> Self {
        self.storage = storage;
        self
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    /// Resolve a model id, remote handles first
    pub fn resolve(&self, model_id: &str, args: &Map<String, Value>) -> Option<Handler> {
        if let Some(handle) = RemoteHandle::from_model_id(model_id) {
            return Some(Handler::Remote(RemoteDispatch::new(handle, args)));
        }
        self.nodes
            .construct(model_id, args.clone())
            .map(Handler::Public)
    }

    /// Handle one request end to end
    pub async fn handle(&self, request: ModelRequest) -> RouterResponse {
        let Some(model_id) = request.model_id.as_deref() else {
            let error = ErrorOut::api_error(format!("Missing {MODEL_ID_HEADER} header"));
            self.report(ReportKind::MissingModel, error.to_value(), &request);
            return RouterResponse::error(StatusCode::NOT_FOUND, &error);
        };

        let Some(handler) = self.resolve(model_id, &request.args) else {
            let error = ErrorOut::api_error(format!("Model not found: {model_id}"));
            self.report(ReportKind::UnknownModel, error.to_value(), &request);
            return RouterResponse::error(StatusCode::NOT_FOUND, &error);
        };

        logger::log_dispatch(model_id, handler.describe());
        let context = request.context(model_id);

        let result = match handler
            .invoke(self.workers.as_ref(), &request.args, &context)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                let detail = e.to_string();
                logger::log_handler_fault(model_id, &detail);
                self.report(ReportKind::HandlerFault, Value::String(detail), &request);
                return RouterResponse::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &ErrorOut::unexpected(),
                );
            }
        };

        if is_error_result(&result) {
            self.report(ReportKind::ApplicationError, result.clone(), &request);
            return RouterResponse::Json {
                status: StatusCode::BAD_REQUEST,
                body: result,
            };
        }

        if handler.negotiates_image() {
            if let Some(bytes) = image::negotiate_image(
                &result,
                &request.args,
                request.version.as_deref(),
                request.accept.as_deref(),
                self.storage.as_ref(),
            ) {
                return RouterResponse::Image {
                    content_type: IMAGE_CONTENT_TYPE,
                    bytes: Bytes::from(bytes),
                };
            }
        }

        RouterResponse::Json {
            status: StatusCode::OK,
            body: json!({ "data": result }),
        }
    }

    fn report(&self, kind: ReportKind, error: Value, request: &ModelRequest) {
        self.telemetry.report(ErrorReport::new(kind, error, request));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::testing::ScriptedWorkers;
    use crate::remote::VariantOptions;
    use crate::telemetry::testing::RecordingTelemetry;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    const JPEG: [u8; 6] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    struct Fixture {
        router: Router,
        workers: Arc<ScriptedWorkers>,
        telemetry: Arc<RecordingTelemetry>,
    }

    fn fixture(workers: ScriptedWorkers) -> Fixture {
        let workers = Arc::new(workers);
        let telemetry = Arc::new(RecordingTelemetry::default());
        let router = Router::new(
            NodeRegistry::builtin(),
            Arc::clone(&workers) as Arc<dyn WorkerClient>,
            Arc::clone(&telemetry) as Arc<dyn TelemetrySink>,
        );
        Fixture {
            router,
            workers,
            telemetry,
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn sdxl_reply() -> Value {
        json!({"data": [{"uri": STANDARD.encode(JPEG), "seed": 42}]})
    }

    fn json_parts(response: RouterResponse) -> (StatusCode, Value) {
        match response {
            RouterResponse::Json { status, body } => (status, body),
            RouterResponse::Image { .. } => panic!("expected JSON, got image"),
        }
    }

    #[tokio::test]
    async fn test_missing_model_id_is_404() {
        let f = fixture(ScriptedWorkers::default());
        let (status, body) = json_parts(f.router.handle(ModelRequest::new(Map::new())).await);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["type"], "api_error");

        let reports = f.telemetry.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, ReportKind::MissingModel);
        assert!(f.workers.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_model_id_is_404() {
        let f = fixture(ScriptedWorkers::default());
        let request = ModelRequest::new(Map::new()).with_model_id("gpt-17");
        let (status, body) = json_parts(f.router.handle(request).await);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["type"], "api_error");
        assert_eq!(body["message"], "Model not found: gpt-17");

        let reports = f.telemetry.reports();
        assert_eq!(reports[0].kind, ReportKind::UnknownModel);
        assert_eq!(reports[0].model_id.as_deref(), Some("gpt-17"));
        assert!(f.workers.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remote_success_wraps_data() {
        let f = fixture(
            ScriptedWorkers::default().reply(RemoteHandle::Whisper, json!({"text": "hi"})),
        );
        let request = ModelRequest::new(args(json!({"audio_url": "a.mp3"}))).with_model_id("whisper");
        let (status, body) = json_parts(f.router.handle(request).await);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"data": {"text": "hi"}}));
        assert!(f.telemetry.reports().is_empty());

        let (handle, sent, options) = f.workers.last_call().expect("one call");
        assert_eq!(handle, RemoteHandle::Whisper);
        assert_eq!(sent, args(json!({"audio_url": "a.mp3"})));
        assert_eq!(options, VariantOptions::None);
    }

    #[tokio::test]
    async fn test_remote_fault_is_opaque_500() {
        let f = fixture(ScriptedWorkers::default().fail(RemoteHandle::Esrgan));
        let request = ModelRequest::new(Map::new()).with_model_id("esrgan");
        let (status, body) = json_parts(f.router.handle(request).await);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"type": "api_error", "message": "Unexpected error"}));
        assert!(!body.to_string().contains("connection reset"));

        let reports = f.telemetry.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, ReportKind::HandlerFault);
        assert!(reports[0]
            .error
            .as_str()
            .is_some_and(|e| e.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_public_node_fault_is_opaque_500() {
        let f = fixture(ScriptedWorkers::default().fail(RemoteHandle::Mistral7bInstruct));
        let request =
            ModelRequest::new(args(json!({"prompt": "hi"}))).with_model_id("GenerateText");
        let (status, body) = json_parts(f.router.handle(request).await);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Unexpected error");
        assert_eq!(f.telemetry.reports()[0].kind, ReportKind::HandlerFault);
    }

    #[tokio::test]
    async fn test_error_result_passes_through_as_400() {
        let f = fixture(ScriptedWorkers::default());
        let request = ModelRequest::new(args(json!({"image_uri": "in.png"})))
            .with_model_id("DetectSegments");
        let (status, body) = json_parts(f.router.handle(request).await);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"error": {
                "type": "invalid_request_error",
                "message": "One of `point_prompts` or `box_prompts` must be set."
            }})
        );
        let reports = f.telemetry.reports();
        assert_eq!(reports[0].kind, ReportKind::ApplicationError);
        assert_eq!(reports[0].error, body);
    }

    #[tokio::test]
    async fn test_remote_error_result_passes_through_as_400() {
        let worker_error = json!({"error": {"type": "worker_error", "message": "bad seed"}});
        let f = fixture(
            ScriptedWorkers::default().reply(RemoteHandle::Lama, worker_error.clone()),
        );
        let request = ModelRequest::new(Map::new()).with_model_id("lama");
        let (status, body) = json_parts(f.router.handle(request).await);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, worker_error);
    }

    #[tokio::test]
    async fn test_sdxl_negotiates_jpeg() {
        let f = fixture(ScriptedWorkers::default().reply(RemoteHandle::StableDiffusionXl, sdxl_reply()));
        let request = ModelRequest::new(args(json!({"prompt": "a fox"})))
            .with_model_id("sdxl")
            .with_accept("image/png, image/*");
        let response = f.router.handle(request).await;
        assert_eq!(
            response,
            RouterResponse::Image {
                content_type: "image/jpeg",
                bytes: Bytes::from_static(&JPEG),
            }
        );
    }

    #[tokio::test]
    async fn test_sdxl_json_when_not_accepting_images() {
        let f = fixture(ScriptedWorkers::default().reply(RemoteHandle::StableDiffusionXl, sdxl_reply()));
        let request = ModelRequest::new(Map::new())
            .with_model_id("sdxl")
            .with_accept("application/json");
        let (status, body) = json_parts(f.router.handle(request).await);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"data": sdxl_reply()}));
    }

    #[tokio::test]
    async fn test_sdxl_json_when_storage_requested() {
        let f = fixture(ScriptedWorkers::default().reply(RemoteHandle::StableDiffusionXl, sdxl_reply()));
        let request = ModelRequest::new(args(json!({"store": true})))
            .with_model_id("sdxl")
            .with_accept("image/*");
        let (status, body) = json_parts(f.router.handle(request).await);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], sdxl_reply());
    }

    #[tokio::test]
    async fn test_sdxl_json_for_hosted_urls() {
        let f = fixture(ScriptedWorkers::default().reply(
            RemoteHandle::StableDiffusionXl,
            json!({"data": [{"uri": "https://cdn/img.jpg"}]}),
        ));
        let request = ModelRequest::new(Map::new())
            .with_model_id("sdxl")
            .with_accept("image/*");
        assert!(matches!(
            f.router.handle(request).await,
            RouterResponse::Json { .. }
        ));
    }

    #[tokio::test]
    async fn test_other_families_never_negotiate() {
        let f = fixture(
            ScriptedWorkers::default().reply(RemoteHandle::StableDiffusionXlLightning, sdxl_reply()),
        );
        let request = ModelRequest::new(Map::new())
            .with_model_id("stablediffusionxl_lightning")
            .with_accept("image/*");
        let (status, _) = json_parts(f.router.handle(request).await);
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sdxl_options_forwarded() {
        let f = fixture(ScriptedWorkers::default().reply(RemoteHandle::StableDiffusionXl, sdxl_reply()));
        let request = ModelRequest::new(args(json!({"prompt": "p", "use_ssd": true})))
            .with_model_id("sdxl")
            .with_version("20240311");
        f.router.handle(request).await;
        let (_, sent, options) = f.workers.last_call().expect("one call");
        assert_eq!(sent["use_ssd"], json!(true));
        assert_eq!(
            options,
            VariantOptions::StableDiffusionXl {
                use_ssd: Some(true),
                use_hosted_url: None,
            }
        );
    }

    struct LegacyVersionStores;

    impl StorageIntent for LegacyVersionStores {
        fn wants_storage(&self, _args: &Map<String, Value>, version: Option<&str>) -> bool {
            version == Some("legacy")
        }
    }

    #[tokio::test]
    async fn test_custom_storage_intent_sees_version() {
        let f = fixture(ScriptedWorkers::default().reply(RemoteHandle::StableDiffusionXl, sdxl_reply()));
        let router = f.router.with_storage(Arc::new(LegacyVersionStores));
        let request = ModelRequest::new(Map::new())
            .with_model_id("sdxl")
            .with_accept("image/*")
            .with_version("legacy");
        assert!(matches!(router.handle(request).await, RouterResponse::Json { .. }));
    }

    #[tokio::test]
    async fn test_deterministic_handlers_are_idempotent() {
        let f = fixture(
            ScriptedWorkers::default().reply(RemoteHandle::Isnet, json!({"image_uri": "u"})),
        );
        let request = ModelRequest::new(args(json!({"image_uri": "in.png"})))
            .with_model_id("RemoveBackground");
        let first = f.router.handle(request.clone()).await;
        let second = f.router.handle(request).await;
        assert_eq!(first, second);
        assert_eq!(f.workers.calls().len(), 2);
    }

    #[test]
    fn test_resolve_prefers_remote_handles() {
        let f = fixture(ScriptedWorkers::default());
        assert!(matches!(
            f.router.resolve("sdxl", &Map::new()),
            Some(Handler::Remote(_))
        ));
        assert!(matches!(
            f.router.resolve("FillMask", &Map::new()),
            Some(Handler::Public(_))
        ));
        assert!(f.router.resolve("nope", &Map::new()).is_none());
    }
}
