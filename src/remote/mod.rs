//! Remote compute handles
//!
//! A fixed table of externally hosted model families and the `WorkerClient`
//! seam used to invoke them. The router resolves a model id against this
//! table before it looks at the public-node registry.

pub mod http;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::DispatchError;
use crate::router::RequestContext;

pub use http::HttpWorkerClient;

/// Externally hosted model family, invoked by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteHandle {
    Mistral7bInstruct,
    Firellava,
    /// Legacy Stable Diffusion XL family; the only one with image negotiation
    StableDiffusionXl,
    StableDiffusionXlLightning,
    StableDiffusionXlIpAdapter,
    StableDiffusionXlControlnetEdge,
    StableDiffusionXlControlnetDepth,
    StableDiffusion15ControlnetQr,
    StableDiffusionXlInpaint,
    StableDiffusionXlInpaintIpAdapter,
    Lama,
    SegmentAnything,
    Isnet,
    Esrgan,
    Whisper,
    Xtts,
}

impl RemoteHandle {
    pub const ALL: [Self; 16] = [
        Self::Mistral7bInstruct,
        Self::Firellava,
        Self::StableDiffusionXl,
        Self::StableDiffusionXlLightning,
        Self::StableDiffusionXlIpAdapter,
        Self::StableDiffusionXlControlnetEdge,
        Self::StableDiffusionXlControlnetDepth,
        Self::StableDiffusion15ControlnetQr,
        Self::StableDiffusionXlInpaint,
        Self::StableDiffusionXlInpaintIpAdapter,
        Self::Lama,
        Self::SegmentAnything,
        Self::Isnet,
        Self::Esrgan,
        Self::Whisper,
        Self::Xtts,
    ];

    /// Worker name, also the model id callers use to reach it directly
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mistral7bInstruct => "mistral7b_instruct",
            Self::Firellava => "firellava",
            Self::StableDiffusionXl => "sdxl",
            Self::StableDiffusionXlLightning => "stablediffusionxl_lightning",
            Self::StableDiffusionXlIpAdapter => "stablediffusionxl_ipadapter",
            Self::StableDiffusionXlControlnetEdge => "stablediffusionxl_controlnet_edge",
            Self::StableDiffusionXlControlnetDepth => "stablediffusionxl_controlnet_depth",
            Self::StableDiffusion15ControlnetQr => "stablediffusion1_5_controlnet_qr",
            Self::StableDiffusionXlInpaint => "stablediffusionxl_inpaint",
            Self::StableDiffusionXlInpaintIpAdapter => "stablediffusionxl_inpaint_ipadapter",
            Self::Lama => "lama",
            Self::SegmentAnything => "segment_anything",
            Self::Isnet => "isnet",
            Self::Esrgan => "esrgan",
            Self::Whisper => "whisper",
            Self::Xtts => "xtts",
        }
    }

    pub fn from_model_id(model_id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.name() == model_id)
    }

    /// Whether results may be returned as raw image bytes
    pub const fn negotiates_image(self) -> bool {
        matches!(self, Self::StableDiffusionXl)
    }

    /// Extract this family's per-call options from the request arguments
    pub fn variant_options(self, args: &Map<String, Value>) -> VariantOptions {
        match self {
            Self::StableDiffusionXl => VariantOptions::StableDiffusionXl {
                use_ssd: args.get("use_ssd").and_then(Value::as_bool),
                use_hosted_url: args.get("use_hosted_url").and_then(Value::as_bool),
            },
            _ => VariantOptions::None,
        }
    }
}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for RemoteHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Per-family options carried alongside the arguments
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum VariantOptions {
    #[default]
    None,
    StableDiffusionXl {
        #[serde(skip_serializing_if = "Option::is_none")]
        use_ssd: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        use_hosted_url: Option<bool>,
    },
}

/// One invocation of a remote worker
#[derive(Debug, Serialize)]
pub struct WorkerCall<'a> {
    pub handle: RemoteHandle,
    pub args: &'a Map<String, Value>,
    pub options: &'a VariantOptions,
    pub context: &'a RequestContext,
}

/// Invokes remote workers
///
/// Implementations must be thread-safe; the router holds one behind an `Arc`.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    async fn invoke(&self, call: WorkerCall<'_>) -> Result<Value, DispatchError>;
}

/// Dispatch wrapper: a handle plus the options extracted for this call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDispatch {
    pub handle: RemoteHandle,
    pub options: VariantOptions,
}

impl RemoteDispatch {
    pub fn new(handle: RemoteHandle, args: &Map<String, Value>) -> Self {
        Self {
            handle,
            options: handle.variant_options(args),
        }
    }

    pub async fn run(
        &self,
        workers: &dyn WorkerClient,
        args: &Map<String, Value>,
        context: &RequestContext,
    ) -> Result<Value, DispatchError> {
        workers
            .invoke(WorkerCall {
                handle: self.handle,
                args,
                options: &self.options,
                context,
            })
            .await
    }
}

/// Items of a worker result
///
/// Workers answer with a bare list, `{"data": [...]}`, `{"data": {"items": [...]}}`
/// or `{"items": [...]}`. Anything else yields no items.
pub fn result_items(result: &Value) -> &[Value] {
    let list = match result {
        Value::Array(items) => Some(items),
        Value::Object(obj) => match obj.get("data") {
            Some(Value::Array(items)) => Some(items),
            Some(Value::Object(data)) => data.get("items").and_then(Value::as_array),
            _ => obj.get("items").and_then(Value::as_array),
        },
        _ => None,
    };
    list.map_or(&[][..], Vec::as_slice)
}
