//! Image generation and editing nodes backed by the diffusion workers

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{decode_output, encode_output, rescale, NodeContext, NodeInput, NodeRegistry};
use crate::error::{ErrorOut, NodeError};
use crate::remote::{result_items, RemoteHandle};

pub(super) fn register(registry: &mut NodeRegistry) {
    registry.register_input::<GenerateImageIn>("GenerateImage");
    registry.register_input::<MultiGenerateImageIn>("MultiGenerateImage");
    registry.register_input::<ControlledGenerateImageIn>("ControlledGenerateImage");
    registry.register_input::<MultiControlledGenerateImageIn>("MultiControlledGenerateImage");
    registry.register_input::<GenerativeEditImageIn>("GenerativeEditImage");
    registry.register_input::<MultiGenerativeEditImageIn>("MultiGenerativeEditImage");
}

const fn default_num_images() -> u32 {
    2
}

#[derive(Debug, Deserialize)]
pub struct GenerateImageIn {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub seed: Option<u64>,
    pub store: Option<Value>,
    pub image_prompt_uri: Option<String>,
    /// 0..10
    pub image_influence: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct MultiGenerateImageIn {
    pub prompt: String,
    #[serde(default = "default_num_images")]
    pub num_images: u32,
    pub negative_prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub seeds: Option<Vec<u64>>,
    pub store: Option<Value>,
    pub image_prompt_uri: Option<String>,
    pub image_influence: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ControlledGenerateImageIn {
    pub image_uri: String,
    pub control_method: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub image_influence: Option<f64>,
    pub output_resolution: Option<u32>,
    pub seed: Option<u64>,
    pub store: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct MultiControlledGenerateImageIn {
    pub image_uri: String,
    pub control_method: String,
    pub prompt: String,
    #[serde(default = "default_num_images")]
    pub num_images: u32,
    pub negative_prompt: Option<String>,
    pub image_influence: Option<f64>,
    pub output_resolution: Option<u32>,
    pub seeds: Option<Vec<u64>>,
    pub store: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct GenerativeEditImageIn {
    pub image_uri: String,
    pub prompt: String,
    pub mask_image_uri: Option<String>,
    /// 0..10
    pub strength: Option<f64>,
    pub negative_prompt: Option<String>,
    pub output_resolution: Option<u32>,
    pub seed: Option<u64>,
    pub store: Option<Value>,
    pub image_prompt_uri: Option<String>,
    pub image_prompt_influence: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct MultiGenerativeEditImageIn {
    pub image_uri: String,
    pub prompt: String,
    #[serde(default = "default_num_images")]
    pub num_images: u32,
    pub mask_image_uri: Option<String>,
    pub strength: Option<f64>,
    pub negative_prompt: Option<String>,
    pub output_resolution: Option<u32>,
    pub seeds: Option<Vec<u64>>,
    pub store: Option<Value>,
    pub image_prompt_uri: Option<String>,
    pub image_prompt_influence: Option<f64>,
}

/// One generated image as the diffusion workers report it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateImageOut {
    #[serde(alias = "uri")]
    pub image_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct MultiImageOut {
    outputs: Vec<GenerateImageOut>,
}

/// Controlnet family selected by `control_method`
fn control_handle(method: &str) -> Option<RemoteHandle> {
    match method {
        "edge" => Some(RemoteHandle::StableDiffusionXlControlnetEdge),
        "depth" => Some(RemoteHandle::StableDiffusionXlControlnetDepth),
        "illusion" => Some(RemoteHandle::StableDiffusion15ControlnetQr),
        _ => None,
    }
}

/// Attach the image prompt and pick the ip-adapter handle when one is given
fn with_image_prompt(
    base: RemoteHandle,
    adapter: RemoteHandle,
    args: &mut Value,
    image_prompt_uri: Option<String>,
    influence: Option<f64>,
) -> RemoteHandle {
    let Some(uri) = image_prompt_uri.filter(|u| !u.is_empty()) else {
        return base;
    };
    if let Some(map) = args.as_object_mut() {
        map.insert("image_prompt_uri".to_string(), Value::String(uri));
        map.insert("ip_adapter_scale".to_string(), json!(rescale(influence, 1.0)));
    }
    adapter
}

async fn generate(
    ctx: &NodeContext<'_>,
    handle: RemoteHandle,
    args: Value,
) -> Result<Vec<GenerateImageOut>, NodeError> {
    let res = ctx.call(handle, args).await?;
    result_items(&res)
        .iter()
        .cloned()
        .map(|item| decode_output(handle, item))
        .collect()
}

async fn generate_one(
    ctx: &NodeContext<'_>,
    handle: RemoteHandle,
    args: Value,
) -> Result<Value, NodeError> {
    let image = generate(ctx, handle, args)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| NodeError::UnexpectedOutput {
            handle: handle.name(),
            detail: "no images returned".to_string(),
        })?;
    encode_output(handle, &image)
}

async fn generate_many(
    ctx: &NodeContext<'_>,
    handle: RemoteHandle,
    args: Value,
) -> Result<Value, NodeError> {
    let outputs = generate(ctx, handle, args).await?;
    encode_output(handle, &MultiImageOut { outputs })
}

fn unknown_control_method() -> Value {
    ErrorOut::unexpected().into_result()
}

#[async_trait]
impl NodeInput for GenerateImageIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        let mut args = json!({
            "prompt": self.prompt,
            "negative_prompt": self.negative_prompt,
            "width": self.width,
            "height": self.height,
            "seeds": self.seed.map(|s| vec![s]),
            "store": self.store,
            "num_images": 1,
        });
        let handle = with_image_prompt(
            RemoteHandle::StableDiffusionXlLightning,
            RemoteHandle::StableDiffusionXlIpAdapter,
            &mut args,
            self.image_prompt_uri,
            self.image_influence,
        );
        generate_one(ctx, handle, args).await
    }
}

#[async_trait]
impl NodeInput for MultiGenerateImageIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        let mut args = json!({
            "prompt": self.prompt,
            "num_images": self.num_images,
            "negative_prompt": self.negative_prompt,
            "width": self.width,
            "height": self.height,
            "seeds": self.seeds,
            "store": self.store,
        });
        let handle = with_image_prompt(
            RemoteHandle::StableDiffusionXlLightning,
            RemoteHandle::StableDiffusionXlIpAdapter,
            &mut args,
            self.image_prompt_uri,
            self.image_influence,
        );
        generate_many(ctx, handle, args).await
    }
}

#[async_trait]
impl NodeInput for ControlledGenerateImageIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        let Some(handle) = control_handle(&self.control_method) else {
            return Ok(unknown_control_method());
        };
        let args = json!({
            "image_uri": self.image_uri,
            "prompt": self.prompt,
            "negative_prompt": self.negative_prompt,
            "conditioning_scale": rescale(self.image_influence, 1.0),
            "output_resolution": self.output_resolution,
            "seeds": self.seed.map(|s| vec![s]),
            "store": self.store,
            "num_images": 1,
        });
        generate_one(ctx, handle, args).await
    }
}

#[async_trait]
impl NodeInput for MultiControlledGenerateImageIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        let Some(handle) = control_handle(&self.control_method) else {
            return Ok(unknown_control_method());
        };
        let args = json!({
            "image_uri": self.image_uri,
            "prompt": self.prompt,
            "negative_prompt": self.negative_prompt,
            "conditioning_scale": rescale(self.image_influence, 1.0),
            "output_resolution": self.output_resolution,
            "seeds": self.seeds,
            "store": self.store,
            "num_images": self.num_images,
        });
        generate_many(ctx, handle, args).await
    }
}

fn edit_args(
    image_uri: String,
    mask_image_uri: Option<String>,
    prompt: String,
    strength: Option<f64>,
    negative_prompt: Option<String>,
    output_resolution: Option<u32>,
) -> Map<String, Value> {
    let mut args = Map::new();
    args.insert("image_uri".to_string(), json!(image_uri));
    args.insert("mask_image_uri".to_string(), json!(mask_image_uri));
    args.insert("prompt".to_string(), json!(prompt));
    args.insert("strength".to_string(), json!(rescale(strength, 1.0)));
    args.insert("negative_prompt".to_string(), json!(negative_prompt));
    args.insert("output_resolution".to_string(), json!(output_resolution));
    args
}

#[async_trait]
impl NodeInput for GenerativeEditImageIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        let mut args = edit_args(
            self.image_uri,
            self.mask_image_uri,
            self.prompt,
            self.strength,
            self.negative_prompt,
            self.output_resolution,
        );
        args.insert("seeds".to_string(), json!(self.seed.map(|s| vec![s])));
        args.insert("store".to_string(), json!(self.store));
        args.insert("num_images".to_string(), json!(1));

        let mut args = Value::Object(args);
        let handle = with_image_prompt(
            RemoteHandle::StableDiffusionXlInpaint,
            RemoteHandle::StableDiffusionXlInpaintIpAdapter,
            &mut args,
            self.image_prompt_uri,
            self.image_prompt_influence,
        );
        generate_one(ctx, handle, args).await
    }
}

#[async_trait]
impl NodeInput for MultiGenerativeEditImageIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        let mut args = edit_args(
            self.image_uri,
            self.mask_image_uri,
            self.prompt,
            self.strength,
            self.negative_prompt,
            self.output_resolution,
        );
        args.insert("seeds".to_string(), json!(self.seeds));
        args.insert("store".to_string(), json!(self.store));
        args.insert("num_images".to_string(), json!(self.num_images));

        let mut args = Value::Object(args);
        let handle = with_image_prompt(
            RemoteHandle::StableDiffusionXlInpaint,
            RemoteHandle::StableDiffusionXlInpaintIpAdapter,
            &mut args,
            self.image_prompt_uri,
            self.image_prompt_influence,
        );
        generate_many(ctx, handle, args).await
    }
}
