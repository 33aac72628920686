//! Mask, segmentation and image cleanup nodes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{decode_output, encode_output, NodeContext, NodeInput, NodeRegistry};
use crate::error::{ErrorOut, NodeError};
use crate::remote::RemoteHandle;

pub(super) fn register(registry: &mut NodeRegistry) {
    registry.register_input::<FillMaskIn>("FillMask");
    registry.register_input::<DetectSegmentsIn>("DetectSegments");
    registry.register_input::<RemoveBackgroundIn>("RemoveBackground");
    registry.register_input::<UpscaleImageIn>("UpscaleImage");
}

#[derive(Debug, Deserialize)]
pub struct FillMaskIn {
    pub image_uri: String,
    pub mask_image_uri: String,
    pub store: Option<Value>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

#[derive(Debug, Deserialize)]
pub struct DetectSegmentsIn {
    pub image_uri: String,
    pub point_prompts: Option<Vec<Point>>,
    pub box_prompts: Option<Vec<BoundingBox>>,
    pub store: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveBackgroundIn {
    pub image_uri: String,
    pub return_mask: Option<bool>,
    pub background_color: Option<String>,
    pub store: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpscaleImageIn {
    pub image_uri: String,
    pub store: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ImageUriOut {
    #[serde(alias = "uri")]
    image_uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct MaskOut {
    #[serde(alias = "uri")]
    mask_image_uri: String,
}

/// Call a worker whose result is a single image URI
async fn image_uri_call(
    ctx: &NodeContext<'_>,
    handle: RemoteHandle,
    args: Value,
) -> Result<Value, NodeError> {
    let res = ctx.call(handle, args).await?;
    let out: ImageUriOut = decode_output(handle, res)?;
    encode_output(handle, &out)
}

#[async_trait]
impl NodeInput for FillMaskIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        image_uri_call(
            ctx,
            RemoteHandle::Lama,
            json!({
                "image_uri": self.image_uri,
                "mask_image_uri": self.mask_image_uri,
                "store": self.store,
            }),
        )
        .await
    }
}

#[async_trait]
impl NodeInput for DetectSegmentsIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        let points = self.point_prompts.filter(|p| !p.is_empty());
        let boxes = self.box_prompts.filter(|b| !b.is_empty());
        if points.is_none() && boxes.is_none() {
            return Ok(ErrorOut::invalid_request(
                "One of `point_prompts` or `box_prompts` must be set.",
            )
            .into_result());
        }

        let point_prompts: Option<Vec<[f64; 2]>> =
            points.map(|p| p.iter().map(|p| [p.x, p.y]).collect());
        // workers take boxes as [x1, x2, y1, y2]
        let box_prompts: Option<Vec<[f64; 4]>> =
            boxes.map(|b| b.iter().map(|b| [b.x1, b.x2, b.y1, b.y2]).collect());

        let handle = RemoteHandle::SegmentAnything;
        let res = ctx
            .call(
                handle,
                json!({
                    "image_uri": self.image_uri,
                    "point_prompts": point_prompts,
                    "box_prompts": box_prompts,
                    "store": self.store,
                }),
            )
            .await?;
        let out: MaskOut = decode_output(handle, res)?;
        encode_output(handle, &out)
    }
}

#[async_trait]
impl NodeInput for RemoveBackgroundIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        image_uri_call(
            ctx,
            RemoteHandle::Isnet,
            json!({
                "image_uri": self.image_uri,
                "return_mask": self.return_mask,
                "background_color": self.background_color,
                "store": self.store,
            }),
        )
        .await
    }
}

#[async_trait]
impl NodeInput for UpscaleImageIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        image_uri_call(
            ctx,
            RemoteHandle::Esrgan,
            json!({
                "image_uri": self.image_uri,
                "store": self.store,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{run_node, ScriptedWorkers};
    use super::*;

    #[tokio::test]
    async fn test_fill_mask() {
        let workers = ScriptedWorkers::default()
            .reply(RemoteHandle::Lama, json!({"image_uri": "https://cdn/filled.png"}));
        let result = run_node(
            "FillMask",
            json!({"image_uri": "in.png", "mask_image_uri": "mask.png", "store": "hosted"}),
            &workers,
        )
        .await
        .expect("node runs");
        assert_eq!(result, json!({"image_uri": "https://cdn/filled.png"}));

        let (handle, args, _) = workers.last_call().expect("one call");
        assert_eq!(handle, RemoteHandle::Lama);
        assert_eq!(args["store"], json!("hosted"));
    }

    #[tokio::test]
    async fn test_detect_segments_requires_prompts() {
        let workers = ScriptedWorkers::default();
        for args in [
            json!({"image_uri": "in.png"}),
            json!({"image_uri": "in.png", "point_prompts": [], "box_prompts": []}),
        ] {
            let result = run_node("DetectSegments", args, &workers)
                .await
                .expect("error result");
            assert_eq!(result["error"]["type"], "invalid_request_error");
            assert_eq!(
                result["error"]["message"],
                "One of `point_prompts` or `box_prompts` must be set."
            );
        }
        assert!(workers.calls().is_empty());
    }

    #[tokio::test]
    async fn test_detect_segments_box_order() {
        let workers = ScriptedWorkers::default().reply(
            RemoteHandle::SegmentAnything,
            json!({"mask_image_uri": "https://cdn/mask.png"}),
        );
        let result = run_node(
            "DetectSegments",
            json!({
                "image_uri": "in.png",
                "box_prompts": [{"x1": 1, "y1": 2, "x2": 3, "y2": 4}]
            }),
            &workers,
        )
        .await
        .expect("node runs");
        assert_eq!(result, json!({"mask_image_uri": "https://cdn/mask.png"}));

        let (_, args, _) = workers.last_call().expect("one call");
        assert_eq!(args["box_prompts"], json!([[1.0, 3.0, 2.0, 4.0]]));
        assert!(!args.contains_key("point_prompts"));
    }

    #[tokio::test]
    async fn test_detect_segments_points() {
        let workers = ScriptedWorkers::default().reply(
            RemoteHandle::SegmentAnything,
            json!({"mask_image_uri": "m"}),
        );
        run_node(
            "DetectSegments",
            json!({"image_uri": "in.png", "point_prompts": [{"x": 10, "y": 20}]}),
            &workers,
        )
        .await
        .expect("node runs");
        let (_, args, _) = workers.last_call().expect("one call");
        assert_eq!(args["point_prompts"], json!([[10.0, 20.0]]));
    }

    #[tokio::test]
    async fn test_remove_background() {
        let workers = ScriptedWorkers::default()
            .reply(RemoteHandle::Isnet, json!({"image_uri": "https://cdn/cutout.png"}));
        let result = run_node(
            "RemoveBackground",
            json!({"image_uri": "in.png", "return_mask": true, "background_color": "#ffffff"}),
            &workers,
        )
        .await
        .expect("node runs");
        assert_eq!(result["image_uri"], "https://cdn/cutout.png");
        let (_, args, _) = workers.last_call().expect("one call");
        assert_eq!(args["return_mask"], json!(true));
    }

    #[tokio::test]
    async fn test_upscale_image_rejects_malformed_output() {
        let workers = ScriptedWorkers::default()
            .reply(RemoteHandle::Esrgan, json!({"status": "queued"}));
        let err = run_node("UpscaleImage", json!({"image_uri": "in.png"}), &workers)
            .await
            .expect_err("missing image_uri");
        assert!(matches!(
            err,
            NodeError::UnexpectedOutput { handle: "esrgan", .. }
        ));
    }
}
