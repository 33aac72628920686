//! Text generation nodes backed by the instruct and vision-language workers

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{decode_output, encode_output, rescale, NodeContext, NodeInput, NodeRegistry};
use crate::error::NodeError;
use crate::remote::{result_items, RemoteHandle};

pub(super) fn register(registry: &mut NodeRegistry) {
    registry.register_input::<GenerateTextIn>("GenerateText");
    registry.register_input::<MultiGenerateTextIn>("MultiGenerateText");
    registry.register_input::<GenerateTextVisionIn>("GenerateTextVision");
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize)]
pub struct GenerateTextIn {
    pub prompt: String,
    /// 1..10, mapped onto the worker's 0..2 range
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub response_format: ResponseFormat,
    pub json_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct MultiGenerateTextIn {
    pub prompt: String,
    #[serde(default = "default_choices")]
    pub num_choices: u32,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub response_format: ResponseFormat,
    pub json_schema: Option<Value>,
}

const fn default_choices() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct GenerateTextVisionIn {
    pub prompt: String,
    pub image_uris: Vec<String>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateTextOut {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_object: Option<Value>,
}

#[derive(Debug, Serialize)]
struct MultiGenerateTextOut {
    choices: Vec<GenerateTextOut>,
}

#[derive(Debug, Default, Deserialize)]
struct Completions {
    #[serde(default)]
    completions: Vec<String>,
    #[serde(default)]
    json_completions: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct VisionResult {
    result: Vec<VisionItem>,
}

#[derive(Debug, Deserialize)]
struct VisionItem {
    generated_text: String,
}

/// Parameters shared by the single and multi text nodes
struct CompletionRequest<'a> {
    prompt: &'a str,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    response_format: ResponseFormat,
    json_schema: Option<&'a Value>,
    num_completions: u32,
}

async fn complete(
    ctx: &NodeContext<'_>,
    req: CompletionRequest<'_>,
) -> Result<Vec<GenerateTextOut>, NodeError> {
    let handle = RemoteHandle::Mistral7bInstruct;
    let json_schema = match req.response_format {
        ResponseFormat::Json => Some(
            req.json_schema
                .map_or_else(|| "{}".to_string(), ToString::to_string),
        ),
        ResponseFormat::Text => None,
    };

    let res = ctx
        .call(
            handle,
            json!({
                "prompts": [{ "prompt": req.prompt }],
                "temperature": rescale(req.temperature, 2.0),
                "max_tokens": req.max_tokens,
                "json_schema": json_schema,
                "num_completions": req.num_completions,
            }),
        )
        .await?;

    let first = result_items(&res).first().cloned().unwrap_or(Value::Null);
    let result: Completions = decode_output(handle, first)?;

    let outputs: Vec<GenerateTextOut> = if result.completions.is_empty() {
        result
            .json_completions
            .into_iter()
            .map(|object| GenerateTextOut {
                text: None,
                json_object: Some(object),
            })
            .collect()
    } else {
        result
            .completions
            .into_iter()
            .map(|text| GenerateTextOut {
                text: Some(text),
                json_object: None,
            })
            .collect()
    };

    if outputs.is_empty() {
        return Err(NodeError::UnexpectedOutput {
            handle: handle.name(),
            detail: "no completions returned".to_string(),
        });
    }
    Ok(outputs)
}

#[async_trait]
impl NodeInput for GenerateTextIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        let mut outputs = complete(
            ctx,
            CompletionRequest {
                prompt: &self.prompt,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                response_format: self.response_format,
                json_schema: self.json_schema.as_ref(),
                num_completions: 1,
            },
        )
        .await?;
        let first = outputs.swap_remove(0);
        encode_output(RemoteHandle::Mistral7bInstruct, &first)
    }
}

#[async_trait]
impl NodeInput for MultiGenerateTextIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        let choices = complete(
            ctx,
            CompletionRequest {
                prompt: &self.prompt,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                response_format: self.response_format,
                json_schema: self.json_schema.as_ref(),
                num_completions: self.num_choices,
            },
        )
        .await?;
        encode_output(
            RemoteHandle::Mistral7bInstruct,
            &MultiGenerateTextOut { choices },
        )
    }
}

#[async_trait]
impl NodeInput for GenerateTextVisionIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        let handle = RemoteHandle::Firellava;
        let res = ctx
            .call(
                handle,
                json!({
                    "prompt": self.prompt,
                    "image_url_batch": self.image_uris,
                    "max_tokens": self.max_tokens,
                }),
            )
            .await?;

        let result: VisionResult = decode_output(handle, res)?;
        let item = result
            .result
            .into_iter()
            .next()
            .ok_or_else(|| NodeError::UnexpectedOutput {
                handle: handle.name(),
                detail: "empty result".to_string(),
            })?;
        Ok(json!({ "text": item.generated_text }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{run_node, ScriptedWorkers};
    use super::*;

    fn mistral_reply(items: Value) -> Value {
        json!({ "data": { "items": [items] } })
    }

    #[tokio::test]
    async fn test_generate_text() {
        let workers = ScriptedWorkers::default().reply(
            RemoteHandle::Mistral7bInstruct,
            mistral_reply(json!({"completions": ["Once upon a time"]})),
        );
        let result = run_node(
            "GenerateText",
            json!({"prompt": "tell a story", "temperature": 5, "max_tokens": 64}),
            &workers,
        )
        .await
        .expect("node runs");
        assert_eq!(result, json!({"text": "Once upon a time"}));

        let (handle, args, _) = workers.last_call().expect("one call");
        assert_eq!(handle, RemoteHandle::Mistral7bInstruct);
        assert_eq!(args["temperature"], json!(1.0));
        assert_eq!(args["num_completions"], json!(1));
        assert_eq!(args["prompts"], json!([{"prompt": "tell a story"}]));
        assert!(!args.contains_key("json_schema"));
    }

    #[tokio::test]
    async fn test_generate_text_json_mode() {
        let workers = ScriptedWorkers::default().reply(
            RemoteHandle::Mistral7bInstruct,
            mistral_reply(json!({"json_completions": [{"name": "Ada"}]})),
        );
        let result = run_node(
            "GenerateText",
            json!({
                "prompt": "a person",
                "response_format": "json",
                "json_schema": {"type": "object"}
            }),
            &workers,
        )
        .await
        .expect("node runs");
        assert_eq!(result, json!({"json_object": {"name": "Ada"}}));

        let (_, args, _) = workers.last_call().expect("one call");
        assert_eq!(args["json_schema"], json!(r#"{"type":"object"}"#));
    }

    #[tokio::test]
    async fn test_generate_text_without_completions_fails() {
        let workers = ScriptedWorkers::default()
            .reply(RemoteHandle::Mistral7bInstruct, mistral_reply(json!({})));
        let err = run_node("GenerateText", json!({"prompt": "hi"}), &workers)
            .await
            .expect_err("empty output");
        assert!(matches!(err, NodeError::UnexpectedOutput { .. }));
    }

    #[tokio::test]
    async fn test_multi_generate_text() {
        let workers = ScriptedWorkers::default().reply(
            RemoteHandle::Mistral7bInstruct,
            mistral_reply(json!({"completions": ["a", "b"]})),
        );
        let result = run_node(
            "MultiGenerateText",
            json!({"prompt": "two words", "num_choices": 2}),
            &workers,
        )
        .await
        .expect("node runs");
        assert_eq!(result, json!({"choices": [{"text": "a"}, {"text": "b"}]}));
        let (_, args, _) = workers.last_call().expect("one call");
        assert_eq!(args["num_completions"], json!(2));
    }

    #[tokio::test]
    async fn test_generate_text_vision() {
        let workers = ScriptedWorkers::default().reply(
            RemoteHandle::Firellava,
            json!({"result": [{"generated_text": "a cat on a mat"}]}),
        );
        let result = run_node(
            "GenerateTextVision",
            json!({"prompt": "describe", "image_uris": ["https://img/cat.jpg"]}),
            &workers,
        )
        .await
        .expect("node runs");
        assert_eq!(result, json!({"text": "a cat on a mat"}));
        let (_, args, _) = workers.last_call().expect("one call");
        assert_eq!(args["image_url_batch"], json!(["https://img/cat.jpg"]));
    }

    #[tokio::test]
    async fn test_worker_failure_propagates() {
        let workers = ScriptedWorkers::default().fail(RemoteHandle::Mistral7bInstruct);
        let err = run_node("GenerateText", json!({"prompt": "hi"}), &workers)
            .await
            .expect_err("worker down");
        assert!(matches!(err, NodeError::Dispatch(_)));
    }
}
