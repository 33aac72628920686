//! Speech nodes: transcription and synthesis

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{decode_output, encode_output, NodeContext, NodeInput, NodeRegistry};
use crate::error::NodeError;
use crate::remote::RemoteHandle;

pub(super) fn register(registry: &mut NodeRegistry) {
    registry.register_input::<TranscribeMediaIn>("TranscribeMedia");
    registry.register_input::<GenerateSpeechIn>("GenerateSpeech");
}

#[derive(Debug, Deserialize)]
pub struct TranscribeMediaIn {
    pub audio_uri: String,
    pub prompt: Option<String>,
    pub language: Option<String>,
    /// Return timestamped segments
    pub segment: Option<bool>,
    pub align: Option<bool>,
    pub diarize: Option<bool>,
    pub suggest_chapters: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateSpeechIn {
    pub text: String,
    /// Reference voice sample
    pub audio_uri: Option<String>,
    pub language: Option<String>,
    pub store: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TranscribeMediaOut {
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    segments: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chapters: Option<Vec<Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GenerateSpeechOut {
    #[serde(alias = "uri")]
    audio_uri: String,
}

#[async_trait]
impl NodeInput for TranscribeMediaIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        let handle = RemoteHandle::Whisper;
        let res = ctx
            .call(
                handle,
                json!({
                    "audio_url": self.audio_uri,
                    "prompt": self.prompt,
                    "language": self.language,
                    "return_segments": self.segment,
                    "align": self.align,
                    "diarize": self.diarize,
                    "suggest_chapters": self.suggest_chapters,
                }),
            )
            .await?;
        let out: TranscribeMediaOut = decode_output(handle, res)?;
        encode_output(handle, &out)
    }
}

#[async_trait]
impl NodeInput for GenerateSpeechIn {
    async fn execute(self, ctx: &NodeContext<'_>) -> Result<Value, NodeError> {
        let handle = RemoteHandle::Xtts;
        let res = ctx
            .call(
                handle,
                json!({
                    "text": self.text,
                    "audio_uri": self.audio_uri,
                    "language": self.language,
                    "store": self.store,
                }),
            )
            .await?;
        let out: GenerateSpeechOut = decode_output(handle, res)?;
        encode_output(handle, &out)
    }
}
