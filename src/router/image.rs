//! Legacy image content negotiation
//!
//! Only the `sdxl` family may answer with raw JPEG bytes instead of JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};

use crate::http::negotiate::accepts_image;
use crate::remote::result_items;

/// Content type of negotiated image responses
pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// Decides whether the caller asked for the generated artifact to be stored
///
/// Input shapes differ between API versions; implementations see the raw
/// arguments together with the `x-substrate-version` header.
pub trait StorageIntent: Send + Sync {
    fn wants_storage(&self, args: &Map<String, Value>, version: Option<&str>) -> bool;
}

/// Reads the `store` argument and ignores the version
///
/// `true` or a non-empty string (a storage destination) means storage was requested.
pub struct StoreArgument;

impl StorageIntent for StoreArgument {
    fn wants_storage(&self, args: &Map<String, Value>, _version: Option<&str>) -> bool {
        match args.get("store") {
            Some(Value::Bool(store)) => *store,
            Some(Value::String(dest)) => !dest.is_empty(),
            _ => false,
        }
    }
}

/// Decoded bytes of the first result item's base64 `uri`
///
/// Accepts both bare base64 and `data:<mime>;base64,<payload>` URIs. Hosted
/// URLs and undecodable payloads yield `None`.
pub fn first_image_bytes(result: &Value) -> Option<Vec<u8>> {
    let uri = result_items(result).first()?.get("uri")?.as_str()?;
    let payload = match uri.strip_prefix("data:") {
        Some(rest) => rest.split_once(";base64,")?.1,
        None => uri,
    };
    if payload.is_empty() {
        return None;
    }
    STANDARD.decode(payload.trim()).ok()
}

/// Image bytes to return instead of JSON, when every condition holds
pub fn negotiate_image(
    result: &Value,
    args: &Map<String, Value>,
    version: Option<&str>,
    accept: Option<&str>,
    storage: &dyn StorageIntent,
) -> Option<Vec<u8>> {
    if !accept.is_some_and(accepts_image) {
        return None;
    }
    if storage.wants_storage(args, version) {
        return None;
    }
    first_image_bytes(result)
}
