//! Turns an OCR backend response into the text sent back to the user.
//!
//! Pure functions, no async. Never fails: the region/line/word tree is walked
//! leniently, so null entries, non-object entries and non-string `text`
//! values contribute nothing. Only a body without a `regions` array yields
//! [`AMISS_REPLY`].

use serde_json::Value;
use tracing::{debug, warn};

use super::OcrBody;

pub const AMISS_REPLY: &str = "Something's amiss, please try again.";
pub const NO_TEXT_REPLY: &str = "Could not find text in this image. :( Try again?";

/// User-facing text for a response body.
pub fn extract_text(body: &OcrBody) -> String {
    let parsed;
    let value = match body {
        OcrBody::Structured(value) => value,
        OcrBody::Raw(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                parsed = value;
                &parsed
            }
            Err(_) => {
                debug!("OCR body is not JSON ({} bytes)", text.len());
                return AMISS_REPLY.to_string();
            }
        },
    };

    let Some(regions) = value.get("regions").and_then(Value::as_array) else {
        warn!("OCR response has no regions array");
        return AMISS_REPLY.to_string();
    };

    let text = join_words(regions);
    if text.is_empty() {
        NO_TEXT_REPLY.to_string()
    } else {
        text
    }
}

/// Elements of the array stored under `key`, or nothing.
fn children<'a>(node: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    node.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Flatten regions → lines → words in document order, space separated.
fn join_words(regions: &[Value]) -> String {
    regions
        .iter()
        .flat_map(|r| children(r, "lines"))
        .flat_map(|l| children(l, "words"))
        .filter_map(|w| w.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
