//! OCR backend abstraction.
//!
//! Defines the [`OcrBackend`] trait and the raw response types. The client
//! never interprets the body; turning it into text is [`response`]'s job.

pub mod response;
pub mod vision;

/// What gets submitted to the backend: raw image bytes or a remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrInput {
    Bytes { data: Vec<u8> },
    Url { url: String },
}

impl OcrInput {
    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Bytes { data } => format!("{} bytes", data.len()),
            Self::Url { url } => url.clone(),
        }
    }
}

/// Response body as it came off the wire.
///
/// `Raw` is an unparsed string, `Structured` an already-decoded JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrBody {
    Raw(String),
    Structured(serde_json::Value),
}

impl OcrBody {
    /// Decode `text` as JSON when it parses, keep it raw otherwise.
    pub fn sniff(text: String) -> Self {
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) => Self::Structured(value),
            Err(_) => Self::Raw(text),
        }
    }
}

/// Raw HTTP response from the backend.
#[derive(Debug, Clone)]
pub struct OcrResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: OcrBody,
}

impl OcrResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn submit(&self, input: &OcrInput) -> crate::error::Result<OcrResponse>;
}
