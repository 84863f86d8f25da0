//! Computer Vision OCR backend (`POST {base}/ocr/`).

use super::{OcrBackend, OcrBody, OcrInput, OcrResponse};
use crate::config::OcrConfig;
use crate::error::{BotError, Result};
use serde::Serialize;
use tracing::{debug, info};

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

pub struct VisionClient {
    endpoint: String,
    api_key: String,
    language: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct UrlRequest<'a> {
    url: &'a str,
    language: &'a str,
}

impl VisionClient {
    pub fn new(config: &OcrConfig, client: reqwest::Client) -> Self {
        Self {
            endpoint: ocr_endpoint(&config.base_url),
            api_key: config.api_key.clone(),
            language: config.language.clone(),
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The `/ocr/` request for `input`: raw bytes as an octet stream, URLs as JSON.
    fn build(&self, input: &OcrInput) -> reqwest::RequestBuilder {
        let request = self
            .client
            .post(&self.endpoint)
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key);

        match input {
            OcrInput::Bytes { data } => request
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(data.clone()),
            OcrInput::Url { url } => request.json(&UrlRequest {
                url,
                language: &self.language,
            }),
        }
    }
}

fn ocr_endpoint(base_url: &str) -> String {
    format!("{}/ocr/", base_url.trim_end_matches('/'))
}

#[async_trait::async_trait]
impl OcrBackend for VisionClient {
    fn name(&self) -> &str {
        "computer_vision"
    }

    async fn submit(&self, input: &OcrInput) -> Result<OcrResponse> {
        info!("VisionClient: submitting {}", input.describe());

        let resp = self
            .build(input)
            .send()
            .await
            .map_err(|e| BotError::Transport(e.to_string()))?;

        let status = resp.status();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let raw_text = resp
            .text()
            .await
            .map_err(|e| BotError::Transport(e.to_string()))?;

        debug!(
            "VisionClient: raw response ({} bytes): {}",
            raw_text.len(),
            raw_text.chars().take(500).collect::<String>()
        );

        // Binary submissions hand the body on as a string, URL submissions as decoded JSON.
        let body = match input {
            OcrInput::Bytes { .. } => OcrBody::Raw(raw_text),
            OcrInput::Url { .. } => OcrBody::sniff(raw_text),
        };

        Ok(OcrResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}
