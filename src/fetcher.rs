//! Attachment download.
//!
//! Skype and Teams protect attachment URLs with the bot's platform token;
//! every other channel serves them unauthenticated. Inline `data:` URLs are
//! decoded in place.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;
use tracing::{debug, info};

use crate::activity::IncomingMessage;
use crate::connector::{is_https, TokenProvider};
use crate::error::{BotError, Result};

/// Channels whose attachment URLs need a bearer token.
pub const AUTHENTICATED_CHANNELS: [&str; 2] = ["skype", "msteams"];

pub fn requires_token(message: &IncomingMessage) -> bool {
    AUTHENTICATED_CHANNELS.contains(&message.source_channel.as_str())
}

/// Plain HTTP GET of attachment content.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str, bearer: Option<&str>) -> Result<Vec<u8>>;
}

pub struct HttpDownloader {
    client: reqwest::Client,
}

/// Longest error body quoted back to the user.
const MAX_ERROR_CHARS: usize = 200;

impl HttpDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn request(&self, url: &str, bearer: Option<&str>) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match bearer {
            Some(token) => request
                .bearer_auth(token)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream"),
            None => request,
        }
    }
}

/// Short, single-line description of a failed download.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let body = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if body.is_empty() {
        return status.canonical_reason().unwrap_or("request failed").to_string();
    }
    let mut message: String = body.chars().take(MAX_ERROR_CHARS).collect();
    if body.chars().count() > MAX_ERROR_CHARS {
        message.push_str("...");
    }
    message
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, bearer: Option<&str>) -> Result<Vec<u8>> {
        let resp = self
            .request(url, bearer)
            .send()
            .await
            .map_err(|e| BotError::download(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(BotError::download(
                Some(status.as_u16()),
                error_message(status, &text),
            ));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| BotError::download(Some(status.as_u16()), e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Resolves attachment content, picking the authenticated path when needed.
pub struct AttachmentFetcher {
    tokens: Arc<dyn TokenProvider>,
    downloader: Arc<dyn Downloader>,
}

impl AttachmentFetcher {
    pub fn new(tokens: Arc<dyn TokenProvider>, downloader: Arc<dyn Downloader>) -> Self {
        Self { tokens, downloader }
    }

    /// Download `url` on behalf of `message`.
    ///
    /// For authenticated channels the token is obtained before the download
    /// request is issued.
    pub async fn fetch(&self, url: &str, message: &IncomingMessage) -> Result<Vec<u8>> {
        if url.is_empty() {
            return Err(BotError::download(None, "attachment has no content URL"));
        }

        if url.starts_with("data:") {
            debug!("Decoding inline attachment");
            return decode_data_url(url);
        }

        let data = if requires_token(message) {
            if !is_https(url) {
                return Err(BotError::download(
                    None,
                    "authenticated attachments must be served over https",
                ));
            }
            let token = self.tokens.access_token().await?;
            self.downloader.download(url, Some(&token)).await?
        } else {
            self.downloader.download(url, None).await?
        };

        info!("Downloaded attachment ({} bytes)", data.len());
        Ok(data)
    }
}

/// Decode a `data:[<mime>][;base64],<payload>` URL.
fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| BotError::download(None, "not a data URL"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| BotError::download(None, "malformed data URL"))?;

    if !meta.ends_with(";base64") {
        return Err(BotError::download(None, "only base64 data URLs are supported"));
    }

    BASE64
        .decode(payload.trim())
        .map_err(|e| BotError::download(None, format!("invalid base64 payload: {}", e)))
}
