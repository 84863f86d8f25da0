//! In-memory fakes of the collaborator traits, recording every call.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::activity::IncomingMessage;
use crate::auth::{KeyStore, SigningKey};
use crate::connector::{Connector, TokenProvider};
use crate::dispatcher::ReplySink;
use crate::error::{BotError, Result};
use crate::fetcher::Downloader;
use crate::ocr::{OcrBackend, OcrBody, OcrInput, OcrResponse};

/// Shared, ordered record of collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

pub struct FakeTokens {
    log: CallLog,
    fail: bool,
}

impl FakeTokens {
    pub fn new(log: CallLog) -> Self {
        Self { log, fail: false }
    }

    pub fn failing(log: CallLog) -> Self {
        Self { log, fail: true }
    }
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn access_token(&self) -> Result<String> {
        self.log.push("token");
        if self.fail {
            return Err(BotError::Token("401 Unauthorized".to_string()));
        }
        Ok("token-1".to_string())
    }
}

pub struct FakeDownloader {
    log: CallLog,
    result: std::result::Result<Vec<u8>, u16>,
}

impl FakeDownloader {
    pub fn new(log: CallLog, data: Vec<u8>) -> Self {
        Self {
            log,
            result: Ok(data),
        }
    }

    pub fn failing(log: CallLog, status: u16) -> Self {
        Self {
            log,
            result: Err(status),
        }
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, url: &str, bearer: Option<&str>) -> Result<Vec<u8>> {
        self.log
            .push(format!("download {} bearer={}", url, bearer.unwrap_or("none")));
        match &self.result {
            Ok(data) => Ok(data.clone()),
            Err(status) => Err(BotError::download(Some(*status), "Forbidden")),
        }
    }
}

pub struct FakeOcr {
    log: CallLog,
    inputs: Mutex<Vec<OcrInput>>,
    body: Option<OcrBody>,
}

impl FakeOcr {
    /// Backend answering every request with `body`.
    pub fn answering(log: CallLog, body: OcrBody) -> Self {
        Self {
            log,
            inputs: Mutex::new(Vec::new()),
            body: Some(body),
        }
    }

    /// Backend whose transport always fails.
    pub fn unreachable(log: CallLog) -> Self {
        Self {
            log,
            inputs: Mutex::new(Vec::new()),
            body: None,
        }
    }

    pub fn inputs(&self) -> Vec<OcrInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl OcrBackend for FakeOcr {
    fn name(&self) -> &str {
        "fake"
    }

    async fn submit(&self, input: &OcrInput) -> Result<OcrResponse> {
        self.log.push(format!("ocr {}", input.describe()));
        self.inputs.lock().unwrap().push(input.clone());
        match &self.body {
            Some(body) => Ok(OcrResponse {
                status: 200,
                content_type: Some("application/json".to_string()),
                body: body.clone(),
            }),
            None => Err(BotError::Transport("connection refused".to_string())),
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    replies: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn replies(&self) -> Vec<String> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn send(&self, text: &str) -> Result<()> {
        self.replies.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Connector that records replies into the call log.
pub struct FakeConnector {
    log: CallLog,
}

impl FakeConnector {
    pub fn new(log: CallLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl TokenProvider for FakeConnector {
    async fn access_token(&self) -> Result<String> {
        self.log.push("token");
        Ok("token-1".to_string())
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn reply(&self, message: &IncomingMessage, text: &str) -> Result<()> {
        self.log
            .push(format!("reply {}: {}", message.conversation.id, text));
        Ok(())
    }
}

/// OCR body containing the given words on one line.
pub fn ocr_words(words: &[&str]) -> OcrBody {
    let words: Vec<_> = words
        .iter()
        .map(|w| serde_json::json!({ "text": w }))
        .collect();
    OcrBody::Structured(serde_json::json!({ "regions": [{ "lines": [{ "words": words }] }] }))
}

pub const TEST_APP_ID: &str = "test-app-id";
pub const TEST_KID: &str = "test-kid";
const TEST_SECRET: &[u8] = b"test-signing-secret";

/// Key store holding a single HS256 key under [`TEST_KID`].
#[derive(Default)]
pub struct StaticKeys;

#[async_trait]
impl KeyStore for StaticKeys {
    async fn key(&self, kid: &str) -> Result<SigningKey> {
        if kid != TEST_KID {
            return Err(BotError::Unauthorized(format!("unknown signing key '{}'", kid)));
        }
        Ok(SigningKey {
            key: jsonwebtoken::DecodingKey::from_secret(TEST_SECRET),
            algorithm: jsonwebtoken::Algorithm::HS256,
        })
    }
}

/// Sign `claims` with the test secret under `kid`.
pub fn sign_token(kid: &str, claims: &serde_json::Value) -> String {
    let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
    header.kid = Some(kid.to_string());
    jsonwebtoken::encode(
        &header,
        claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_SECRET),
    )
    .unwrap()
}
