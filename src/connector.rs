//! Bot Framework connector: access tokens and replies.
//!
//! Tokens come from the OAuth2 client-credentials grant for the bot's app
//! identity. When caching is on, a token is reused until a minute before it
//! expires; otherwise every call mints a new one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::activity::{ChannelAccount, ConversationAccount, IncomingMessage};
use crate::config::AppCredentials;
use crate::error::{BotError, Result};

const TOKEN_URL: &str = "https://login.microsoftonline.com/botframework.com/oauth2/v2.0/token";
const TOKEN_SCOPE: &str = "https://api.botframework.com/.default";
/// Tokens are treated as expired this many seconds early.
const EXPIRY_SKEW_SECS: u64 = 60;

/// Source of bearer tokens for the platform.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Platform operations the bot host needs besides tokens.
#[async_trait]
pub trait Connector: TokenProvider {
    /// Send `text` back into the conversation `message` came from.
    async fn reply(&self, message: &IncomingMessage, text: &str) -> Result<()>;
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: u64,
}

impl CachedToken {
    fn is_fresh(&self, now: u64) -> bool {
        now < self.expires_at.saturating_sub(EXPIRY_SKEW_SECS)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Outgoing reply activity.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyActivity<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
    from: &'a ChannelAccount,
    recipient: &'a ChannelAccount,
    conversation: &'a ConversationAccount,
    #[serde(skip_serializing_if = "str::is_empty")]
    reply_to_id: &'a str,
}

impl<'a> ReplyActivity<'a> {
    /// Reply to `message`: the bot becomes the sender, the user the recipient.
    fn to(message: &'a IncomingMessage, text: &'a str) -> Self {
        Self {
            kind: "message",
            text,
            from: &message.recipient,
            recipient: &message.from,
            conversation: &message.conversation,
            reply_to_id: &message.id,
        }
    }
}

fn reply_url(message: &IncomingMessage) -> String {
    let base = message.service_url.trim_end_matches('/');
    if message.id.is_empty() {
        format!("{}/v3/conversations/{}/activities", base, message.conversation.id)
    } else {
        format!(
            "{}/v3/conversations/{}/activities/{}",
            base, message.conversation.id, message.id
        )
    }
}

pub struct BotFrameworkConnector {
    credentials: AppCredentials,
    cache_tokens: bool,
    client: reqwest::Client,
    token_cache: Arc<Mutex<Option<CachedToken>>>,
}

impl BotFrameworkConnector {
    pub fn new(credentials: AppCredentials, cache_tokens: bool, client: reqwest::Client) -> Self {
        Self {
            credentials,
            cache_tokens,
            client,
            token_cache: Arc::new(Mutex::new(None)),
        }
    }

    fn cached_token(&self) -> Option<String> {
        if !self.cache_tokens {
            return None;
        }
        let cache = self.token_cache.lock().ok()?;
        cache
            .as_ref()
            .filter(|cached| cached.is_fresh(now_secs()))
            .map(|cached| cached.access_token.clone())
    }

    async fn fetch_token(&self) -> Result<TokenResponse> {
        let resp = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.app_id.as_str()),
                ("client_secret", self.credentials.app_password.as_str()),
                ("scope", TOKEN_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| BotError::Token(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BotError::Token(format!("{}: {}", status, text)));
        }

        resp.json()
            .await
            .map_err(|e| BotError::Token(format!("failed to parse token response: {}", e)))
    }
}

#[async_trait]
impl TokenProvider for BotFrameworkConnector {
    async fn access_token(&self) -> Result<String> {
        if self.credentials.is_anonymous() {
            return Err(BotError::Token(
                "no app credentials configured".to_string(),
            ));
        }

        if let Some(token) = self.cached_token() {
            debug!("Using cached platform token");
            return Ok(token);
        }

        let now = now_secs();
        let resp = self.fetch_token().await?;
        info!("Obtained platform token (expires in {}s)", resp.expires_in);

        if self.cache_tokens {
            if let Ok(mut cache) = self.token_cache.lock() {
                *cache = Some(CachedToken {
                    access_token: resp.access_token.clone(),
                    expires_at: now + resp.expires_in,
                });
            }
        }

        Ok(resp.access_token)
    }
}

#[async_trait]
impl Connector for BotFrameworkConnector {
    async fn reply(&self, message: &IncomingMessage, text: &str) -> Result<()> {
        if message.service_url.is_empty() {
            return Err(BotError::Reply("incoming activity has no serviceUrl".to_string()));
        }

        let mut request = self
            .client
            .post(reply_url(message))
            .json(&ReplyActivity::to(message, text));

        // The emulator accepts unauthenticated replies.
        if !self.credentials.is_anonymous() {
            if !is_https(&message.service_url) {
                return Err(BotError::Reply(format!(
                    "refusing to send token to non-https serviceUrl {}",
                    message.service_url
                )));
            }
            let token = self.access_token().await?;
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| BotError::Reply(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::Reply(format!("{}: {}", status, body)));
        }

        debug!("Reply delivered to conversation {}", message.conversation.id);
        Ok(())
    }
}

/// Bearer tokens are only ever sent over https.
pub fn is_https(url: &str) -> bool {
    url.get(..8)
        .map(|scheme| scheme.eq_ignore_ascii_case("https://"))
        .unwrap_or(false)
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
