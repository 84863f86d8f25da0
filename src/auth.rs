//! Inbound request authentication.
//!
//! The platform signs every activity it delivers with a JWT. We check the
//! signature against the published signing keys, the issuer, the audience
//! (our app id) and the `serviceurl` claim, which must match the activity's
//! `serviceUrl` so replies only go where the platform said they should.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{BotError, Result};

const OPENID_METADATA_URL: &str =
    "https://login.botframework.com/v1/.well-known/openidconfiguration";
pub const BOT_ISSUER: &str = "https://api.botframework.com";
/// Clock skew tolerated on `exp` / `nbf`.
const LEEWAY_SECS: u64 = 300;
/// Signing keys are refetched after this long.
const KEY_TTL_SECS: u64 = 24 * 3600;

/// A signing key and the algorithm it verifies.
#[derive(Clone)]
pub struct SigningKey {
    pub key: DecodingKey,
    pub algorithm: Algorithm,
}

/// Lookup of signing keys by key id.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn key(&self, kid: &str) -> Result<SigningKey>;
}

#[derive(Deserialize)]
struct OpenIdMetadata {
    jwks_uri: String,
}

#[derive(Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

/// RSA keys from a JWKS document, keyed by `kid`. Other key types are skipped.
fn keys_from_jwks(set: JwkSet) -> HashMap<String, SigningKey> {
    let mut keys = HashMap::new();
    for jwk in set.keys {
        let (Some(kid), Some(n), Some(e)) = (jwk.kid, jwk.n, jwk.e) else {
            continue;
        };
        if jwk.kty != "RSA" {
            continue;
        }
        match DecodingKey::from_rsa_components(&n, &e) {
            Ok(key) => {
                keys.insert(
                    kid,
                    SigningKey {
                        key,
                        algorithm: Algorithm::RS256,
                    },
                );
            }
            Err(err) => warn!("Skipping signing key '{}': {}", kid, err),
        }
    }
    keys
}

struct CachedKeys {
    keys: HashMap<String, SigningKey>,
    expires_at: u64,
}

/// Signing keys fetched from the platform's OpenID metadata and cached.
pub struct OpenIdKeyStore {
    client: reqwest::Client,
    cache: Arc<Mutex<Option<CachedKeys>>>,
}

impl OpenIdKeyStore {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    fn cached(&self, kid: &str) -> Option<SigningKey> {
        let cache = self.cache.lock().ok()?;
        cache
            .as_ref()
            .filter(|c| now_secs() < c.expires_at)
            .and_then(|c| c.keys.get(kid).cloned())
    }

    async fn refresh(&self) -> Result<HashMap<String, SigningKey>> {
        let metadata: OpenIdMetadata = self
            .client
            .get(OPENID_METADATA_URL)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| BotError::Unauthorized(format!("OpenID metadata request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| BotError::Unauthorized(format!("invalid OpenID metadata: {}", e)))?;

        let set: JwkSet = self
            .client
            .get(&metadata.jwks_uri)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| BotError::Unauthorized(format!("signing key request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| BotError::Unauthorized(format!("invalid signing key set: {}", e)))?;

        let keys = keys_from_jwks(set);
        info!("Loaded {} platform signing key(s)", keys.len());
        Ok(keys)
    }
}

#[async_trait]
impl KeyStore for OpenIdKeyStore {
    async fn key(&self, kid: &str) -> Result<SigningKey> {
        if let Some(key) = self.cached(kid) {
            return Ok(key);
        }

        // Unknown kid or stale cache: the platform rotates keys, so refetch once.
        let keys = self.refresh().await?;
        let found = keys.get(kid).cloned();
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(CachedKeys {
                keys,
                expires_at: now_secs() + KEY_TTL_SECS,
            });
        }
        found.ok_or_else(|| BotError::Unauthorized(format!("unknown signing key '{}'", kid)))
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    serviceurl: Option<String>,
}

/// Verifies the `Authorization` header of inbound activities.
pub struct Authenticator {
    app_id: String,
    keys: Arc<dyn KeyStore>,
}

impl Authenticator {
    pub fn new(app_id: impl Into<String>, keys: Arc<dyn KeyStore>) -> Self {
        Self {
            app_id: app_id.into(),
            keys,
        }
    }

    /// Accept the request only if `authorization` carries a valid platform
    /// token issued for this bot and for `service_url`.
    pub async fn verify(&self, authorization: Option<&str>, service_url: &str) -> Result<()> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BotError::Unauthorized("missing bearer token".to_string()))?;

        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| BotError::Unauthorized(format!("malformed token: {}", e)))?;
        let kid = header
            .kid
            .ok_or_else(|| BotError::Unauthorized("token has no key id".to_string()))?;
        let signing = self.keys.key(&kid).await?;

        if header.alg != signing.algorithm {
            return Err(BotError::Unauthorized(format!(
                "unexpected token algorithm {:?}",
                header.alg
            )));
        }

        let mut validation = Validation::new(signing.algorithm);
        validation.set_audience(&[self.app_id.as_str()]);
        validation.set_issuer(&[BOT_ISSUER]);
        validation.leeway = LEEWAY_SECS;

        let data = jsonwebtoken::decode::<Claims>(token, &signing.key, &validation)
            .map_err(|e| BotError::Unauthorized(format!("invalid token: {}", e)))?;

        let claimed = data.claims.serviceurl.unwrap_or_default();
        if !same_service_url(&claimed, service_url) {
            return Err(BotError::Unauthorized(format!(
                "serviceUrl '{}' does not match token claim '{}'",
                service_url, claimed
            )));
        }

        debug!("Inbound token verified (kid={})", kid);
        Ok(())
    }
}

fn same_service_url(claimed: &str, actual: &str) -> bool {
    !claimed.is_empty() && claimed.trim_end_matches('/') == actual.trim_end_matches('/')
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
