//! Process configuration loaded from the environment.
//!
//! `.env` is honored via `dotenvy` in `main`; everything here only reads
//! variables. OCR credentials are required, platform credentials are not
//! (an empty app id means the local emulator, which needs no token).

use anyhow::{Context, Result};

const DEFAULT_PORT: u16 = 3978;
const DEFAULT_LANGUAGE: &str = "en";

/// OCR backend location and credentials.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub base_url: String,
    pub api_key: String,
    pub language: String,
}

/// Application identity registered with the conversational platform.
#[derive(Debug, Clone, Default)]
pub struct AppCredentials {
    pub app_id: String,
    pub app_password: String,
}

impl AppCredentials {
    /// True when the bot runs without an identity (local emulator).
    pub fn is_anonymous(&self) -> bool {
        self.app_id.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub port: u16,
    pub ocr: OcrConfig,
    pub credentials: AppCredentials,
    /// Reuse platform access tokens until shortly before expiry.
    pub cache_tokens: bool,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match non_empty("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("PORT is not a valid port: {}", raw))?,
            None => DEFAULT_PORT,
        };

        let base_url = non_empty("COMPUTER_VISION_API_URL")
            .context("COMPUTER_VISION_API_URL environment variable not set")?;
        let api_key = non_empty("COMPUTER_VISION_API_KEY")
            .context("COMPUTER_VISION_API_KEY environment variable not set")?;
        let language = non_empty("OCR_LANGUAGE").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let credentials = AppCredentials {
            app_id: non_empty("MICROSOFT_APP_ID").unwrap_or_default(),
            app_password: non_empty("MICROSOFT_APP_PASSWORD").unwrap_or_default(),
        };
        if !credentials.is_anonymous() && credentials.app_password.is_empty() {
            anyhow::bail!("MICROSOFT_APP_PASSWORD must be set when MICROSOFT_APP_ID is set");
        }

        let cache_tokens = match non_empty("BOT_TOKEN_CACHE") {
            Some(raw) => parse_flag(&raw)
                .with_context(|| format!("BOT_TOKEN_CACHE is not a boolean: {}", raw))?,
            None => true,
        };

        Ok(Self {
            port,
            ocr: OcrConfig {
                base_url,
                api_key,
                language,
            },
            credentials,
            cache_tokens,
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
