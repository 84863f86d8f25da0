//! Error taxonomy for message handling.
//!
//! None of these are fatal: the dispatcher turns every one of them into a
//! single chat reply.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    /// Attachment could not be fetched (bad status, network failure, bad data URI).
    #[error("download failed{}: {message}", status_suffix(.status))]
    Download {
        status: Option<u16>,
        message: String,
    },

    /// Access token could not be obtained from the platform.
    #[error("token request failed: {0}")]
    Token(String),

    /// OCR backend unreachable or the request could not be sent.
    #[error("OCR request failed: {0}")]
    Transport(String),

    /// Reply could not be delivered to the conversation.
    #[error("reply failed: {0}")]
    Reply(String),

    /// Inbound request did not carry a valid platform token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl BotError {
    pub fn download(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Download {
            status,
            message: message.into(),
        }
    }

    /// HTTP status carried by a download error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Download { status, .. } => *status,
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, BotError>;
