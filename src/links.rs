//! URL extraction from incoming messages.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::activity::IncomingMessage;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://[A-Za-z0-9\-_@:%+.~#?,&/=]+").expect("URL pattern is valid")
});

/// First URL carried by a message, or an empty string.
///
/// Attachments win over URLs in the text. Non-message activities never
/// carry a URL.
pub fn extract_url(message: &IncomingMessage) -> String {
    if !message.is_message() {
        return String::new();
    }

    if let Some(attachment) = message.first_attachment() {
        return attachment.content_url.clone();
    }

    find_url(&message.text)
}

/// First `http://` or `https://` URL in `text`; later matches are ignored.
pub fn find_url(text: &str) -> String {
    URL_PATTERN
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
