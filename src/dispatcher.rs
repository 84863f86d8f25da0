//! Per-message dispatch: attachment, URL, or greeting.
//!
//! Branches are checked in that order and exactly one reply is produced.
//! Every failure along the way becomes the reply text.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::activity::{Attachment, IncomingMessage};
use crate::error::Result;
use crate::fetcher::AttachmentFetcher;
use crate::links::extract_url;
use crate::ocr::response::extract_text;
use crate::ocr::{OcrBackend, OcrInput};

pub const GREETING: &str =
    "Hi!  Try attaching an image or url link with words in it (jpeg, png, gif, or bmp work for me).";

/// Where a reply goes. Called exactly once per handled message.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

pub struct Dispatcher {
    fetcher: AttachmentFetcher,
    ocr: Arc<dyn OcrBackend>,
}

impl Dispatcher {
    pub fn new(fetcher: AttachmentFetcher, ocr: Arc<dyn OcrBackend>) -> Self {
        Self { fetcher, ocr }
    }

    /// Handle `message` and hand the single reply to `sink`.
    pub async fn dispatch(&self, message: &IncomingMessage, sink: &dyn ReplySink) -> Result<()> {
        let reply = self.respond(message).await;
        sink.send(&reply).await
    }

    /// The reply text for `message`. Never fails.
    pub async fn respond(&self, message: &IncomingMessage) -> String {
        if let Some(attachment) = message.first_attachment() {
            info!(
                "Attachment received: name={} type={} url={}",
                attachment.name.as_deref().unwrap_or("-"),
                attachment.content_type,
                attachment.content_url
            );
            return match self.read_attachment(attachment, message).await {
                Ok(text) => text,
                Err(e) => {
                    error!(status = ?e.status_code(), "Error with attachment: {}", e);
                    format!("Error with attachment or reading image with {}", e)
                }
            };
        }

        let url = extract_url(message);
        if !url.is_empty() {
            info!("URL received: {}", url);
            return match self.read(OcrInput::Url { url: url.clone() }).await {
                Ok(text) => text,
                Err(e) => {
                    error!("Error reading image at {}: {}", url, e);
                    format!("Error reading image at {} with {}", url, e)
                }
            };
        }

        GREETING.to_string()
    }

    async fn read_attachment(
        &self,
        attachment: &Attachment,
        message: &IncomingMessage,
    ) -> Result<String> {
        let data = self.fetcher.fetch(&attachment.content_url, message).await?;
        self.read(OcrInput::Bytes { data }).await
    }

    async fn read(&self, input: OcrInput) -> Result<String> {
        let response = self.ocr.submit(&input).await?;
        if !response.is_success() {
            warn!(
                "{} returned HTTP {} ({})",
                self.ocr.name(),
                response.status,
                response.content_type.as_deref().unwrap_or("no content type")
            );
        }
        Ok(extract_text(&response.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::response::{AMISS_REPLY, NO_TEXT_REPLY};
    use crate::ocr::OcrBody;
    use crate::testing::{ocr_words, CallLog, FakeDownloader, FakeOcr, FakeTokens, RecordingSink};

    struct Harness {
        log: CallLog,
        ocr: Arc<FakeOcr>,
        dispatcher: Dispatcher,
    }

    fn harness(downloader: FakeDownloader, ocr: FakeOcr, log: CallLog) -> Harness {
        harness_with_tokens(FakeTokens::new(log.clone()), downloader, ocr, log)
    }

    fn harness_with_tokens(
        tokens: FakeTokens,
        downloader: FakeDownloader,
        ocr: FakeOcr,
        log: CallLog,
    ) -> Harness {
        let ocr = Arc::new(ocr);
        let fetcher = AttachmentFetcher::new(Arc::new(tokens), Arc::new(downloader));
        Harness {
            log,
            dispatcher: Dispatcher::new(fetcher, ocr.clone()),
            ocr,
        }
    }

    fn working(log: &CallLog, body: OcrBody) -> Harness {
        harness(
            FakeDownloader::new(log.clone(), b"png".to_vec()),
            FakeOcr::answering(log.clone(), body),
            log.clone(),
        )
    }

    #[tokio::test]
    async fn test_skype_attachment_requests_token_before_download() {
        let log = CallLog::default();
        let h = working(&log, ocr_words(&["a", "b"]));
        let msg = IncomingMessage::text_message("skype", "")
            .with_attachment("https://skype.example.com/img", "image/png");
        let sink = RecordingSink::default();

        h.dispatcher.dispatch(&msg, &sink).await.unwrap();

        assert_eq!(
            h.log.calls(),
            vec![
                "token".to_string(),
                "download https://skype.example.com/img bearer=token-1".to_string(),
                "ocr 3 bytes".to_string(),
            ]
        );
        assert_eq!(h.ocr.inputs(), vec![OcrInput::Bytes { data: b"png".to_vec() }]);
        assert_eq!(sink.replies(), vec!["a b".to_string()]);
    }

    #[tokio::test]
    async fn test_webchat_attachment_downloads_without_token() {
        let log = CallLog::default();
        let h = working(&log, ocr_words(&["hello"]));
        let msg = IncomingMessage::text_message("webchat", "")
            .with_attachment("https://webchat.example.com/img", "image/jpeg");
        let sink = RecordingSink::default();

        h.dispatcher.dispatch(&msg, &sink).await.unwrap();

        assert_eq!(h.log.count("token"), 0);
        assert_eq!(h.log.count("download"), 1);
        assert_eq!(sink.replies(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_url_in_text_is_submitted_as_url() {
        let log = CallLog::default();
        let h = working(&log, ocr_words(&["x"]));
        let msg =
            IncomingMessage::text_message("webchat", "check this out http://example.com/x.png thanks");
        let sink = RecordingSink::default();

        h.dispatcher.dispatch(&msg, &sink).await.unwrap();

        assert_eq!(
            h.ocr.inputs(),
            vec![OcrInput::Url {
                url: "http://example.com/x.png".to_string()
            }]
        );
        assert_eq!(h.log.count("download"), 0);
        assert_eq!(sink.replies(), vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_plain_text_gets_greeting() {
        let log = CallLog::default();
        let h = working(&log, ocr_words(&["unused"]));
        let msg = IncomingMessage::text_message("webchat", "hello bot");
        let sink = RecordingSink::default();

        h.dispatcher.dispatch(&msg, &sink).await.unwrap();

        assert!(h.log.calls().is_empty());
        assert_eq!(sink.replies(), vec![GREETING.to_string()]);
    }

    #[tokio::test]
    async fn test_download_failure_replies_once() {
        let log = CallLog::default();
        let h = harness(
            FakeDownloader::failing(log.clone(), 403),
            FakeOcr::answering(log.clone(), ocr_words(&["unused"])),
            log.clone(),
        );
        let msg = IncomingMessage::text_message("msteams", "")
            .with_attachment("https://teams.example.com/img", "image/png");
        let sink = RecordingSink::default();

        h.dispatcher.dispatch(&msg, &sink).await.unwrap();

        let replies = sink.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with("Error with attachment or reading image with"));
        assert!(replies[0].contains("403"));
        assert_eq!(h.log.count("ocr"), 0);
    }

    #[tokio::test]
    async fn test_token_failure_replies_once_without_download() {
        let log = CallLog::default();
        let h = harness_with_tokens(
            FakeTokens::failing(log.clone()),
            FakeDownloader::new(log.clone(), b"png".to_vec()),
            FakeOcr::answering(log.clone(), ocr_words(&["unused"])),
            log.clone(),
        );
        let msg = IncomingMessage::text_message("skype", "")
            .with_attachment("https://skype.example.com/img", "image/png");
        let sink = RecordingSink::default();

        h.dispatcher.dispatch(&msg, &sink).await.unwrap();

        assert_eq!(sink.replies().len(), 1);
        assert_eq!(h.log.calls(), vec!["token".to_string()]);
    }

    #[tokio::test]
    async fn test_ocr_transport_failure_replies_once() {
        let log = CallLog::default();
        let h = harness(
            FakeDownloader::new(log.clone(), b"png".to_vec()),
            FakeOcr::unreachable(log.clone()),
            log.clone(),
        );
        let sink = RecordingSink::default();

        let with_attachment = IncomingMessage::text_message("webchat", "")
            .with_attachment("https://webchat.example.com/img", "image/png");
        h.dispatcher.dispatch(&with_attachment, &sink).await.unwrap();

        let with_url = IncomingMessage::text_message("webchat", "https://example.com/y.png");
        h.dispatcher.dispatch(&with_url, &sink).await.unwrap();

        let replies = sink.replies();
        assert_eq!(replies.len(), 2);
        assert!(replies[0].contains("connection refused"));
        assert!(replies[1].starts_with("Error reading image at https://example.com/y.png"));
    }

    #[tokio::test]
    async fn test_degraded_ocr_bodies() {
        let log = CallLog::default();
        let msg = IncomingMessage::text_message("webchat", "http://example.com/z.png");

        let h = working(&log, OcrBody::Raw("<html>oops</html>".to_string()));
        assert_eq!(h.dispatcher.respond(&msg).await, AMISS_REPLY);

        let h = working(&log, OcrBody::Structured(serde_json::json!({"regions": []})));
        assert_eq!(h.dispatcher.respond(&msg).await, NO_TEXT_REPLY);
    }
}
