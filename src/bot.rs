//! Bot host: routes each activity to a trigger or the dispatcher and
//! delivers the reply through the platform connector.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::activity::IncomingMessage;
use crate::config::BotConfig;
use crate::connector::{BotFrameworkConnector, Connector};
use crate::dispatcher::{Dispatcher, ReplySink};
use crate::error::Result;
use crate::fetcher::{AttachmentFetcher, HttpDownloader};
use crate::ocr::vision::VisionClient;
use crate::triggers::Triggers;

/// How an activity was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Not a message; nothing sent.
    Ignored,
    /// A trigger matched and its reply was sent.
    Trigger(String),
    /// Went through the dispatcher.
    Dispatched,
}

/// Replies into the conversation a message came from.
struct ConversationReply<'a> {
    connector: &'a dyn Connector,
    message: &'a IncomingMessage,
}

#[async_trait]
impl ReplySink for ConversationReply<'_> {
    async fn send(&self, text: &str) -> Result<()> {
        self.connector.reply(self.message, text).await
    }
}

pub struct Bot {
    triggers: Triggers,
    dispatcher: Dispatcher,
    connector: Arc<dyn Connector>,
}

impl Bot {
    pub fn new(triggers: Triggers, dispatcher: Dispatcher, connector: Arc<dyn Connector>) -> Self {
        Self {
            triggers,
            dispatcher,
            connector,
        }
    }

    /// Wire the production collaborators from config.
    pub fn from_config(config: &BotConfig, client: reqwest::Client) -> Self {
        let connector = Arc::new(BotFrameworkConnector::new(
            config.credentials.clone(),
            config.cache_tokens,
            client.clone(),
        ));
        let fetcher = AttachmentFetcher::new(
            connector.clone(),
            Arc::new(HttpDownloader::new(client.clone())),
        );
        let ocr = Arc::new(VisionClient::new(&config.ocr, client));
        info!("OCR endpoint: {}", ocr.endpoint());
        let dispatcher = Dispatcher::new(fetcher, ocr);

        let triggers = Triggers::standard();
        info!("Loaded {} trigger(s)", triggers.len());

        Self::new(triggers, dispatcher, connector)
    }

    /// Handle one activity. Reply delivery failures are logged, not returned.
    pub async fn handle(&self, message: &IncomingMessage) -> Handled {
        if !message.is_message() {
            debug!("Ignoring {} activity", message.kind.as_str());
            return Handled::Ignored;
        }

        let sink = ConversationReply {
            connector: self.connector.as_ref(),
            message,
        };

        let (handled, result) = match self.triggers.find(&message.text) {
            Some(trigger) => {
                info!("Trigger '{}' matched", trigger.name);
                let result = sink.send(&trigger.reply).await;
                (Handled::Trigger(trigger.name.clone()), result)
            }
            None => (Handled::Dispatched, self.dispatcher.dispatch(message, &sink).await),
        };

        if let Err(e) = result {
            error!("Failed to deliver reply: {}", e);
        }
        handled
    }
}
