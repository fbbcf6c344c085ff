use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::client::ChatClient;
use crate::comments::{CommentPoster, Correlator};
use crate::config::RelayConfig;
use crate::filter::IgnoreFilter;
use crate::message::{ChannelMessage, ChatId, Update};
use crate::relay::Relayer;

/// What happened to one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Relayed,
    /// Source post rejected by the ignore filter.
    Filtered,
    Commented,
    /// Discussion message that is not a relayed post.
    NotCommented,
    /// Not a new message, or from a chat we do not track.
    Ignored,
    /// An action was attempted and failed. The update is dropped.
    Failed(String),
}

/// Routes each update to the relay path or the comment path by chat id.
pub struct Dispatcher {
    source: ChatId,
    discussion: Option<ChatId>,
    filter: IgnoreFilter,
    relayer: Relayer,
    correlator: Correlator,
    poster: Option<CommentPoster>,
}

impl Dispatcher {
    pub fn new(config: RelayConfig, client: Arc<dyn ChatClient>) -> Self {
        let relayer = Relayer::new(client.clone(), config.source, config.target, config.delivery);
        let correlator = Correlator::new(config.target, config.comment_template.clone());
        let poster = match (config.discussion, config.comment_template) {
            (Some(discussion), Some(template)) => Some(CommentPoster::new(
                client,
                discussion,
                template,
                config.silent_comments,
            )),
            _ => None,
        };

        Self {
            source: config.source,
            discussion: config.discussion,
            filter: config.filter,
            relayer,
            correlator,
            poster,
        }
    }

    /// Process a single update to completion.
    pub async fn handle(&self, update: Update) -> Outcome {
        let Update::NewMessage(message) = update else {
            return Outcome::Ignored;
        };

        if message.chat_id == self.source {
            return self.handle_source(&message).await;
        }

        if Some(message.chat_id) == self.discussion {
            return self.handle_discussion(&message).await;
        }

        Outcome::Ignored
    }

    async fn handle_source(&self, message: &ChannelMessage) -> Outcome {
        if !self.filter.should_forward(message.text()) {
            info!(message_id = message.id.0, "Message was not forwarded");
            return Outcome::Filtered;
        }

        info!(message_id = message.id.0, "New message from source channel");
        match self.relayer.relay(message.id).await {
            Ok(()) => Outcome::Relayed,
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    async fn handle_discussion(&self, message: &ChannelMessage) -> Outcome {
        let Some(poster) = &self.poster else {
            return Outcome::NotCommented;
        };
        if !self.correlator.should_comment(message) {
            debug!(message_id = message.id.0, "No comment needed");
            return Outcome::NotCommented;
        }

        info!(message_id = message.id.0, "Message is a relayed post, posting comment");
        match poster.post_comment(message).await {
            Ok(()) => Outcome::Commented,
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    /// Drain `updates` in arrival order, one at a time, until the sender
    /// side closes. Returns the number of updates handled.
    pub async fn run(&self, mut updates: mpsc::Receiver<Update>) -> usize {
        let mut handled = 0;
        while let Some(update) = updates.recv().await {
            let outcome = self.handle(update).await;
            debug!(?outcome, "Update handled");
            handled += 1;
        }
        info!(handled, "Update stream closed");
        handled
    }
}
