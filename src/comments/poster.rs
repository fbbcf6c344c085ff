use std::sync::Arc;

use tracing::{error, info};

use crate::client::{ChatClient, Reply};
use crate::error::{ForwarderError, Result};
use crate::message::{ChannelMessage, ChatId};
use crate::text::FormattedText;

/// Sends the comment template as a threaded reply.
pub struct CommentPoster {
    client: Arc<dyn ChatClient>,
    discussion: ChatId,
    template: FormattedText,
    silent: bool,
}

impl CommentPoster {
    pub fn new(
        client: Arc<dyn ChatClient>,
        discussion: ChatId,
        template: FormattedText,
        silent: bool,
    ) -> Self {
        Self {
            client,
            discussion,
            template,
            silent,
        }
    }

    pub async fn post_comment(&self, message: &ChannelMessage) -> Result<()> {
        let reply = Reply {
            chat: self.discussion,
            thread_id: message.thread_id,
            reply_to: message.id,
            content: self.template.clone(),
            silent: self.silent,
        };

        match self.client.send_reply(reply).await {
            Ok(()) => {
                info!(message_id = message.id.0, "Comment posted");
                Ok(())
            }
            Err(e) => {
                error!(message_id = message.id.0, "Error posting comment: {e}");
                Err(ForwarderError::Comment(format!("message {}: {e}", message.id)))
            }
        }
    }
}
