pub mod telegram;

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::markdown;
use crate::message::{ChatId, MessageId, Update};
use crate::text::FormattedText;

/// A threaded reply to send into a chat.
#[derive(Debug, Clone)]
pub struct Reply {
    pub chat: ChatId,
    pub thread_id: Option<MessageId>,
    pub reply_to: MessageId,
    pub content: FormattedText,
    pub silent: bool,
}

/// Actions the relay core performs against the chat platform.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Duplicate one message from `from` into `to`. With `as_copy` the
    /// target sees the content without forwarded-from attribution.
    async fn forward_message(
        &self,
        from: ChatId,
        to: ChatId,
        message_id: MessageId,
        as_copy: bool,
    ) -> Result<()>;

    async fn send_reply(&self, reply: Reply) -> Result<()>;

    /// Render a markdown source into formatted text. Only used when the
    /// comment template is loaded.
    fn parse_markdown(&self, text: &str) -> Result<FormattedText> {
        markdown::parse_markdown(text)
    }
}

/// Producer of the update stream the dispatcher drains.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    fn name(&self) -> &str;

    /// Push updates into `updates` until stopped. The stream closes when
    /// this returns and the sender is dropped.
    async fn run(&self, updates: mpsc::Sender<Update>) -> Result<()>;

    async fn stop(&self);
}
