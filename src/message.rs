use std::fmt;

use crate::text::FormattedText;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub u64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who a message is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    /// Authored directly by an account (human or bot).
    User(UserId),
    /// Posted on behalf of a chat, e.g. a channel's automatic forward into
    /// its discussion group.
    Chat(ChatId),
    /// Neither attribution is present.
    Unknown,
}

#[derive(Debug, Clone)]
pub enum Content {
    Text(FormattedText),
    Photo { caption: Option<FormattedText> },
    Video { caption: Option<FormattedText> },
    Document { caption: Option<FormattedText> },
    Other,
}

impl Content {
    /// The body for text messages, the caption for captioned media, nothing
    /// for everything else.
    pub fn text(&self) -> Option<&FormattedText> {
        match self {
            Content::Text(text) => Some(text),
            Content::Photo { caption }
            | Content::Video { caption }
            | Content::Document { caption } => caption.as_ref(),
            Content::Other => None,
        }
    }
}

/// A message as seen by the relay core. Built by the client layer, never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub thread_id: Option<MessageId>,
    pub sender: Sender,
    pub content: Content,
}

impl ChannelMessage {
    pub fn text(&self) -> Option<&FormattedText> {
        self.content.text()
    }
}

#[derive(Debug, Clone)]
pub enum Update {
    NewMessage(ChannelMessage),
    /// Any update kind the relay does not act on.
    Other,
}
