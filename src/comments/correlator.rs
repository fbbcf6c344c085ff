use crate::message::{ChannelMessage, ChatId, Sender};
use crate::text::{same_text, FormattedText};

/// Recognises the target channel's automatic forward of a relayed post
/// among everything else arriving in the discussion group.
///
/// The decision is made per message from sender identity and content alone;
/// no record of relayed ids is kept.
#[derive(Debug, Clone)]
pub struct Correlator {
    target: ChatId,
    template: Option<FormattedText>,
}

impl Correlator {
    pub fn new(target: ChatId, template: Option<FormattedText>) -> Self {
        Self { target, template }
    }

    pub fn should_comment(&self, message: &ChannelMessage) -> bool {
        let Some(template) = &self.template else {
            return false;
        };

        // Our own comment comes back through the same stream; answering it
        // would loop forever.
        if same_text(message.text(), Some(template)) {
            return false;
        }

        match message.sender {
            Sender::User(_) => false,
            Sender::Chat(chat) => chat == self.target,
            Sender::Unknown => false,
        }
    }
}
