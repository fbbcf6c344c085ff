//! Recording client double for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{ChatClient, Reply};
use crate::error::{ForwarderError, Result};
use crate::message::{ChatId, MessageId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forwarded {
    pub from: ChatId,
    pub to: ChatId,
    pub message_id: MessageId,
    pub as_copy: bool,
}

#[derive(Default)]
pub struct RecordingClient {
    pub forwarded: Mutex<Vec<Forwarded>>,
    pub replies: Mutex<Vec<Reply>>,
    fail: bool,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose every action fails after being recorded.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn forwarded(&self) -> Vec<Forwarded> {
        self.forwarded.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for RecordingClient {
    async fn forward_message(
        &self,
        from: ChatId,
        to: ChatId,
        message_id: MessageId,
        as_copy: bool,
    ) -> Result<()> {
        self.forwarded.lock().unwrap().push(Forwarded {
            from,
            to,
            message_id,
            as_copy,
        });
        if self.fail {
            return Err(ForwarderError::Client("chat not found".to_string()));
        }
        Ok(())
    }

    async fn send_reply(&self, reply: Reply) -> Result<()> {
        self.replies.lock().unwrap().push(reply);
        if self.fail {
            return Err(ForwarderError::Client("not enough rights".to_string()));
        }
        Ok(())
    }
}
