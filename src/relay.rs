use std::sync::Arc;

use tracing::{error, info};

use crate::client::ChatClient;
use crate::error::{ForwarderError, Result};
use crate::message::{ChatId, MessageId};

/// How relayed posts appear in the target channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Content only, no forwarded-from header.
    #[default]
    Copy,
    /// Forward with the original attribution.
    Forward,
}

impl DeliveryMode {
    pub fn from_show_forwarded(show_forwarded: bool) -> Self {
        if show_forwarded {
            DeliveryMode::Forward
        } else {
            DeliveryMode::Copy
        }
    }
}

/// Duplicates source posts into the target channel, one attempt each.
pub struct Relayer {
    client: Arc<dyn ChatClient>,
    source: ChatId,
    target: ChatId,
    delivery: DeliveryMode,
}

impl Relayer {
    pub fn new(
        client: Arc<dyn ChatClient>,
        source: ChatId,
        target: ChatId,
        delivery: DeliveryMode,
    ) -> Self {
        Self {
            client,
            source,
            target,
            delivery,
        }
    }

    pub async fn relay(&self, message_id: MessageId) -> Result<()> {
        let as_copy = self.delivery == DeliveryMode::Copy;
        match self
            .client
            .forward_message(self.source, self.target, message_id, as_copy)
            .await
        {
            Ok(()) => {
                info!(message_id = message_id.0, as_copy, "Message forwarded successfully");
                Ok(())
            }
            Err(e) => {
                error!(message_id = message_id.0, "Error forwarding message: {e}");
                Err(ForwarderError::Relay(format!("message {message_id}: {e}")))
            }
        }
    }
}
