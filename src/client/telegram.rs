use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::net::default_reqwest_settings;
use teloxide::payloads::{GetUpdatesSetters, SendMessageSetters};
use teloxide::requests::Requester;
use teloxide::types::{
    AllowedUpdate, MessageEntity, MessageEntityKind, ReplyParameters, ThreadId, UpdateKind,
};
use teloxide::Bot;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::client::{ChatClient, Reply, UpdateSource};
use crate::config::TelegramConfig;
use crate::error::{ForwarderError, Result};
use crate::message::{ChannelMessage, ChatId, Content, MessageId, Sender, Update, UserId};
use crate::text::{EntityKind, FormattedText, TextEntity};

/// Bot API client: performs relay actions and long-polls for updates.
pub struct TelegramClient {
    bot: Bot,
    poll_timeout: u32,
    running: Arc<AtomicBool>,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let token = config
            .token()
            .ok_or_else(|| ForwarderError::Config("telegram.bot_token is required".to_string()))?;

        // Default teloxide client has a 17s timeout, too short for long polls.
        let client = default_reqwest_settings()
            .timeout(Duration::from_secs(u64::from(config.poll_timeout_secs) + 30))
            .build()
            .map_err(|e| ForwarderError::Client(format!("Failed to build HTTP client: {e}")))?;

        let mut bot = Bot::with_client(token, client);
        if let Some(api_url) = config.api_url.as_deref().filter(|u| !u.trim().is_empty()) {
            let url = url::Url::parse(api_url).map_err(|e| {
                ForwarderError::Config(format!("invalid telegram.api_url '{api_url}': {e}"))
            })?;
            bot = bot.set_api_url(url);
        }

        Ok(Self {
            bot,
            poll_timeout: config.poll_timeout_secs,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Check the token against the API. Nothing else may run before this
    /// succeeds.
    pub async fn authorize(&self) -> Result<()> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| ForwarderError::Client(format!("authorization failed: {e}")))?;
        info!("Authorization successful as @{} ({})", me.username(), me.id);
        Ok(())
    }
}

/// `getUpdates` takes a signed offset; ids past `i32::MAX` cannot be acked.
fn next_offset(update_id: u32) -> Option<i32> {
    i32::try_from(update_id).ok()?.checked_add(1)
}

fn tg_message_id(id: MessageId) -> Result<teloxide::types::MessageId> {
    i32::try_from(id.0)
        .map(teloxide::types::MessageId)
        .map_err(|_| ForwarderError::Client(format!("message id {id} out of range")))
}

#[async_trait]
impl ChatClient for TelegramClient {
    async fn forward_message(
        &self,
        from: ChatId,
        to: ChatId,
        message_id: MessageId,
        as_copy: bool,
    ) -> Result<()> {
        let from = teloxide::types::ChatId(from.0);
        let to = teloxide::types::ChatId(to.0);
        let id = tg_message_id(message_id)?;

        let result = if as_copy {
            self.bot.copy_message(to, from, id).await.map(|_| ())
        } else {
            self.bot.forward_message(to, from, id).await.map(|_| ())
        };
        result.map_err(|e| ForwarderError::Client(e.to_string()))
    }

    async fn send_reply(&self, reply: Reply) -> Result<()> {
        let entities = to_tg_entities(&reply.content.entities)?;
        let reply_to = tg_message_id(reply.reply_to)?;

        let mut request = self
            .bot
            .send_message(teloxide::types::ChatId(reply.chat.0), reply.content.text)
            .entities(entities)
            .reply_parameters(ReplyParameters::new(reply_to))
            .disable_notification(reply.silent);
        if let Some(thread) = reply.thread_id {
            request = request.message_thread_id(ThreadId(tg_message_id(thread)?));
        }

        request
            .await
            .map(|_| ())
            .map_err(|e| ForwarderError::Client(e.to_string()))
    }
}

#[async_trait]
impl UpdateSource for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn run(&self, updates: mpsc::Sender<Update>) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        let mut offset: i32 = 0;

        info!("Listening for updates...");
        while self.running.load(Ordering::SeqCst) {
            let batch = match self
                .bot
                .get_updates()
                .offset(offset)
                .timeout(self.poll_timeout)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::ChannelPost])
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("Telegram getUpdates error: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            for update in batch {
                match next_offset(update.id.0) {
                    Some(next) => offset = next,
                    None => warn!(update_id = update.id.0, "Update id out of offset range"),
                }

                let converted = match &update.kind {
                    UpdateKind::Message(message) | UpdateKind::ChannelPost(message) => {
                        Update::NewMessage(convert_message(message))
                    }
                    _ => Update::Other,
                };

                if updates.send(converted).await.is_err() {
                    error!("Update consumer is gone, stopping poller");
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }

        debug!("Telegram poller exited");
        Ok(())
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("Telegram poller stopped");
    }
}

/// Map a Bot API message onto the relay core's view of it.
pub fn convert_message(message: &teloxide::types::Message) -> ChannelMessage {
    let sender = if let Some(chat) = &message.sender_chat {
        Sender::Chat(ChatId(chat.id.0))
    } else if let Some(user) = &message.from {
        Sender::User(UserId(user.id.0))
    } else {
        Sender::Unknown
    };

    ChannelMessage {
        id: MessageId(i64::from(message.id.0)),
        chat_id: ChatId(message.chat.id.0),
        thread_id: message
            .thread_id
            .map(|thread| MessageId(i64::from(thread.0 .0))),
        sender,
        content: convert_content(message),
    }
}

fn convert_content(message: &teloxide::types::Message) -> Content {
    if let Some(text) = message.text() {
        return Content::Text(formatted(text, message.entities()));
    }

    let caption = message
        .caption()
        .map(|caption| formatted(caption, message.caption_entities()));

    if message.photo().is_some() {
        Content::Photo { caption }
    } else if message.video().is_some() {
        Content::Video { caption }
    } else if message.document().is_some() {
        Content::Document { caption }
    } else {
        Content::Other
    }
}

fn formatted(text: &str, entities: Option<&[MessageEntity]>) -> FormattedText {
    let entities = entities
        .unwrap_or_default()
        .iter()
        .map(|e| TextEntity::new(e.offset, e.length, from_tg_kind(&e.kind)))
        .collect();
    FormattedText::formatted(text, entities)
}

fn from_tg_kind(kind: &MessageEntityKind) -> EntityKind {
    match kind {
        MessageEntityKind::Bold => EntityKind::Bold,
        MessageEntityKind::Italic => EntityKind::Italic,
        MessageEntityKind::Underline => EntityKind::Underline,
        MessageEntityKind::Strikethrough => EntityKind::Strikethrough,
        MessageEntityKind::Spoiler => EntityKind::Spoiler,
        MessageEntityKind::Code => EntityKind::Code,
        MessageEntityKind::Pre { language } => EntityKind::Pre {
            language: language.clone(),
        },
        MessageEntityKind::TextLink { url } => EntityKind::TextLink {
            url: url.to_string(),
        },
        MessageEntityKind::Url => EntityKind::Url,
        MessageEntityKind::Mention => EntityKind::Mention,
        MessageEntityKind::Hashtag => EntityKind::Hashtag,
        MessageEntityKind::Cashtag => EntityKind::Cashtag,
        MessageEntityKind::BotCommand => EntityKind::BotCommand,
        MessageEntityKind::Email => EntityKind::Email,
        MessageEntityKind::PhoneNumber => EntityKind::PhoneNumber,
        MessageEntityKind::Blockquote => EntityKind::Blockquote,
        MessageEntityKind::CustomEmoji { .. } => EntityKind::CustomEmoji,
        _ => EntityKind::Other,
    }
}

/// Entities we send explicitly. Kinds Telegram detects on its own (links,
/// mentions, hashtags) and kinds that need payloads we do not carry are left
/// out.
fn to_tg_entities(entities: &[TextEntity]) -> Result<Vec<MessageEntity>> {
    let mut out = Vec::with_capacity(entities.len());
    for entity in entities {
        let kind = match &entity.kind {
            EntityKind::Bold => MessageEntityKind::Bold,
            EntityKind::Italic => MessageEntityKind::Italic,
            EntityKind::Underline => MessageEntityKind::Underline,
            EntityKind::Strikethrough => MessageEntityKind::Strikethrough,
            EntityKind::Spoiler => MessageEntityKind::Spoiler,
            EntityKind::Code => MessageEntityKind::Code,
            EntityKind::Pre { language } => MessageEntityKind::Pre {
                language: language.clone(),
            },
            EntityKind::TextLink { url } => {
                let url = url::Url::parse(url)
                    .map_err(|e| ForwarderError::Client(format!("invalid link '{url}': {e}")))?;
                MessageEntityKind::TextLink { url }
            }
            EntityKind::Url
            | EntityKind::Mention
            | EntityKind::Hashtag
            | EntityKind::Cashtag
            | EntityKind::BotCommand
            | EntityKind::Email
            | EntityKind::PhoneNumber
            | EntityKind::Blockquote
            | EntityKind::CustomEmoji
            | EntityKind::Other => continue,
        };
        out.push(MessageEntity::new(kind, entity.offset, entity.length));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::Correlator;

    fn parse(json: &str) -> teloxide::types::Message {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_channel_post_with_entities() {
        let message = parse(
            r#"{
                "message_id": 5,
                "date": 1700000000,
                "chat": {"id": -1001, "type": "channel", "title": "Source"},
                "sender_chat": {"id": -1001, "type": "channel", "title": "Source"},
                "text": "hello #aff",
                "entities": [{"type": "hashtag", "offset": 6, "length": 4}]
            }"#,
        );
        let converted = convert_message(&message);

        assert_eq!(converted.id, MessageId(5));
        assert_eq!(converted.chat_id, ChatId(-1001));
        assert_eq!(converted.sender, Sender::Chat(ChatId(-1001)));
        let text = converted.text().unwrap();
        assert_eq!(text.text, "hello #aff");
        assert_eq!(text.entities, vec![TextEntity::new(6, 4, EntityKind::Hashtag)]);
    }

    #[test]
    fn test_automatic_forward_attributed_to_channel() {
        // Telegram sets `from` to its service account and `sender_chat` to
        // the channel for posts mirrored into the discussion group.
        let message = parse(
            r#"{
                "message_id": 9,
                "date": 1700000000,
                "chat": {"id": -1003, "type": "supergroup", "title": "Discussion"},
                "from": {"id": 777000, "is_bot": false, "first_name": "Telegram"},
                "sender_chat": {"id": -1002, "type": "channel", "title": "Target"},
                "is_automatic_forward": true,
                "text": "original post"
            }"#,
        );
        let converted = convert_message(&message);

        assert_eq!(converted.chat_id, ChatId(-1003));
        assert_eq!(converted.sender, Sender::Chat(ChatId(-1002)));
    }

    #[test]
    fn test_user_message_in_group() {
        let message = parse(
            r#"{
                "message_id": 10,
                "date": 1700000000,
                "chat": {"id": -1003, "type": "supergroup", "title": "Discussion"},
                "from": {"id": 42, "is_bot": false, "first_name": "Alice"},
                "text": "nice"
            }"#,
        );
        assert_eq!(convert_message(&message).sender, Sender::User(UserId(42)));
    }

    #[test]
    fn test_photo_caption_is_extracted() {
        let message = parse(
            r#"{
                "message_id": 11,
                "date": 1700000000,
                "chat": {"id": -1001, "type": "channel", "title": "Source"},
                "photo": [{"file_id": "a", "file_unique_id": "b", "width": 10, "height": 10, "file_size": 100}],
                "caption": "look",
                "caption_entities": [{"type": "bold", "offset": 0, "length": 4}]
            }"#,
        );
        let converted = convert_message(&message);

        assert!(matches!(converted.content, Content::Photo { .. }));
        let caption = converted.text().unwrap();
        assert_eq!(caption.text, "look");
        assert_eq!(caption.entities, vec![TextEntity::new(0, 4, EntityKind::Bold)]);
    }

    #[test]
    fn test_outgoing_entities_skip_auto_detected_kinds() {
        let entities = vec![
            TextEntity::new(0, 4, EntityKind::Bold),
            TextEntity::new(5, 4, EntityKind::Hashtag),
            TextEntity::new(
                10,
                3,
                EntityKind::TextLink {
                    url: "https://t.me/example".to_string(),
                },
            ),
        ];
        let out = to_tg_entities(&entities).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, MessageEntityKind::Bold);
        assert_eq!((out[1].offset, out[1].length), (10, 3));
    }

    #[test]
    fn test_outgoing_bad_link_is_error() {
        let entities = vec![TextEntity::new(
            0,
            1,
            EntityKind::TextLink {
                url: "not a url".to_string(),
            },
        )];
        assert!(to_tg_entities(&entities).is_err());
    }

    #[test]
    fn test_template_echo_matches_rendered_template() {
        let template = crate::markdown::parse_markdown("**Join** our group!").unwrap();
        let echo = parse(
            r#"{
                "message_id": 12,
                "date": 1700000000,
                "chat": {"id": -1003, "type": "supergroup", "title": "Discussion"},
                "sender_chat": {"id": -1002, "type": "channel", "title": "Target"},
                "text": "Join our group!",
                "entities": [{"type": "bold", "offset": 0, "length": 4}]
            }"#,
        );
        let converted = convert_message(&echo);

        assert!(converted.text().unwrap().same_as(&template));
        let correlator = Correlator::new(ChatId(-1002), Some(template));
        assert!(!correlator.should_comment(&converted));
    }

    #[test]
    fn test_unformatted_template_echo_matches() {
        let template = crate::markdown::parse_markdown("Join our group!").unwrap();
        let echo = parse(
            r#"{
                "message_id": 13,
                "date": 1700000000,
                "chat": {"id": -1003, "type": "supergroup", "title": "Discussion"},
                "sender_chat": {"id": -1002, "type": "channel", "title": "Target"},
                "text": "Join our group!"
            }"#,
        );
        let correlator = Correlator::new(ChatId(-1002), Some(template));
        assert!(!correlator.should_comment(&convert_message(&echo)));
    }

    #[test]
    fn test_next_offset_checks_range() {
        assert_eq!(next_offset(0), Some(1));
        assert_eq!(next_offset(41), Some(42));
        assert_eq!(next_offset(i32::MAX as u32), None);
        assert_eq!(next_offset(u32::MAX), None);
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let err = TelegramClient::new(&TelegramConfig::default()).err().unwrap();
        assert!(err.is_config());
    }
}
