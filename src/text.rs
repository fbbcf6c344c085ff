//! Rich message text: plain text plus ordered entity spans.
//!
//! Offsets and lengths are in UTF-16 code units, the unit Telegram uses for
//! entity positions. Comparison between two texts is structural and looks
//! only at the span position and the entity tag, never at entity payloads
//! such as link targets.

/// Whether markup has been resolved into entities. A rendered template and
/// a message received from Telegram are both `Formatted`, so they compare
/// equal whenever their text and spans agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextKind {
    #[default]
    Plain,
    Formatted,
}

/// The annotation carried by a [`TextEntity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Spoiler,
    Code,
    Pre { language: Option<String> },
    TextLink { url: String },
    Url,
    Mention,
    Hashtag,
    Cashtag,
    BotCommand,
    Email,
    PhoneNumber,
    Blockquote,
    CustomEmoji,
    Other,
}

impl EntityKind {
    /// Tag used for equality. Payload fields are deliberately not part of it.
    pub fn tag(&self) -> &'static str {
        match self {
            EntityKind::Bold => "bold",
            EntityKind::Italic => "italic",
            EntityKind::Underline => "underline",
            EntityKind::Strikethrough => "strikethrough",
            EntityKind::Spoiler => "spoiler",
            EntityKind::Code => "code",
            EntityKind::Pre { .. } => "pre",
            EntityKind::TextLink { .. } => "text_link",
            EntityKind::Url => "url",
            EntityKind::Mention => "mention",
            EntityKind::Hashtag => "hashtag",
            EntityKind::Cashtag => "cashtag",
            EntityKind::BotCommand => "bot_command",
            EntityKind::Email => "email",
            EntityKind::PhoneNumber => "phone_number",
            EntityKind::Blockquote => "blockquote",
            EntityKind::CustomEmoji => "custom_emoji",
            EntityKind::Other => "other",
        }
    }
}

/// A span annotation over [`FormattedText::text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEntity {
    pub offset: usize,
    pub length: usize,
    pub kind: EntityKind,
}

impl TextEntity {
    pub fn new(offset: usize, length: usize, kind: EntityKind) -> Self {
        Self {
            offset,
            length,
            kind,
        }
    }

    fn same_span(&self, other: &TextEntity) -> bool {
        self.offset == other.offset
            && self.length == other.length
            && self.kind.tag() == other.kind.tag()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormattedText {
    pub text: String,
    pub kind: TextKind,
    pub entities: Vec<TextEntity>,
    pub extra: Option<String>,
}

impl FormattedText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Text whose entities were resolved by a renderer or by the server.
    pub fn formatted(text: impl Into<String>, entities: Vec<TextEntity>) -> Self {
        Self {
            text: text.into(),
            kind: TextKind::Formatted,
            entities,
            extra: None,
        }
    }

    pub fn with_entities(mut self, entities: Vec<TextEntity>) -> Self {
        self.entities = entities;
        self
    }

    /// Length of the text in UTF-16 code units.
    pub fn utf16_len(&self) -> usize {
        self.text.encode_utf16().count()
    }

    /// Structural comparison: kind, text and extra must match exactly, and
    /// entities must agree positionally on offset, length and tag.
    pub fn same_as(&self, other: &FormattedText) -> bool {
        self.kind == other.kind
            && self.text == other.text
            && self.extra == other.extra
            && self.entities.len() == other.entities.len()
            && self
                .entities
                .iter()
                .zip(&other.entities)
                .all(|(a, b)| a.same_span(b))
    }
}

/// Compare two optional texts. Absence never matches anything, not even
/// another absence.
pub fn same_text(a: Option<&FormattedText>, b: Option<&FormattedText>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_as(b),
        _ => false,
    }
}
