//! Render the small markdown dialect used for comment templates into a
//! [`FormattedText`] with explicit entities.
//!
//! Supported markup:
//!
//! | source              | entity          |
//! |---------------------|-----------------|
//! | `**bold**`          | bold            |
//! | `_italic_`          | italic          |
//! | `__underline__`     | underline       |
//! | `~~strike~~`        | strikethrough   |
//! | `\|\|spoiler\|\|`   | spoiler         |
//! | `` `code` ``        | code            |
//! | fenced code block   | pre             |
//! | `[label](url)`      | text link       |
//!
//! A backslash makes the next character literal. Unterminated markup is an
//! error rather than being passed through, so a broken template is caught at
//! startup instead of producing a comment that never matches itself.

use std::cmp::Reverse;

use crate::error::{ForwarderError, Result};
use crate::text::{EntityKind, FormattedText, TextEntity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Bold,
    Underline,
    Strikethrough,
    Spoiler,
    Italic,
}

impl Style {
    fn entity(self) -> EntityKind {
        match self {
            Style::Bold => EntityKind::Bold,
            Style::Underline => EntityKind::Underline,
            Style::Strikethrough => EntityKind::Strikethrough,
            Style::Spoiler => EntityKind::Spoiler,
            Style::Italic => EntityKind::Italic,
        }
    }

    fn token(self) -> &'static str {
        match self {
            Style::Bold => "**",
            Style::Underline => "__",
            Style::Strikethrough => "~~",
            Style::Spoiler => "||",
            Style::Italic => "_",
        }
    }
}

// Longer tokens first so `__` wins over `_`.
const STYLES: [Style; 5] = [
    Style::Bold,
    Style::Underline,
    Style::Strikethrough,
    Style::Spoiler,
    Style::Italic,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opener {
    Style(Style),
    Link,
}

impl Opener {
    fn token(self) -> &'static str {
        match self {
            Opener::Style(style) => style.token(),
            Opener::Link => "[",
        }
    }
}

#[derive(Debug)]
struct Open {
    opener: Opener,
    /// Output position in UTF-16 units.
    start: usize,
    /// Byte offset in the source, for error messages.
    at: usize,
}

struct Renderer<'a> {
    src: &'a str,
    i: usize,
    out: String,
    pos: usize,
    open: Vec<Open>,
    entities: Vec<TextEntity>,
}

/// Render `source` into formatted text.
pub fn parse_markdown(source: &str) -> Result<FormattedText> {
    let mut renderer = Renderer {
        src: source,
        i: 0,
        out: String::with_capacity(source.len()),
        pos: 0,
        open: Vec::new(),
        entities: Vec::new(),
    };
    renderer.run()?;
    Ok(renderer.finish())
}

impl Renderer<'_> {
    fn run(&mut self) -> Result<()> {
        let src = self.src;
        while self.i < src.len() {
            let rest = &src[self.i..];

            if let Some(after) = rest.strip_prefix('\\') {
                match after.chars().next() {
                    Some(c) => {
                        self.push_char(c);
                        self.i += 1 + c.len_utf8();
                    }
                    None => {
                        self.push_char('\\');
                        self.i += 1;
                    }
                }
                continue;
            }

            if rest.starts_with("```") {
                self.fenced_block()?;
                continue;
            }

            if rest.starts_with('`') {
                self.inline_code()?;
                continue;
            }

            if rest.starts_with('[') {
                self.open.push(Open {
                    opener: Opener::Link,
                    start: self.pos,
                    at: self.i,
                });
                self.i += 1;
                continue;
            }

            if rest.starts_with("](") && self.open.iter().any(|o| o.opener == Opener::Link) {
                self.close_link()?;
                continue;
            }

            if let Some(style) = STYLES.iter().copied().find(|s| rest.starts_with(s.token())) {
                self.toggle(style);
                self.i += style.token().len();
                continue;
            }

            let Some(c) = rest.chars().next() else {
                break;
            };
            self.push_char(c);
            self.i += c.len_utf8();
        }

        if let Some(open) = self.open.first() {
            return Err(ForwarderError::Markdown(format!(
                "unterminated `{}` opened at byte {}",
                open.opener.token(),
                open.at
            )));
        }
        Ok(())
    }

    fn finish(mut self) -> FormattedText {
        // Telegram orders entities by offset, outer spans first.
        self.entities
            .sort_by_key(|e| (e.offset, Reverse(e.length)));
        FormattedText::formatted(self.out, self.entities)
    }

    fn push_char(&mut self, c: char) {
        self.out.push(c);
        self.pos += c.len_utf16();
    }

    fn push_str(&mut self, s: &str) {
        self.out.push_str(s);
        self.pos += s.encode_utf16().count();
    }

    fn emit(&mut self, start: usize, kind: EntityKind) {
        let length = self.pos - start;
        if length > 0 {
            self.entities.push(TextEntity::new(start, length, kind));
        }
    }

    fn toggle(&mut self, style: Style) {
        let opener = Opener::Style(style);
        match self.open.iter().rposition(|o| o.opener == opener) {
            Some(idx) => {
                let open = self.open.remove(idx);
                self.emit(open.start, style.entity());
            }
            None => self.open.push(Open {
                opener,
                start: self.pos,
                at: self.i,
            }),
        }
    }

    fn close_link(&mut self) -> Result<()> {
        let url_start = self.i + 2;
        let Some(len) = self.src[url_start..].find(')') else {
            return Err(ForwarderError::Markdown(format!(
                "unterminated link target at byte {}",
                self.i
            )));
        };
        let url = self.src[url_start..url_start + len].trim().to_string();
        if url.is_empty() {
            return Err(ForwarderError::Markdown(format!(
                "empty link target at byte {}",
                self.i
            )));
        }

        if let Some(idx) = self.open.iter().rposition(|o| o.opener == Opener::Link) {
            let open = self.open.remove(idx);
            self.emit(open.start, EntityKind::TextLink { url });
        }
        self.i = url_start + len + 1;
        Ok(())
    }

    fn inline_code(&mut self) -> Result<()> {
        let src = self.src;
        let body_start = self.i + 1;
        let Some(len) = src[body_start..].find('`') else {
            return Err(ForwarderError::Markdown(format!(
                "unterminated `` ` `` opened at byte {}",
                self.i
            )));
        };
        let start = self.pos;
        let body = &src[body_start..body_start + len];
        self.push_str(body);
        self.emit(start, EntityKind::Code);
        self.i = body_start + len + 1;
        Ok(())
    }

    fn fenced_block(&mut self) -> Result<()> {
        let src = self.src;
        let inner_start = self.i + 3;
        let Some(len) = src[inner_start..].find("```") else {
            return Err(ForwarderError::Markdown(format!(
                "unterminated code block opened at byte {}",
                self.i
            )));
        };
        let inner = &src[inner_start..inner_start + len];

        // A first line without spaces names the language.
        let (language, body) = match inner.split_once('\n') {
            Some((first, body)) if !first.contains(char::is_whitespace) => {
                let language = (!first.is_empty()).then(|| first.to_string());
                (language, body)
            }
            _ => (None, inner),
        };

        let start = self.pos;
        self.push_str(body);
        self.emit(start, EntityKind::Pre { language });
        self.i = inner_start + len + 3;
        Ok(())
    }
}
