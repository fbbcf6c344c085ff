use regex::Regex;

use crate::error::Result;
use crate::text::FormattedText;

/// Decides whether a source post is eligible for relay.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    pattern: Option<Regex>,
}

impl IgnoreFilter {
    /// Compile a pattern from config. An empty or blank string means no
    /// filtering; any other pattern is compiled exactly as written.
    pub fn compile(pattern: Option<&str>) -> Result<Self> {
        let pattern = match pattern {
            Some(p) if !p.trim().is_empty() => Some(Regex::new(p)?),
            _ => None,
        };
        Ok(Self { pattern })
    }

    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    /// A post without text is never forwarded. Without a pattern every
    /// post with text is. Otherwise the post is forwarded unless the
    /// pattern matches somewhere in its plain text.
    pub fn should_forward(&self, text: Option<&FormattedText>) -> bool {
        let Some(text) = text else {
            return false;
        };
        match &self.pattern {
            None => true,
            Some(pattern) => !pattern.is_match(&text.text),
        }
    }
}
