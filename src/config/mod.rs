use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ForwarderError, Result};
use crate::filter::IgnoreFilter;
use crate::message::ChatId;
use crate::relay::DeliveryMode;
use crate::text::FormattedText;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub comment: CommentSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Custom Bot API server, e.g. a local `telegram-bot-api` instance.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u32,
}

fn default_poll_timeout() -> u32 {
    30
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_url: None,
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl TelegramConfig {
    /// The bot token, treating an empty substitution as unset.
    pub fn token(&self) -> Option<&str> {
        self.bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// A chat id as written in config: a bare integer, or a string so that
/// `"${SOURCE_CHANNEL_ID}"` style substitutions still parse as TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Number(i64),
    Text(String),
}

impl Default for IdValue {
    fn default() -> Self {
        IdValue::Number(0)
    }
}

impl IdValue {
    fn resolve(&self, field: &str) -> Result<i64> {
        match self {
            IdValue::Number(n) => Ok(*n),
            IdValue::Text(s) if s.trim().is_empty() => Ok(0),
            IdValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|e| ForwarderError::Config(format!("invalid {field} '{s}': {e}"))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelaySection {
    #[serde(default)]
    pub source_channel_id: IdValue,
    #[serde(default)]
    pub target_channel_id: IdValue,
    /// 0 or absent disables comments.
    #[serde(default)]
    pub discussion_group_id: IdValue,
    #[serde(default)]
    pub ignore_regex: Option<String>,
    /// Keep the forwarded-from header instead of sending a copy.
    #[serde(default)]
    pub show_forwarded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentSection {
    #[serde(default = "default_template_file")]
    pub template_file: PathBuf,
    #[serde(default)]
    pub silent: bool,
}

fn default_template_file() -> PathBuf {
    PathBuf::from("comment.md")
}

impl Default for CommentSection {
    fn default() -> Self {
        Self {
            template_file: default_template_file(),
            silent: false,
        }
    }
}

/// Immutable settings the relay core runs on, compiled once from [`Config`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub source: ChatId,
    pub target: ChatId,
    pub discussion: Option<ChatId>,
    pub filter: IgnoreFilter,
    pub comment_template: Option<FormattedText>,
    pub silent_comments: bool,
    pub delivery: DeliveryMode,
}

impl RelayConfig {
    /// Suspicious but legal settings worth telling the operator about.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(discussion) = self.discussion {
            if discussion == self.source || discussion == self.target {
                warnings.push(format!(
                    "discussion_group_id {discussion} equals a channel id; comments will never be posted"
                ));
            }
            if self.comment_template.is_none() {
                warnings.push(
                    "discussion_group_id is set but no comment template is loaded".to_string(),
                );
            }
        }
        warnings
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ForwarderError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".forwarder")
            .join("config.toml")
    }

    /// Resolve the template path; relative paths are taken from `base_dir`,
    /// normally the directory holding the config file.
    pub fn template_path(&self, base_dir: &Path) -> PathBuf {
        let path = &self.comment.template_file;
        if path.is_absolute() {
            path.clone()
        } else {
            base_dir.join(path)
        }
    }

    /// Validate ids, compile the ignore pattern and render the comment
    /// template. Every error returned here is a configuration error.
    pub fn compile<F>(&self, base_dir: &Path, render: F) -> Result<RelayConfig>
    where
        F: Fn(&str) -> Result<FormattedText>,
    {
        let source = self.relay.source_channel_id.resolve("source_channel_id")?;
        let target = self.relay.target_channel_id.resolve("target_channel_id")?;
        let discussion = self
            .relay
            .discussion_group_id
            .resolve("discussion_group_id")?;

        if source == 0 {
            return Err(ForwarderError::Config(
                "source_channel_id is required".to_string(),
            ));
        }
        if target == 0 {
            return Err(ForwarderError::Config(
                "target_channel_id is required".to_string(),
            ));
        }
        if source == target {
            return Err(ForwarderError::Config(
                "source_channel_id and target_channel_id must differ".to_string(),
            ));
        }

        let filter = IgnoreFilter::compile(self.relay.ignore_regex.as_deref())?;

        let comment_template = self.load_template(base_dir, render)?;

        Ok(RelayConfig {
            source: ChatId(source),
            target: ChatId(target),
            discussion: (discussion != 0).then_some(ChatId(discussion)),
            filter,
            comment_template,
            silent_comments: self.comment.silent,
            delivery: DeliveryMode::from_show_forwarded(self.relay.show_forwarded),
        })
    }

    fn load_template<F>(&self, base_dir: &Path, render: F) -> Result<Option<FormattedText>>
    where
        F: Fn(&str) -> Result<FormattedText>,
    {
        let path = self.template_path(base_dir);
        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Comment template {} not found, comments disabled", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(ForwarderError::Config(format!(
                    "Failed to read comment template {}: {e}",
                    path.display()
                )))
            }
        };

        let source = source.trim();
        if source.is_empty() {
            warn!("Comment template {} is empty, comments disabled", path.display());
            return Ok(None);
        }

        let text = render(source).map_err(|e| {
            ForwarderError::Config(format!("Failed to render {}: {e}", path.display()))
        })?;
        Ok(Some(text))
    }

    pub fn default_toml() -> &'static str {
        r#"[telegram]
bot_token = "${TELEGRAM_BOT_TOKEN}"
# api_url = "http://localhost:8081"
poll_timeout_secs = 30

[relay]
source_channel_id = "${SOURCE_CHANNEL_ID}"
target_channel_id = "${TARGET_CHANNEL_ID}"
# Group linked to the target channel; 0 disables comments
discussion_group_id = "${DISCUSSION_GROUP_ID}"
# Posts whose text matches are not relayed; empty disables filtering
ignore_regex = "${IGNORE_REGEX}"
# false sends a copy, true keeps the forwarded-from header
show_forwarded = false

[comment]
# Relative paths are resolved against this file's directory
template_file = "comment.md"
silent = false
"#
    }

    pub fn default_comment() -> &'static str {
        "**Enjoying the channel?** Join the discussion in [our group](https://t.me/example)!\n"
    }
}

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// References are written inside TOML basic strings (`"${VAR}"`), so values
/// are escaped for that context; a regex like `#ad\b` stays as written.
pub fn substitute_env_vars(input: &str) -> String {
    // The pattern is a literal and always compiles.
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        escape_basic_string(&std::env::var(var_name).unwrap_or_default())
    })
    .to_string()
}

fn escape_basic_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", u32::from(c))),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::parse_markdown;
    use tempfile::TempDir;

    fn relay_toml(extra: &str) -> String {
        format!(
            "[relay]\nsource_channel_id = -1001\ntarget_channel_id = -1002\n{extra}"
        )
    }

    #[test]
    fn test_default_config_parses() {
        let config = Config::parse(Config::default_toml()).unwrap();
        assert_eq!(config.telegram.poll_timeout_secs, 30);
        assert_eq!(config.comment.template_file, PathBuf::from("comment.md"));
        assert!(!config.relay.show_forwarded);
    }

    #[test]
    fn test_default_comment_renders() {
        let text = parse_markdown(Config::default_comment().trim()).unwrap();
        assert!(!text.entities.is_empty());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("FORWARDER_TEST_VAR", "hello123");
        let result = substitute_env_vars("key = \"${FORWARDER_TEST_VAR}\"");
        assert_eq!(result, "key = \"hello123\"");
        std::env::remove_var("FORWARDER_TEST_VAR");
    }

    #[test]
    fn test_substituted_regex_keeps_backslashes_and_quotes() {
        std::env::set_var("FORWARDER_TEST_IGNORE", r#"#ad\b|"promo""#);
        let config = Config::parse("[relay]\nignore_regex = \"${FORWARDER_TEST_IGNORE}\"\n").unwrap();
        std::env::remove_var("FORWARDER_TEST_IGNORE");

        assert_eq!(
            config.relay.ignore_regex.as_deref(),
            Some(r#"#ad\b|"promo""#)
        );
        let filter = IgnoreFilter::compile(config.relay.ignore_regex.as_deref()).unwrap();
        assert!(!filter.should_forward(Some(&FormattedText::plain("sale #ad today"))));
        assert!(filter.should_forward(Some(&FormattedText::plain("#adverts"))));
    }

    #[test]
    fn test_control_characters_are_escaped() {
        assert_eq!(escape_basic_string("a\tb\u{8}"), "a\\tb\\u0008");
    }

    #[test]
    fn test_missing_env_var_becomes_empty() {
        let result = substitute_env_vars("key = \"${NONEXISTENT_VAR_XYZ}\"");
        assert_eq!(result, "key = \"\"");
    }

    #[test]
    fn test_empty_config() {
        let config = Config::parse("").unwrap();
        assert!(config.telegram.token().is_none());
        assert_eq!(config.relay.source_channel_id, IdValue::Number(0));
        assert!(!config.comment.silent);
    }

    #[test]
    fn test_ids_accept_strings() {
        let config = Config::parse(
            "[relay]\nsource_channel_id = \"-1001\"\ntarget_channel_id = -1002\n",
        )
        .unwrap();
        let tmp = TempDir::new().unwrap();
        let relay = config.compile(tmp.path(), parse_markdown).unwrap();
        assert_eq!(relay.source, ChatId(-1001));
        assert_eq!(relay.target, ChatId(-1002));
        assert!(relay.discussion.is_none());
        assert!(relay.comment_template.is_none());
        assert_eq!(relay.delivery, DeliveryMode::Copy);
    }

    #[test]
    fn test_unparseable_id_is_config_error() {
        let config =
            Config::parse("[relay]\nsource_channel_id = \"abc\"\ntarget_channel_id = 2\n").unwrap();
        let tmp = TempDir::new().unwrap();
        let err = config.compile(tmp.path(), parse_markdown).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("source_channel_id"));
    }

    #[test]
    fn test_missing_or_equal_channels_rejected() {
        let tmp = TempDir::new().unwrap();
        let missing = Config::parse("[relay]\ntarget_channel_id = -1002\n").unwrap();
        assert!(missing.compile(tmp.path(), parse_markdown).is_err());

        let same = Config::parse(
            "[relay]\nsource_channel_id = -1001\ntarget_channel_id = -1001\n",
        )
        .unwrap();
        assert!(same.compile(tmp.path(), parse_markdown).is_err());
    }

    #[test]
    fn test_malformed_regex_rejected_eagerly() {
        let config = Config::parse(&relay_toml("ignore_regex = \"(#aff\"\n")).unwrap();
        let tmp = TempDir::new().unwrap();
        let err = config.compile(tmp.path(), parse_markdown).unwrap_err();
        assert!(matches!(err, ForwarderError::Regex(_)));
    }

    #[test]
    fn test_empty_regex_disables_filter() {
        let config = Config::parse(&relay_toml("ignore_regex = \"\"\n")).unwrap();
        let tmp = TempDir::new().unwrap();
        let relay = config.compile(tmp.path(), parse_markdown).unwrap();
        assert!(relay.filter.pattern().is_none());
    }

    #[test]
    fn test_template_loaded_relative_to_base_dir() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("comment.md"), "\n  **Join** our group!\n\n").unwrap();

        let config = Config::parse(&relay_toml(
            "discussion_group_id = -1003\nshow_forwarded = true\n[comment]\nsilent = true\n",
        ))
        .unwrap();
        let relay = config.compile(tmp.path(), parse_markdown).unwrap();

        let template = relay.comment_template.unwrap();
        assert_eq!(template.text, "Join our group!");
        assert_eq!(template.entities.len(), 1);
        assert_eq!(relay.discussion, Some(ChatId(-1003)));
        assert!(relay.silent_comments);
        assert_eq!(relay.delivery, DeliveryMode::Forward);
    }

    #[test]
    fn test_broken_template_is_config_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("comment.md"), "**unterminated").unwrap();
        let config = Config::parse(&relay_toml("")).unwrap();
        let err = config.compile(tmp.path(), parse_markdown).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_warnings_for_suspicious_discussion_id() {
        let tmp = TempDir::new().unwrap();
        let config = Config::parse(&relay_toml("discussion_group_id = -1002\n")).unwrap();
        let relay = config.compile(tmp.path(), parse_markdown).unwrap();
        let warnings = relay.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("-1002"));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "[telegram]\nbot_token = \"123:abc\"\npoll_timeout_secs = 10\n",
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.telegram.token(), Some("123:abc"));
        assert_eq!(config.telegram.poll_timeout_secs, 10);
    }
}
