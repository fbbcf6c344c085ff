use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForwarderError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Markdown error: {0}")]
    Markdown(String),

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("Comment error: {0}")]
    Comment(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid ignore pattern: {0}")]
    Regex(#[from] regex::Error),
}

impl ForwarderError {
    /// Configuration problems are fatal and must stop startup; everything
    /// else is a per-update failure the dispatcher logs and moves past.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ForwarderError::Config(_)
                | ForwarderError::Markdown(_)
                | ForwarderError::Toml(_)
                | ForwarderError::Regex(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ForwarderError>;
