//! Error type shared by every stage of composing and sending a notification.

use std::path::PathBuf;

/// Errors raised while building a [`Mailer`](crate::Mailer) or sending through it.
#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    /// A required input is missing or inconsistent.
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// The transport has been released or reports itself closed.
    #[error("Invalid state: {0}")]
    State(String),

    /// The configuration document could not be read or parsed.
    #[error("Failed to load configuration {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigSource,
    },

    /// The configuration parsed but holds a value the mailer cannot use.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Template error: {0}")]
    Template(String),

    /// lettre refused to assemble the message (bad signature content type).
    #[error("Message assembly failed: {0}")]
    Message(String),

    /// Error returned by the transport, boxed as-is.
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// Underlying cause of a [`MailerError::Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigSource {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = MailerError> = std::result::Result<T, E>;

impl MailerError {
    pub(crate) fn argument(msg: impl Into<String>) -> Self {
        Self::Argument(msg.into())
    }

    pub(crate) fn config(path: impl Into<PathBuf>, source: impl Into<ConfigSource>) -> Self {
        Self::Config {
            path: path.into(),
            source: source.into(),
        }
    }
}
