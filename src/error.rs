use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error: {status} on {url}")]
    Http { status: u16, url: String },

    #[error("Malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: &'static str },

    #[error("No user is logged in")]
    NotAuthenticated,

    #[error("No conversation is selected")]
    NoActiveConversation,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Session error: {0}")]
    Session(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl PanelError {
    /// Network and HTTP failures; the next poll cycle is the retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, PanelError::Transport(_) | PanelError::Http { .. })
    }
}

pub type Result<T> = std::result::Result<T, PanelError>;
