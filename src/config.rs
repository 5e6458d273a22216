use std::env;
use std::time::Duration;

use crate::error::{PanelError, Result};

pub const DEFAULT_MESSAGES_URL: &str = "http://localhost:3000/messages";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// MESSAGES_URL
    pub messages_url: String,
    /// DIRECTORY_URL; defaults to the parent of `messages_url`
    pub directory_url: String,
    /// DISCUSSION_POLL_SECS
    pub discussion_poll: Duration,
    /// MESSAGE_POLL_SECS
    pub message_poll: Duration,
    /// READ_OVERRIDE_CYCLES: aggregation passes a local read survives a stale backend
    pub read_override_cycles: u32,
    /// DATABASE_URL: sqlite file holding the session
    pub database_url: String,
    /// CHAT_USER_ID: logs this user in at startup
    pub user_id: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let messages_url = lookup("MESSAGES_URL")
            .unwrap_or_else(|| DEFAULT_MESSAGES_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        reqwest::Url::parse(&messages_url)
            .map_err(|e| PanelError::Config(format!("MESSAGES_URL '{}' is not a valid URL: {}", messages_url, e)))?;

        let directory_url = match lookup("DIRECTORY_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => parent_url(&messages_url),
        };

        Ok(Config {
            discussion_poll: Duration::from_secs(positive(&lookup, "DISCUSSION_POLL_SECS", 10)?),
            message_poll: Duration::from_secs(positive(&lookup, "MESSAGE_POLL_SECS", 3)?),
            read_override_cycles: match lookup("READ_OVERRIDE_CYCLES") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| PanelError::Config(format!("READ_OVERRIDE_CYCLES '{}' is not a number", raw)))?,
                None => 3,
            },
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "./chat.db".to_string()),
            user_id: lookup("CHAT_USER_ID").filter(|id| !id.trim().is_empty()),
            messages_url,
            directory_url,
        })
    }
}

fn positive<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(PanelError::Config(format!("{} must be a positive number of seconds, got '{}'", key, raw))),
    }
}

fn parent_url(url: &str) -> String {
    match url.rsplit_once('/') {
        Some((parent, _)) if parent.ends_with(':') || parent.ends_with('/') => url.to_string(),
        Some((parent, _)) => parent.to_string(),
        None => url.to_string(),
    }
}
