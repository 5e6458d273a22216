//! Conversation panel for a REST-backed chat: folds polled message records
//! into a per-peer / per-group conversation list, keeps the selected thread
//! fresh and masks stale read state between polls.

pub mod aggregator;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod panel;
pub mod poller;
pub mod read_overrides;
pub mod service;
pub mod storage;
pub mod view;

pub use aggregator::{aggregate, ConversationSummary};
pub use config::Config;
pub use directory::{Directory, HttpDirectory};
pub use error::{PanelError, Result};
pub use models::{
    Contact, ConversationKey, Group, MessageFilter, MessageRecord, MessageStatus, NewMessage,
    Recipient, User,
};
pub use panel::{
    ActiveConversation, Discussion, DiscussionFilter, Panel, PanelSnapshot, PassOutcome,
    ThreadOutcome,
};
pub use poller::Poller;
pub use read_overrides::ReadOverrides;
pub use service::{HttpMessageService, MessageService};
pub use storage::{SessionStorage, SessionStore};
