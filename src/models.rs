use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PanelError, Result};

/// Delivery state of a message. Ordered so that a transition can only move forward.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    /// Returns the later of the two states; `Read` never goes back to `Sent`.
    pub fn advance_to(self, next: MessageStatus) -> MessageStatus {
        self.max(next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub sender_id: String,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

/// Key a conversation is grouped under: a group id or the other participant's id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Direct(String),
    Group(String),
}

impl ConversationKey {
    pub fn id(&self) -> &str {
        match self {
            ConversationKey::Direct(id) | ConversationKey::Group(id) => id,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ConversationKey::Group(_))
    }

    pub fn recipient(&self) -> Recipient {
        match self {
            ConversationKey::Direct(id) => Recipient::Direct(id.clone()),
            ConversationKey::Group(id) => Recipient::Group(id.clone()),
        }
    }
}

impl MessageRecord {
    /// Resolves the conversation this record belongs to, from `user_id`'s point of view.
    ///
    /// A record must carry exactly one of `receiver_id` / `group_id`; anything
    /// else is reported as [`PanelError::MalformedRecord`].
    pub fn conversation_key(&self, user_id: &str) -> Result<ConversationKey> {
        match (&self.receiver_id, &self.group_id) {
            (None, Some(group)) => Ok(ConversationKey::Group(group.clone())),
            (Some(receiver), None) => {
                let peer = if self.sender_id == user_id {
                    receiver
                } else {
                    &self.sender_id
                };
                Ok(ConversationKey::Direct(peer.clone()))
            }
            (Some(_), Some(_)) => Err(PanelError::MalformedRecord {
                id: self.id.clone(),
                reason: "both receiverId and groupId are set",
            }),
            (None, None) => Err(PanelError::MalformedRecord {
                id: self.id.clone(),
                reason: "neither receiverId nor groupId is set",
            }),
        }
    }

    /// True when the record is addressed to `user_id` by someone else and has not been read yet.
    pub fn is_unread_for(&self, user_id: &str) -> bool {
        self.receiver_id.as_deref() == Some(user_id)
            && self.sender_id != user_id
            && self.status != MessageStatus::Read
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipient {
    Direct(String),
    Group(String),
}

/// Outgoing message as typed by the user; id, timestamp and status are assigned on send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMessage {
    pub content: String,
    pub recipient: Recipient,
}

impl NewMessage {
    pub fn into_record(self, sender_id: &str, id: String, timestamp: DateTime<Utc>) -> MessageRecord {
        let (receiver_id, group_id) = match self.recipient {
            Recipient::Direct(receiver) => (Some(receiver), None),
            Recipient::Group(group) => (None, Some(group)),
        };
        MessageRecord {
            id,
            sender_id: sender_id.to_string(),
            receiver_id,
            group_id,
            content: self.content,
            timestamp,
            status: MessageStatus::Sent,
        }
    }
}

/// Query accepted by `GET /messages`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageFilter {
    SentBy(String),
    ReceivedBy(String),
    Group(String),
    Between { sender: String, receiver: String },
}

impl MessageFilter {
    pub fn query(&self) -> Vec<(&'static str, &str)> {
        match self {
            MessageFilter::SentBy(id) => vec![("senderId", id.as_str())],
            MessageFilter::ReceivedBy(id) => vec![("receiverId", id.as_str())],
            MessageFilter::Group(id) => vec![("groupId", id.as_str())],
            MessageFilter::Between { sender, receiver } => {
                vec![("senderId", sender.as_str()), ("receiverId", receiver.as_str())]
            }
        }
    }
}

/// The logged-in user as kept in the session store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl User {
    pub fn with_id(id: impl Into<String>) -> Self {
        User {
            id: id.into(),
            first_name: None,
            last_name: None,
            groups: vec![],
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    pub id: String,
    #[serde(rename = "prenom")]
    pub first_name: String,
    #[serde(rename = "nom")]
    pub last_name: String,
    #[serde(rename = "telephone", default)]
    pub phone: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    #[serde(rename = "nom")]
    pub name: String,
}

// The backend sometimes serves `""` instead of omitting the field.
fn non_empty<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}
