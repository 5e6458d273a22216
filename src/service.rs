//! REST client for the message backend.
//!
//! The backend is a plain collection resource:
//! `GET /messages?senderId=..|receiverId=..|groupId=..`, `POST /messages`,
//! `PATCH /messages/{id}`. Results come back in no particular order.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use reqwest::{Client, Response};
use serde_json::json;
use uuid::Uuid;

use crate::error::{PanelError, Result};
use crate::models::{MessageFilter, MessageRecord, MessageStatus, NewMessage, User};

#[async_trait]
pub trait MessageService: Send + Sync {
    async fn fetch_messages(&self, filter: &MessageFilter) -> Result<Vec<MessageRecord>>;

    /// Stores a new message from `sender_id`. The client assigns id, timestamp
    /// and the initial `sent` status; the stored record is returned.
    async fn send_message(&self, sender_id: &str, message: NewMessage) -> Result<MessageRecord>;

    async fn update_status(&self, id: &str, status: MessageStatus) -> Result<()>;

    async fn mark_read(&self, id: &str) -> Result<()> {
        self.update_status(id, MessageStatus::Read).await
    }

    async fn mark_delivered(&self, id: &str) -> Result<()> {
        self.update_status(id, MessageStatus::Delivered).await
    }

    /// Both directions of a direct conversation, oldest first.
    async fn messages_between(&self, user_id: &str, peer_id: &str) -> Result<Vec<MessageRecord>> {
        let mut messages = self
            .fetch_messages(&MessageFilter::Between {
                sender: user_id.to_string(),
                receiver: peer_id.to_string(),
            })
            .await?;
        if user_id != peer_id {
            let reverse = self
                .fetch_messages(&MessageFilter::Between {
                    sender: peer_id.to_string(),
                    receiver: user_id.to_string(),
                })
                .await?;
            messages.extend(reverse);
        }
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn group_messages(&self, group_id: &str) -> Result<Vec<MessageRecord>> {
        self.fetch_messages(&MessageFilter::Group(group_id.to_string()))
            .await
    }

    /// Everything the conversation list needs for `user`, in fetch order:
    /// sent, then received, then each joined group. Overlaps are left in.
    async fn user_records(&self, user: &User) -> Result<Vec<MessageRecord>> {
        let mut records = self
            .fetch_messages(&MessageFilter::SentBy(user.id.clone()))
            .await?;
        records.extend(
            self.fetch_messages(&MessageFilter::ReceivedBy(user.id.clone()))
                .await?,
        );
        for group_id in &user.groups {
            records.extend(self.group_messages(group_id).await?);
        }
        Ok(records)
    }
}

#[derive(Debug, Clone)]
pub struct HttpMessageService {
    client: Client,
    messages_url: String,
}

impl HttpMessageService {
    pub fn new(messages_url: &str) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self::with_client(client, messages_url))
    }

    pub fn with_client(client: Client, messages_url: &str) -> Self {
        HttpMessageService {
            client,
            messages_url: messages_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn messages_url(&self) -> &str {
        &self.messages_url
    }

    fn message_url(&self, id: &str) -> String {
        format!("{}/{}", self.messages_url, id)
    }
}

pub(crate) fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(PanelError::Http {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

#[async_trait]
impl MessageService for HttpMessageService {
    async fn fetch_messages(&self, filter: &MessageFilter) -> Result<Vec<MessageRecord>> {
        let response = self
            .client
            .get(&self.messages_url)
            .query(&filter.query())
            .send()
            .await?;
        let messages: Vec<MessageRecord> = ensure_success(response)?.json().await?;
        debug!("Fetched {} messages for {:?}", messages.len(), filter);
        Ok(messages)
    }

    async fn send_message(&self, sender_id: &str, message: NewMessage) -> Result<MessageRecord> {
        let record = message.into_record(sender_id, Uuid::new_v4().to_string(), Utc::now());
        let response = self
            .client
            .post(&self.messages_url)
            .json(&record)
            .send()
            .await?;
        let stored: MessageRecord = ensure_success(response)?.json().await?;
        info!("Sent message {} from {}", stored.id, stored.sender_id);
        Ok(stored)
    }

    async fn update_status(&self, id: &str, status: MessageStatus) -> Result<()> {
        let response = self
            .client
            .patch(self.message_url(id))
            .json(&json!({ "status": status }))
            .send()
            .await?;
        ensure_success(response)?;
        debug!("Marked message {} as {}", id, status.as_str());
        Ok(())
    }
}
