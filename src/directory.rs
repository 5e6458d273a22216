//! Display names for conversation peers and groups.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::Result;
use crate::models::{Contact, Group};
use crate::service::ensure_success;

#[async_trait]
pub trait Directory: Send + Sync {
    async fn contact(&self, id: &str) -> Result<Option<Contact>>;
    async fn group(&self, id: &str) -> Result<Option<Group>>;
}

/// Looks entries up at `{base}/contacts/{id}` and `{base}/groupes/{id}`.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: Client,
    base_url: String,
}

impl HttpDirectory {
    pub fn new(client: Client, base_url: &str) -> Self {
        HttpDirectory {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_optional<T>(&self, collection: &str, id: &str) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}/{}", self.base_url, collection, id);
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(ensure_success(response)?.json().await?))
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn contact(&self, id: &str) -> Result<Option<Contact>> {
        self.get_optional("contacts", id).await
    }

    async fn group(&self, id: &str) -> Result<Option<Group>> {
        self.get_optional("groupes", id).await
    }
}
