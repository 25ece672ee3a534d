use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;
use url::Url;

use super::{check_status, http_client, Environment, Host, Platform};
use crate::Result;

const PAGE_LIMIT: &str = "1000";

/// Rancher (cattle) v2-beta API client used for host discovery.
pub struct CattleClient {
    base_url: Url,
    access_key: String,
    secret_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<String>,
}

impl CattleClient {
    pub fn new(
        base_url: &str,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            client: http_client(timeout)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut().append_pair("limit", PAGE_LIMIT);
        Ok(url)
    }

    // Follows pagination links until the collection is exhausted
    async fn list_all<T: DeserializeOwned>(&self, first: Url) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            debug!("Listing {}", url);
            let response = self
                .client
                .get(url.clone())
                .basic_auth(&self.access_key, Some(&self.secret_key))
                .send()
                .await?;
            let page: Collection<T> = check_status(response).await?.json().await?;
            items.extend(page.data);

            next = match page.pagination.and_then(|p| p.next) {
                Some(link) if !link.is_empty() => {
                    let link = Url::parse(&link)?;
                    (link != url).then_some(link)
                }
                _ => None,
            };
        }
        Ok(items)
    }
}

#[async_trait]
impl Platform for CattleClient {
    async fn list_environments(&self) -> Result<Vec<Environment>> {
        self.list_all(self.endpoint("v2-beta/projects")?).await
    }

    async fn list_hosts(&self, environment_id: &str) -> Result<Vec<Host>> {
        let path = format!("v2-beta/projects/{}/hosts", environment_id);
        self.list_all(self.endpoint(&path)?).await
    }
}
