use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{check_status, http_client, MetricsBackend};
use crate::Result;

/// Prometheus management API client.
pub struct PrometheusClient {
    base_url: String,
    client: reqwest::Client,
}

impl PrometheusClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl MetricsBackend for PrometheusClient {
    async fn reload(&self) -> Result<()> {
        let url = format!("{}/-/reload", self.base_url);
        debug!("Reload configuration for {}", self.base_url);

        let response = self.client.post(&url).send().await?;
        check_status(response).await?;
        Ok(())
    }
}
