//! Gateways to the systems this process keeps configured: the metrics
//! backend, the alerting backend and the platform that owns the hosts.

mod alertmanager;
mod cattle;
mod prometheus;

pub use alertmanager::AlertmanagerClient;
pub use cattle::CattleClient;
pub use prometheus::PrometheusClient;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{model::Alert, Error, Result};

/// An alert currently known to the alerting backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveAlert {
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: LiveAlertStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveAlertStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub silenced_by: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub inhibited_by: Vec<String>,
}

impl LiveAlert {
    pub fn is_suppressed(&self) -> bool {
        self.status.state == "suppressed"
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

/// A platform environment (project) that hosts belong to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Environment {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub agent_ip_address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub public_endpoints: Vec<PublicEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicEndpoint {
    pub port: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ip_address: String,
}

impl Host {
    pub fn publishes_port(&self, port: u16) -> bool {
        self.public_endpoints.iter().any(|e| e.port == port)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Asks the backend to re-read its configuration and rule files.
    async fn reload(&self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertingBackend: Send + Sync {
    async fn list_alerts(&self) -> Result<Vec<LiveAlert>>;
    /// Silences everything labelled with the alert's id and environment.
    async fn add_silence(&self, alert: &Alert) -> Result<()>;
    /// Expires every active silence matching the alert's id and environment.
    async fn remove_silence(&self, alert: &Alert) -> Result<()>;
    async fn reload(&self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Platform: Send + Sync {
    async fn list_environments(&self) -> Result<Vec<Environment>>;
    async fn list_hosts(&self, environment_id: &str) -> Result<Vec<Host>>;
}

// Turns a non-2xx response into a backend error carrying the body
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Backend(format!(
        "{} returned {}: {}",
        url,
        status,
        body.trim()
    )))
}

// Platform and alerting APIs send `null` for unset fields
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}
