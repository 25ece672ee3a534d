use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use super::{check_status, http_client, AlertingBackend, LiveAlert};
use crate::{model::Alert, Error, Result};

const SILENCE_CREATOR: &str = "monitoring-manager";

/// Alertmanager v1 API client.
pub struct AlertmanagerClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Matcher {
    name: String,
    value: String,
    is_regex: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewSilence {
    matchers: Vec<Matcher>,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    created_by: String,
    comment: String,
}

#[derive(Debug, Deserialize)]
struct Silence {
    id: String,
    #[serde(default)]
    status: SilenceStatus,
}

#[derive(Debug, Default, Deserialize)]
struct SilenceStatus {
    #[serde(default)]
    state: String,
}

impl AlertmanagerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned + Default>(response: reqwest::Response) -> Result<T> {
        let response = check_status(response).await?;
        let body: ApiResponse<T> = response.json().await?;
        if body.status != "success" {
            return Err(Error::Backend(format!(
                "alertmanager responded with status {}: {}",
                body.status,
                body.error.unwrap_or_default()
            )));
        }
        Ok(body.data.unwrap_or_default())
    }
}

/// Label matchers that select everything generated for `alert`.
fn alert_matchers(alert: &Alert) -> Vec<Matcher> {
    vec![
        Matcher {
            name: "alert_id".to_string(),
            value: alert.id.clone(),
            is_regex: false,
        },
        Matcher {
            name: "environment".to_string(),
            value: alert.environment.clone(),
            is_regex: false,
        },
    ]
}

fn silence_filter(alert: &Alert) -> String {
    format!(
        "{{alert_id={:?},environment={:?}}}",
        alert.id, alert.environment
    )
}

#[async_trait]
impl AlertingBackend for AlertmanagerClient {
    async fn list_alerts(&self) -> Result<Vec<LiveAlert>> {
        let response = self.client.get(self.url("/api/v1/alerts")).send().await?;
        Self::decode(response).await
    }

    async fn add_silence(&self, alert: &Alert) -> Result<()> {
        let now = Utc::now();
        let silence = NewSilence {
            matchers: alert_matchers(alert),
            starts_at: now,
            ends_at: now + chrono::Duration::days(365 * 100),
            created_by: SILENCE_CREATOR.to_string(),
            comment: format!("silenced alert {}", alert.id),
        };

        let response = self
            .client
            .post(self.url("/api/v1/silences"))
            .json(&silence)
            .send()
            .await?;
        let created: serde_json::Value = Self::decode(response).await?;
        info!("Added silence for alert {}: {}", alert.id, created);
        Ok(())
    }

    async fn remove_silence(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .get(self.url("/api/v1/silences"))
            .query(&[("filter", silence_filter(alert))])
            .send()
            .await?;
        let silences: Vec<Silence> = Self::decode(response).await?;

        for silence in silences.iter().filter(|s| s.status.state == "active") {
            let response = self
                .client
                .delete(self.url(&format!("/api/v1/silence/{}", silence.id)))
                .send()
                .await?;
            check_status(response).await?;
            debug!("Deleted silence {} for alert {}", silence.id, alert.id);
        }
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        debug!("Reload configuration for {}", self.base_url);
        let response = self.client.post(self.url("/-/reload")).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::TargetType, testing::alert};
    use mockito::Matcher as M;
    use serde_json::json;

    fn client(server: &mockito::ServerGuard) -> AlertmanagerClient {
        AlertmanagerClient::new(server.url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_list_alerts() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/alerts")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "status": "success",
                    "data": [{
                        "labels": {"alert_id": "a1", "environment": "e1"},
                        "startsAt": "2024-05-01T10:00:00Z",
                        "endsAt": "2024-05-01T10:05:00Z",
                        "status": {"state": "active", "silencedBy": [], "inhibitedBy": []}
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let alerts = client(&server).list_alerts().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].label("environment"), Some("e1"));
        assert!(!alerts[0].is_suppressed());
    }

    #[tokio::test]
    async fn test_error_envelope_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/alerts")
            .with_status(200)
            .with_body(json!({"status": "error", "error": "bad things"}).to_string())
            .create_async()
            .await;

        let err = client(&server).list_alerts().await.unwrap_err();
        assert!(err.to_string().contains("bad things"));
    }

    #[tokio::test]
    async fn test_add_silence_matches_alert_labels() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/silences")
            .match_body(M::PartialJson(json!({
                "matchers": [
                    {"name": "alert_id", "value": "a1", "isRegex": false},
                    {"name": "environment", "value": "e1", "isRegex": false}
                ],
                "createdBy": "monitoring-manager"
            })))
            .with_status(200)
            .with_body(json!({"status": "success", "data": {"silenceId": "s1"}}).to_string())
            .create_async()
            .await;

        client(&server)
            .add_silence(&alert("a1", "e1", TargetType::Host))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_remove_silence_deletes_only_active() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/silences")
            .match_query(M::UrlEncoded(
                "filter".into(),
                r#"{alert_id="a1",environment="e1"}"#.into(),
            ))
            .with_status(200)
            .with_body(
                json!({
                    "status": "success",
                    "data": [
                        {"id": "s1", "status": {"state": "active"}},
                        {"id": "s2", "status": {"state": "expired"}}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let active = server
            .mock("DELETE", "/api/v1/silence/s1")
            .with_status(200)
            .with_body(json!({"status": "success"}).to_string())
            .create_async()
            .await;
        let expired = server
            .mock("DELETE", "/api/v1/silence/s2")
            .expect(0)
            .create_async()
            .await;

        client(&server)
            .remove_silence(&alert("a1", "e1", TargetType::Host))
            .await
            .unwrap();
        active.assert_async().await;
        expired.assert_async().await;
    }
}
