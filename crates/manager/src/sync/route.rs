//! Alertmanager routing tree and receivers.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Outcome, Synchronizer};
use crate::{
    artifact::write_atomic,
    backend::AlertingBackend,
    duration::{parse_lenient, PromDuration},
    model::{Alert, AlertConfig, Recipient, RecipientType},
    service::Service,
    Result,
};

pub const DEFAULT_RECEIVER: &str = "default-receiver";

const EMAIL_SUBJECT: &str = "Alert from Rancher: {{ (index .Alerts 0).Labels.description }}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertmanagerConfig {
    pub global: GlobalConfig,
    pub route: Route,
    #[serde(default)]
    pub receivers: Vec<Receiver>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub resolve_timeout: PromDuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_smarthost: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_auth_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_auth_password: Option<String>,
    #[serde(default)]
    pub smtp_require_tls: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(
        rename = "match",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub matchers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_wait: Option<PromDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_interval: Option<PromDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_interval: Option<PromDuration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receiver {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_configs: Vec<EmailReceiver>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub webhook_configs: Vec<WebhookReceiver>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailReceiver {
    pub to: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookReceiver {
    pub url: String,
}

impl Default for AlertmanagerConfig {
    fn default() -> Self {
        Self {
            global: GlobalConfig {
                resolve_timeout: PromDuration::from_secs(5 * 60),
                smtp_from: None,
                smtp_smarthost: None,
                smtp_auth_username: None,
                smtp_auth_password: None,
                smtp_require_tls: false,
            },
            route: Route {
                receiver: Some(DEFAULT_RECEIVER.to_string()),
                group_wait: Some(PromDuration::from_secs(60)),
                group_interval: Some(PromDuration::from_secs(5 * 60)),
                repeat_interval: Some(PromDuration::from_secs(60 * 60)),
                ..Route::default()
            },
            receivers: vec![Receiver {
                name: DEFAULT_RECEIVER.to_string(),
                email_configs: Vec::new(),
                webhook_configs: Vec::new(),
            }],
        }
    }
}

impl Receiver {
    fn for_recipient(recipient: &Recipient) -> Self {
        let mut receiver = Receiver {
            name: recipient.id.clone(),
            email_configs: Vec::new(),
            webhook_configs: Vec::new(),
        };
        match recipient.recipient_type {
            RecipientType::Email => {
                let mut headers = BTreeMap::new();
                headers.insert("Subject".to_string(), EMAIL_SUBJECT.to_string());
                receiver.email_configs.push(EmailReceiver {
                    to: recipient.email_recipient.address.clone(),
                    headers,
                });
            }
            RecipientType::Webhook => receiver.webhook_configs.push(WebhookReceiver {
                url: recipient.webhook_recipient.url.clone(),
            }),
        }
        receiver
    }
}

fn leaf_route(alert: &Alert) -> Route {
    let mut matchers = BTreeMap::new();
    matchers.insert("alert_id".to_string(), alert.id.clone());

    Route {
        receiver: Some(alert.recipient_id.clone()),
        matchers,
        // Unparsable options fall back to the parent's settings.
        group_wait: parse_lenient(&alert.advanced_options.initial_wait),
        repeat_interval: parse_lenient(&alert.advanced_options.repeat_interval),
        ..Route::default()
    }
}

/// Builds the complete Alertmanager configuration from the store contents.
pub fn build_config(
    alert_config: Option<&AlertConfig>,
    alerts: &[Alert],
    recipients: &[Recipient],
) -> AlertmanagerConfig {
    let mut config = AlertmanagerConfig::default();

    if let Some(alert_config) = alert_config {
        if let Some(resolve_timeout) = parse_lenient(&alert_config.resolve_timeout) {
            config.global.resolve_timeout = resolve_timeout;
        }

        let email = &alert_config.email_config;
        if !email.smtp_auth_password.is_empty() {
            config.global.smtp_from = Some(email.smtp_auth_username.clone());
            config.global.smtp_smarthost = Some(email.smtp_smart_host.clone());
            config.global.smtp_auth_username = Some(email.smtp_auth_username.clone());
            config.global.smtp_auth_password = Some(email.smtp_auth_password.clone());
            config.global.smtp_require_tls = false;
        }
    }

    config
        .receivers
        .extend(recipients.iter().map(Receiver::for_recipient));

    let mut branches: BTreeMap<&str, Vec<Route>> = BTreeMap::new();
    for alert in alerts.iter().filter(|a| !a.is_disabled()) {
        branches
            .entry(alert.environment.as_str())
            .or_default()
            .push(leaf_route(alert));
    }

    config.route.routes = branches
        .into_iter()
        .map(|(environment, routes)| {
            let mut matchers = BTreeMap::new();
            matchers.insert("environment".to_string(), environment.to_string());
            Route {
                matchers,
                routes,
                ..Route::default()
            }
        })
        .collect();

    config
}

pub struct RouteSynchronizer {
    service: Service,
    alertmanager: Arc<dyn AlertingBackend>,
    config_file: PathBuf,
}

impl RouteSynchronizer {
    pub fn new(service: Service, alertmanager: Arc<dyn AlertingBackend>, config_file: PathBuf) -> Self {
        Self {
            service,
            alertmanager,
            config_file,
        }
    }
}

#[async_trait]
impl Synchronizer for RouteSynchronizer {
    fn name(&self) -> &'static str {
        "route"
    }

    async fn sync(&self) -> Result<Outcome> {
        let alert_config = self.service.alert_config().await?;
        let alerts = self.service.list_alerts(None).await?;
        let recipients = self.service.list_recipients(None).await?;

        let known: BTreeSet<&str> = recipients.iter().map(|r| r.id.as_str()).collect();
        for alert in alerts.iter().filter(|a| !a.is_disabled()) {
            if !known.contains(alert.recipient_id.as_str()) {
                warn!(
                    "Alert {} routes to unknown recipient {}",
                    alert.id, alert.recipient_id
                );
            }
        }

        let config = build_config(alert_config.as_ref(), &alerts, &recipients);
        let rendered = serde_yaml::to_string(&config)?;
        debug!("New generated alertmanager config: {}", rendered);
        write_atomic(&self.config_file, rendered.as_bytes()).await?;

        info!(
            "Synchronized {} routes and {} receivers",
            alerts.iter().filter(|a| !a.is_disabled()).count(),
            recipients.len()
        );
        Ok(Outcome::Reload)
    }

    async fn reload(&self) -> Result<()> {
        self.alertmanager.reload().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockAlertingBackend;
    use crate::model::{AlertState, EmailConfig, TargetType};
    use crate::store::MemoryStore;
    use crate::testing::{alert, recipient};

    fn find_branch<'a>(config: &'a AlertmanagerConfig, environment: &str) -> Option<&'a Route> {
        config
            .route
            .routes
            .iter()
            .find(|r| r.matchers.get("environment").map(String::as_str) == Some(environment))
    }

    fn leaves<'a>(branch: &'a Route, alert_id: &str) -> Vec<&'a Route> {
        branch
            .routes
            .iter()
            .filter(|r| r.matchers.get("alert_id").map(String::as_str) == Some(alert_id))
            .collect()
    }

    #[test]
    fn test_defaults_without_alert_config() {
        let config = build_config(None, &[], &[]);
        assert_eq!(config.global.resolve_timeout.to_string(), "5m");
        assert_eq!(config.route.receiver.as_deref(), Some(DEFAULT_RECEIVER));
        assert_eq!(config.route.group_wait.unwrap().to_string(), "1m");
        assert_eq!(config.route.repeat_interval.unwrap().to_string(), "1h");
        assert_eq!(config.receivers.len(), 1);
        assert!(config.route.routes.is_empty());
    }

    #[test]
    fn test_one_leaf_per_enabled_alert() {
        let mut disabled = alert("a3", "e1", TargetType::Host);
        disabled.state = AlertState::Disabled;
        let alerts = vec![
            alert("a1", "e1", TargetType::Host),
            alert("a2", "e2", TargetType::Metric),
            disabled,
        ];

        let config = build_config(None, &alerts, &[]);
        assert_eq!(config.route.routes.len(), 2);

        let e1 = find_branch(&config, "e1").unwrap();
        let matched = leaves(e1, "a1");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].receiver.as_deref(), Some("r1"));
        assert!(leaves(e1, "a3").is_empty());

        let e2 = find_branch(&config, "e2").unwrap();
        assert_eq!(leaves(e2, "a2").len(), 1);
        assert!(leaves(e2, "a1").is_empty());
    }

    #[test]
    fn test_only_disabled_alerts_leave_no_branch() {
        let mut disabled = alert("a1", "e1", TargetType::Host);
        disabled.state = AlertState::Disabled;

        let config = build_config(None, &[disabled], &[]);
        assert!(find_branch(&config, "e1").is_none());
    }

    #[test]
    fn test_advanced_options_are_copied_when_parseable() {
        let mut a1 = alert("a1", "e1", TargetType::Host);
        a1.advanced_options.initial_wait = "30s".to_string();
        a1.advanced_options.repeat_interval = "every hour".to_string();

        let config = build_config(None, &[a1], &[]);
        let leaf = leaves(find_branch(&config, "e1").unwrap(), "a1")[0];
        assert_eq!(leaf.group_wait.unwrap().to_string(), "30s");
        assert!(leaf.repeat_interval.is_none());
    }

    #[test]
    fn test_one_receiver_per_recipient() {
        let recipients = vec![
            recipient("r1", RecipientType::Email),
            recipient("r2", RecipientType::Webhook),
        ];
        let config = build_config(None, &[], &recipients);

        let email = config.receivers.iter().find(|r| r.name == "r1").unwrap();
        assert_eq!(email.email_configs.len(), 1);
        assert!(email.webhook_configs.is_empty());
        assert_eq!(email.email_configs[0].to, "ops@example.com");
        assert_eq!(email.email_configs[0].headers["Subject"], EMAIL_SUBJECT);

        let webhook = config.receivers.iter().find(|r| r.name == "r2").unwrap();
        assert!(webhook.email_configs.is_empty());
        assert_eq!(webhook.webhook_configs[0].url, "http://hooks.example.com/alert");

        assert_eq!(config.receivers.iter().filter(|r| r.name == "r1").count(), 1);
    }

    #[test]
    fn test_alert_config_overlay() {
        let alert_config = AlertConfig {
            id: "alertConfig".to_string(),
            resolve_timeout: "10m".to_string(),
            email_config: EmailConfig {
                smtp_smart_host: "smtp.example.com:587".to_string(),
                smtp_auth_username: "alerts@example.com".to_string(),
                smtp_auth_password: "hunter2".to_string(),
            },
        };

        let config = build_config(Some(&alert_config), &[], &[]);
        assert_eq!(config.global.resolve_timeout.to_string(), "10m");
        assert_eq!(config.global.smtp_from.as_deref(), Some("alerts@example.com"));
        assert_eq!(
            config.global.smtp_smarthost.as_deref(),
            Some("smtp.example.com:587")
        );
        assert!(!config.global.smtp_require_tls);
    }

    #[test]
    fn test_smtp_requires_password() {
        let alert_config = AlertConfig {
            resolve_timeout: "bogus".to_string(),
            email_config: EmailConfig {
                smtp_smart_host: "smtp.example.com:587".to_string(),
                smtp_auth_username: "alerts@example.com".to_string(),
                smtp_auth_password: String::new(),
            },
            ..AlertConfig::default()
        };

        let config = build_config(Some(&alert_config), &[], &[]);
        assert_eq!(config.global.resolve_timeout.to_string(), "5m");
        assert!(config.global.smtp_smarthost.is_none());
    }

    #[test]
    fn test_rendered_config_is_valid_yaml() {
        let config = build_config(
            None,
            &[alert("a1", "e1", TargetType::Host)],
            &[recipient("r1", RecipientType::Email)],
        );
        let rendered = serde_yaml::to_string(&config).unwrap();
        assert!(rendered.contains("match:"));
        assert!(!rendered.contains("smtp_from"));

        let parsed: AlertmanagerConfig = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[tokio::test]
    async fn test_sync_is_byte_identical_across_runs() {
        let service = Service::new(Arc::new(MemoryStore::new()));
        service
            .create_recipient(recipient("ignored", RecipientType::Webhook))
            .await
            .unwrap();
        for environment in ["e2", "e1", "e1"] {
            service
                .create_alert(alert("ignored", environment, TargetType::Service))
                .await
                .unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let sync = RouteSynchronizer::new(
            service,
            Arc::new(MockAlertingBackend::new()),
            path.clone(),
        );

        assert_eq!(sync.sync().await.unwrap(), Outcome::Reload);
        let first = std::fs::read(&path).unwrap();
        sync.sync().await.unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);

        let parsed: AlertmanagerConfig = serde_yaml::from_slice(&second).unwrap();
        let e1 = find_branch(&parsed, "e1").unwrap();
        assert_eq!(e1.routes.len(), 2);
    }

    #[tokio::test]
    async fn test_reload_goes_to_alertmanager() {
        let mut alertmanager = MockAlertingBackend::new();
        alertmanager.expect_reload().times(1).returning(|| Ok(()));

        let sync = RouteSynchronizer::new(
            Service::new(Arc::new(MemoryStore::new())),
            Arc::new(alertmanager),
            PathBuf::from("/nonexistent"),
        );
        sync.reload().await.unwrap();
    }
}
