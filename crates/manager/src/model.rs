use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// Alert lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    #[default]
    Enabled,
    Disabled,
    Active,
    Suppressed,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Enabled => "enabled",
            AlertState::Disabled => "disabled",
            AlertState::Active => "active",
            AlertState::Suppressed => "suppressed",
        }
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Host,
    Stack,
    Service,
    Metric,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Host => "host",
            TargetType::Stack => "stack",
            TargetType::Service => "service",
            TargetType::Metric => "metric",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRule {
    #[serde(default)]
    pub hold_duration: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRule {
    #[serde(default)]
    pub expr: String,
    #[serde(default)]
    pub hold_duration: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedOptions {
    #[serde(default)]
    pub initial_wait: String,
    #[serde(default)]
    pub repeat_interval: String,
}

/// A user-defined alert rule and the lifecycle state observed for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(default)]
    pub id: String,
    pub environment: String,
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    pub target_type: TargetType,
    #[serde(default)]
    pub target_id: String,
    #[serde(default)]
    pub host_rule: HealthRule,
    #[serde(default)]
    pub service_rule: HealthRule,
    #[serde(default)]
    pub stack_rule: HealthRule,
    #[serde(default)]
    pub metric_rule: MetricRule,
    #[serde(default)]
    pub advanced_options: AdvancedOptions,
    pub recipient_id: String,
    #[serde(default)]
    pub state: AlertState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Hold duration of the rule payload selected by the target type.
    pub fn hold_duration(&self) -> &str {
        match self.target_type {
            TargetType::Host => &self.host_rule.hold_duration,
            TargetType::Stack => &self.stack_rule.hold_duration,
            TargetType::Service => &self.service_rule.hold_duration,
            TargetType::Metric => &self.metric_rule.hold_duration,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.state == AlertState::Disabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientType {
    Email,
    Webhook,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecipient {
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRecipient {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    #[serde(default)]
    pub id: String,
    pub environment: String,
    pub recipient_type: RecipientType,
    #[serde(default)]
    pub email_recipient: EmailRecipient,
    #[serde(default)]
    pub webhook_recipient: WebhookRecipient,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(rename = "smtpSmartHost", default)]
    pub smtp_smart_host: String,
    #[serde(rename = "smtpAuthUsername", default)]
    pub smtp_auth_username: String,
    #[serde(rename = "smtpAuthPassword", default)]
    pub smtp_auth_password: String,
}

/// Process-wide notification settings. At most one exists in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub resolve_timeout: String,
    #[serde(default)]
    pub email_config: EmailConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Alert,
    Recipient,
    AlertConfig,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Alert => "alert",
            Kind::Recipient => "recipient",
            Kind::AlertConfig => "alertConfig",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "alert" => Ok(Kind::Alert),
            "recipient" => Ok(Kind::Recipient),
            "alertConfig" => Ok(Kind::AlertConfig),
            other => Err(Error::Store(format!("unknown object kind '{}'", other))),
        }
    }
}

/// Domain object as persisted: the store only sees kind, id and an opaque payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Alert(Alert),
    Recipient(Recipient),
    AlertConfig(AlertConfig),
}

impl Resource {
    pub fn kind(&self) -> Kind {
        match self {
            Resource::Alert(_) => Kind::Alert,
            Resource::Recipient(_) => Kind::Recipient,
            Resource::AlertConfig(_) => Kind::AlertConfig,
        }
    }

    pub fn encode(&self) -> Result<String> {
        let payload = match self {
            Resource::Alert(a) => serde_json::to_string(a)?,
            Resource::Recipient(r) => serde_json::to_string(r)?,
            Resource::AlertConfig(c) => serde_json::to_string(c)?,
        };
        Ok(payload)
    }

    pub fn decode(kind: Kind, payload: &str) -> Result<Self> {
        let resource = match kind {
            Kind::Alert => Resource::Alert(serde_json::from_str(payload)?),
            Kind::Recipient => Resource::Recipient(serde_json::from_str(payload)?),
            Kind::AlertConfig => Resource::AlertConfig(serde_json::from_str(payload)?),
        };
        Ok(resource)
    }
}
