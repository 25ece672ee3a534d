//! User-driven operations on alerts, recipients and the alert configuration.
//!
//! These are the entry points for a resource API: each validates its input,
//! applies the change through the service layer and wakes the loops whose
//! output depends on it. Illegal requests are rejected before any backend or
//! store write happens.

use std::sync::Arc;

use tracing::info;

use crate::{
    backend::AlertingBackend,
    duration::PromDuration,
    model::{Alert, AlertConfig, AlertState, Recipient, RecipientType, TargetType},
    service::Service,
    signal::{SignalBus, Topic},
    Error, Result,
};

#[derive(Clone)]
pub struct Lifecycle {
    service: Service,
    alertmanager: Arc<dyn AlertingBackend>,
    bus: SignalBus,
}

pub fn validate_alert(alert: &Alert) -> Result<()> {
    if alert.environment.is_empty() {
        return Err(Error::Validation("missing environment".to_string()));
    }
    if alert.description.is_empty() {
        return Err(Error::Validation("missing description".to_string()));
    }
    if alert.recipient_id.is_empty() {
        return Err(Error::Validation("missing recipient id".to_string()));
    }
    match alert.target_type {
        TargetType::Metric if alert.metric_rule.expr.trim().is_empty() => Err(Error::Validation(
            "metric alert requires an expression".to_string(),
        )),
        TargetType::Metric => Ok(()),
        _ if alert.target_id.is_empty() => {
            Err(Error::Validation("missing target id".to_string()))
        }
        _ => Ok(()),
    }
}

pub fn validate_recipient(recipient: &Recipient) -> Result<()> {
    if recipient.environment.is_empty() {
        return Err(Error::Validation("missing environment".to_string()));
    }
    match recipient.recipient_type {
        RecipientType::Email if recipient.email_recipient.address.is_empty() => Err(
            Error::Validation("email address can't be empty".to_string()),
        ),
        RecipientType::Webhook if recipient.webhook_recipient.url.is_empty() => {
            Err(Error::Validation("webhook url can't be empty".to_string()))
        }
        RecipientType::Webhook if recipient.webhook_recipient.name.is_empty() => {
            Err(Error::Validation("webhook name can't be empty".to_string()))
        }
        _ => Ok(()),
    }
}

fn reject(alert: &Alert, action: &str) -> Error {
    Error::InvalidTransition(format!(
        "alert {} is {}, can not perform {} action",
        alert.id, alert.state, action
    ))
}

impl Lifecycle {
    pub fn new(service: Service, alertmanager: Arc<dyn AlertingBackend>, bus: SignalBus) -> Self {
        Self {
            service,
            alertmanager,
            bus,
        }
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    // Alert edits change both the routing tree and the rule file.
    fn alerts_changed(&self) {
        self.bus.notify(Topic::AlertChanged);
        self.bus.notify(Topic::MetricsChanged);
    }

    async fn require_recipient(&self, id: &str) -> Result<()> {
        match self.service.get_recipient(id).await {
            Ok(_) => Ok(()),
            Err(Error::NotFound(_)) => Err(Error::Validation(format!(
                "recipient {} does not exist",
                id
            ))),
            Err(e) => Err(e),
        }
    }

    pub async fn create_alert(&self, alert: Alert) -> Result<Alert> {
        validate_alert(&alert)?;
        self.require_recipient(&alert.recipient_id).await?;

        let created = self.service.create_alert(alert).await?;
        info!("Created alert {} in {}", created.id, created.environment);
        self.alerts_changed();
        Ok(created)
    }

    /// Replaces the user-editable fields; lifecycle state is kept.
    pub async fn update_alert(&self, id: &str, mut alert: Alert) -> Result<Alert> {
        let current = self.service.get_alert(id).await?;
        validate_alert(&alert)?;
        self.require_recipient(&alert.recipient_id).await?;

        alert.id = current.id;
        alert.state = current.state;
        alert.starts_at = current.starts_at;
        alert.ends_at = current.ends_at;

        self.service.update_alert(&alert).await?;
        self.alerts_changed();
        Ok(alert)
    }

    pub async fn disable_alert(&self, id: &str) -> Result<Alert> {
        let mut alert = self.service.get_alert(id).await?;
        if alert.state != AlertState::Enabled {
            return Err(reject(&alert, "disable"));
        }

        alert.state = AlertState::Disabled;
        self.service.update_alert(&alert).await?;
        self.alerts_changed();
        Ok(alert)
    }

    pub async fn enable_alert(&self, id: &str) -> Result<Alert> {
        let mut alert = self.service.get_alert(id).await?;
        if alert.state != AlertState::Disabled {
            return Err(reject(&alert, "enable"));
        }

        alert.state = AlertState::Enabled;
        self.service.update_alert(&alert).await?;
        self.alerts_changed();
        Ok(alert)
    }

    pub async fn silence_alert(&self, id: &str) -> Result<Alert> {
        let mut alert = self.service.get_alert(id).await?;
        if alert.state != AlertState::Active {
            return Err(reject(&alert, "silence"));
        }

        self.alertmanager.add_silence(&alert).await?;
        alert.state = AlertState::Suppressed;
        self.service.update_alert(&alert).await?;
        info!("Silenced alert {}", alert.id);
        Ok(alert)
    }

    pub async fn unsilence_alert(&self, id: &str) -> Result<Alert> {
        let mut alert = self.service.get_alert(id).await?;
        if alert.state != AlertState::Suppressed {
            return Err(reject(&alert, "unsilence"));
        }

        self.alertmanager.remove_silence(&alert).await?;
        alert.state = AlertState::Active;
        self.service.update_alert(&alert).await?;
        info!("Unsilenced alert {}", alert.id);
        Ok(alert)
    }

    pub async fn delete_alert(&self, id: &str) -> Result<Alert> {
        let deleted = self.service.delete_alert(id).await?;
        self.alerts_changed();
        Ok(deleted)
    }

    pub async fn create_recipient(&self, recipient: Recipient) -> Result<Recipient> {
        validate_recipient(&recipient)?;
        let created = self.service.create_recipient(recipient).await?;
        self.bus.notify(Topic::AlertChanged);
        Ok(created)
    }

    pub async fn update_recipient(&self, id: &str, mut recipient: Recipient) -> Result<Recipient> {
        self.service.get_recipient(id).await?;
        validate_recipient(&recipient)?;

        recipient.id = id.to_string();
        self.service.update_recipient(&recipient).await?;
        self.bus.notify(Topic::AlertChanged);
        Ok(recipient)
    }

    pub async fn delete_recipient(&self, id: &str) -> Result<Recipient> {
        let deleted = self.service.delete_recipient(id).await?;
        self.bus.notify(Topic::AlertChanged);
        Ok(deleted)
    }

    pub async fn save_alert_config(&self, config: AlertConfig) -> Result<AlertConfig> {
        if !config.resolve_timeout.is_empty() {
            PromDuration::parse(&config.resolve_timeout)?;
        }
        let saved = self.service.save_alert_config(config).await?;
        self.bus.notify(Topic::AlertChanged);
        Ok(saved)
    }
}
