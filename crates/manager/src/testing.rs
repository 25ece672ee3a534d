//! Fixtures shared by unit tests.

use crate::model::{
    AdvancedOptions, Alert, AlertState, EmailRecipient, HealthRule, MetricRule, Recipient,
    RecipientType, Severity, TargetType, WebhookRecipient,
};

pub fn alert(id: &str, environment: &str, target_type: TargetType) -> Alert {
    Alert {
        id: id.to_string(),
        environment: environment.to_string(),
        description: format!("alert {}", id),
        severity: Severity::Warning,
        target_type,
        target_id: if target_type == TargetType::Metric {
            String::new()
        } else {
            "t1".to_string()
        },
        host_rule: HealthRule {
            hold_duration: "1m".to_string(),
        },
        service_rule: HealthRule {
            hold_duration: "2m".to_string(),
        },
        stack_rule: HealthRule {
            hold_duration: "3m".to_string(),
        },
        metric_rule: MetricRule {
            expr: "up == 0".to_string(),
            hold_duration: "4m".to_string(),
        },
        advanced_options: AdvancedOptions::default(),
        recipient_id: "r1".to_string(),
        state: AlertState::Enabled,
        starts_at: None,
        ends_at: None,
    }
}

pub fn recipient(id: &str, recipient_type: RecipientType) -> Recipient {
    Recipient {
        id: id.to_string(),
        environment: "e1".to_string(),
        recipient_type,
        email_recipient: EmailRecipient {
            address: "ops@example.com".to_string(),
        },
        webhook_recipient: WebhookRecipient {
            name: "hook".to_string(),
            url: "http://hooks.example.com/alert".to_string(),
        },
    }
}
