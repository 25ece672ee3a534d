//! Prometheus alerting rules generated from alerts.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Outcome, Synchronizer};
use crate::{
    artifact::write_atomic,
    backend::MetricsBackend,
    duration::{parse_lenient, PromDuration},
    model::{Alert, TargetType},
    service::Service,
    Result,
};

pub const RULE_GROUP: &str = "rancher-rules";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroups {
    pub groups: Vec<RuleGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub alert: String,
    pub expr: String,
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub hold: Option<PromDuration>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Query that fires while the alert's target is unhealthy.
pub fn expression(alert: &Alert) -> String {
    match alert.target_type {
        TargetType::Metric => alert.metric_rule.expr.clone(),
        TargetType::Service => health_expression("rancher_service_health_status", alert),
        TargetType::Stack => health_expression("rancher_stack_health_status", alert),
        TargetType::Host => format!(
            r#"rancher_host_agent_state{{environment_id="{}", id="{}", state="active"}} != 1"#,
            alert.environment, alert.target_id
        ),
    }
}

fn health_expression(metric: &str, alert: &Alert) -> String {
    format!(
        r#"{}{{environment_id="{}", id="{}", health_state="healthy"}} != 1"#,
        metric, alert.environment, alert.target_id
    )
}

pub fn rule_for(alert: &Alert) -> Rule {
    let mut labels = BTreeMap::new();
    labels.insert("alert_id".to_string(), alert.id.clone());
    labels.insert("severity".to_string(), alert.severity.as_str().to_string());
    labels.insert("description".to_string(), alert.description.clone());
    labels.insert("target_type".to_string(), alert.target_type.as_str().to_string());
    labels.insert("environment".to_string(), alert.environment.clone());

    Rule {
        alert: alert.description.clone(),
        expr: expression(alert),
        // A zero or unparsable hold fires immediately.
        hold: parse_lenient(alert.hold_duration()).filter(|d| !d.is_zero()),
        labels,
    }
}

pub fn build_rules(alerts: &[Alert]) -> RuleGroups {
    RuleGroups {
        groups: vec![RuleGroup {
            name: RULE_GROUP.to_string(),
            rules: alerts
                .iter()
                .filter(|a| !a.is_disabled())
                .map(rule_for)
                .collect(),
        }],
    }
}

pub struct RuleSynchronizer {
    service: Service,
    prometheus: Arc<dyn MetricsBackend>,
    rule_file: PathBuf,
}

impl RuleSynchronizer {
    pub fn new(service: Service, prometheus: Arc<dyn MetricsBackend>, rule_file: PathBuf) -> Self {
        Self {
            service,
            prometheus,
            rule_file,
        }
    }
}

#[async_trait]
impl Synchronizer for RuleSynchronizer {
    fn name(&self) -> &'static str {
        "rule"
    }

    async fn sync(&self) -> Result<Outcome> {
        let alerts = self.service.list_alerts(None).await?;
        let rules = build_rules(&alerts);

        let rendered = serde_yaml::to_string(&rules)?;
        debug!("New generated prometheus rules: {}", rendered);
        write_atomic(&self.rule_file, rendered.as_bytes()).await?;

        info!("Synchronized {} alerting rules", rules.groups[0].rules.len());
        Ok(Outcome::Reload)
    }

    async fn reload(&self) -> Result<()> {
        self.prometheus.reload().await
    }
}
