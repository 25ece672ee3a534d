//! Scrape target discovery.
//!
//! Hosts are listed per environment from the platform and turned into three
//! static scrape jobs. Only those jobs are replaced in the Prometheus
//! configuration; every other part of the file is kept as found.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tokio::fs;
use tracing::{debug, info};

use super::{Outcome, Synchronizer};
use crate::{
    artifact::write_atomic,
    backend::{Environment, Host, MetricsBackend, Platform},
    config::PrometheusConfig,
    Error, Result,
};

pub const JOB_CADVISOR: &str = "cadvisor";
pub const JOB_NODE_EXPORTER: &str = "node-exporter";
pub const JOB_RANCHER_HEALTH_EXPORTER: &str = "rancher-health-exporter";

const MANAGED_JOBS: [&str; 3] = [JOB_CADVISOR, JOB_NODE_EXPORTER, JOB_RANCHER_HEALTH_EXPORTER];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExporterPorts {
    pub cadvisor: u16,
    pub node_exporter: u16,
    pub rancher_exporter: u16,
}

impl From<&PrometheusConfig> for ExporterPorts {
    fn from(config: &PrometheusConfig) -> Self {
        Self {
            cadvisor: config.cadvisor_port,
            node_exporter: config.node_exporter_port,
            rancher_exporter: config.rancher_exporter_port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub job_name: String,
    #[serde(default)]
    pub static_configs: Vec<TargetGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetGroup {
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ScrapeConfig {
    fn new(job_name: &str) -> Self {
        Self {
            job_name: job_name.to_string(),
            static_configs: Vec::new(),
        }
    }

    // One group per environment, even when it ends up without targets.
    fn add_group<'a>(
        &mut self,
        environment: &Environment,
        hosts: impl Iterator<Item = &'a Host>,
        port: u16,
    ) {
        let targets = hosts
            .map(|host| format!("{}:{}", host.agent_ip_address, port))
            .collect();

        let mut labels = BTreeMap::new();
        labels.insert("environment_id".to_string(), environment.id.clone());
        labels.insert("environment_name".to_string(), environment.name.clone());

        self.static_configs.push(TargetGroup { targets, labels });
    }
}

/// Builds the managed scrape jobs from the discovered inventory.
pub fn build_scrape_configs(
    inventory: &[(Environment, Vec<Host>)],
    ports: ExporterPorts,
) -> Vec<ScrapeConfig> {
    let mut cadvisor = ScrapeConfig::new(JOB_CADVISOR);
    let mut node_exporter = ScrapeConfig::new(JOB_NODE_EXPORTER);
    let mut rancher_exporter = ScrapeConfig::new(JOB_RANCHER_HEALTH_EXPORTER);

    for (environment, hosts) in inventory {
        cadvisor.add_group(environment, hosts.iter(), ports.cadvisor);
        node_exporter.add_group(environment, hosts.iter(), ports.node_exporter);
        rancher_exporter.add_group(
            environment,
            hosts
                .iter()
                .filter(|h| h.publishes_port(ports.rancher_exporter)),
            ports.rancher_exporter,
        );
    }

    vec![cadvisor, node_exporter, rancher_exporter]
}

fn is_managed(entry: &Value) -> bool {
    entry
        .get("job_name")
        .and_then(Value::as_str)
        .map(|name| MANAGED_JOBS.contains(&name))
        .unwrap_or(false)
}

/// Replaces the managed jobs in a parsed Prometheus configuration.
///
/// Unmanaged scrape configs and every other top-level key are carried over
/// untouched, in their original order.
pub fn merge_scrape_configs(document: Value, managed: &[ScrapeConfig]) -> Result<Value> {
    let mut root = match document {
        Value::Null => Mapping::new(),
        Value::Mapping(mapping) => mapping,
        _ => {
            return Err(Error::Config(
                "prometheus configuration is not a mapping".to_string(),
            ))
        }
    };

    let mut scrape_configs = managed
        .iter()
        .map(serde_yaml::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    match root.get_mut("scrape_configs") {
        Some(existing) => {
            if let Value::Sequence(entries) = existing {
                scrape_configs.extend(entries.drain(..).filter(|e| !is_managed(e)));
            }
            *existing = Value::Sequence(scrape_configs);
        }
        None => {
            root.insert(
                Value::String("scrape_configs".to_string()),
                Value::Sequence(scrape_configs),
            );
        }
    }

    Ok(Value::Mapping(root))
}

pub struct TargetSynchronizer {
    platform: Arc<dyn Platform>,
    prometheus: Arc<dyn MetricsBackend>,
    config_file: PathBuf,
    ports: ExporterPorts,
}

impl TargetSynchronizer {
    pub fn new(
        platform: Arc<dyn Platform>,
        prometheus: Arc<dyn MetricsBackend>,
        config_file: PathBuf,
        ports: ExporterPorts,
    ) -> Self {
        Self {
            platform,
            prometheus,
            config_file,
            ports,
        }
    }

    async fn discover(&self) -> Result<Vec<(Environment, Vec<Host>)>> {
        let environments = self.platform.list_environments().await?;
        let mut inventory = Vec::with_capacity(environments.len());
        for environment in environments {
            let hosts = self.platform.list_hosts(&environment.id).await?;
            debug!(
                "Environment {} has {} hosts",
                environment.id,
                hosts.len()
            );
            inventory.push((environment, hosts));
        }
        Ok(inventory)
    }
}

#[async_trait]
impl Synchronizer for TargetSynchronizer {
    fn name(&self) -> &'static str {
        "target"
    }

    async fn sync(&self) -> Result<Outcome> {
        let inventory = self.discover().await?;
        let managed = build_scrape_configs(&inventory, self.ports);

        let current = fs::read_to_string(&self.config_file).await?;
        let document: Value = serde_yaml::from_str(&current)?;
        let merged = merge_scrape_configs(document, &managed)?;

        let rendered = serde_yaml::to_string(&merged)?;
        debug!("New generated prometheus config: {}", rendered);
        write_atomic(&self.config_file, rendered.as_bytes()).await?;

        info!(
            "Synchronized scrape targets for {} environments",
            inventory.len()
        );
        Ok(Outcome::Reload)
    }

    async fn reload(&self) -> Result<()> {
        self.prometheus.reload().await
    }
}
