use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser};
use serde::{Deserialize, Serialize};

use crate::store::{DatabaseConfig, DatabaseType};

/// Process configuration, built once at startup and handed to each component.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "monitoring-manager", version, about = "A monitoring manager for Rancher")]
pub struct Config {
    /// Debug logging
    #[arg(short, long, env = "DEBUG", default_value_t = false)]
    pub debug: bool,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub prometheus: PrometheusConfig,

    #[command(flatten)]
    pub alertmanager: AlertmanagerConfig,

    #[command(flatten)]
    pub cattle: CattleConfig,

    #[command(flatten)]
    pub sync: SyncConfig,

    #[command(flatten)]
    pub database: StoreArgs,
}

#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address of the health and metrics endpoint
    #[arg(short, long = "listen-addr", env = "LISTEN_ADDR", default_value = "0.0.0.0:8888")]
    pub addr: String,
}

#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Prometheus URL
    #[arg(id = "prometheus_url", short = 'p', long = "prometheus-url", env = "PROMETHEUS_URL", default_value = "http://prometheus:9090")]
    pub url: String,

    /// Prometheus configuration file holding the scrape configs
    #[arg(id = "prometheus_config", long = "prometheus-config", env = "PROMETHEUS_CONFIG", default_value = "/etc/prometheus/prometheus.yml")]
    pub config_file: PathBuf,

    /// Prometheus alerting rule file
    #[arg(long = "prometheus-rule", env = "PROMETHEUS_RULE", default_value = "/etc/prometheus/rules/rancher.yml")]
    pub rule_file: PathBuf,

    #[arg(long = "cadvisor-port", env = "CADVISOR_PORT", default_value_t = 9101)]
    pub cadvisor_port: u16,

    #[arg(long = "node-exporter-port", env = "NODE_EXPORTER_PORT", default_value_t = 9100)]
    pub node_exporter_port: u16,

    #[arg(long = "rancher-exporter-port", env = "RANCHER_EXPORTER_PORT", default_value_t = 9173)]
    pub rancher_exporter_port: u16,
}

#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct AlertmanagerConfig {
    /// Alertmanager URL
    #[arg(id = "alertmanager_url", long = "alertmanager-url", env = "ALERTMANAGER_URL", default_value = "http://alertmanager:9093")]
    pub url: String,

    /// Alertmanager configuration file holding routes and receivers
    #[arg(id = "alertmanager_config", long = "alertmanager-config", env = "ALERTMANAGER_CONFIG", default_value = "/etc/alertmanager/config.yml")]
    pub config_file: PathBuf,
}

#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct CattleConfig {
    /// Rancher API URL
    #[arg(id = "cattle_url", long = "cattle-url", env = "CATTLE_URL", default_value = "")]
    pub url: String,

    #[arg(long = "cattle-access-key", env = "CATTLE_ACCESS_KEY", default_value = "")]
    pub access_key: String,

    #[arg(long = "cattle-secret-key", env = "CATTLE_SECRET_KEY", default_value = "")]
    #[serde(skip_serializing)]
    pub secret_key: String,
}

#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Prometheus target synchronize interval
    #[arg(short = 'i', long = "sync-interval-sec", env = "SYNC_INTERVAL_SEC", default_value_t = 30)]
    pub target_interval_sec: u64,

    /// Alert state poll interval
    #[arg(long = "state-interval-sec", env = "STATE_INTERVAL_SEC", default_value_t = 30)]
    pub state_interval_sec: u64,

    /// Wait before asking a backend to reload a freshly written file
    #[arg(long = "reload-delay-sec", env = "RELOAD_DELAY_SEC", default_value_t = 10)]
    pub reload_delay_sec: u64,

    /// Bound on every backend and platform request
    #[arg(long = "request-timeout-sec", env = "REQUEST_TIMEOUT_SEC", default_value_t = 30)]
    pub request_timeout_sec: u64,
}

#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct StoreArgs {
    /// Object store backend
    #[arg(long = "store", env = "STORE_BACKEND", value_enum, default_value_t = DatabaseType::Memory)]
    pub db_type: DatabaseType,

    #[arg(long = "sqlite-path", env = "SQLITE_PATH")]
    pub sqlite_path: Option<PathBuf>,
}

impl SyncConfig {
    pub fn target_interval(&self) -> Duration {
        Duration::from_secs(self.target_interval_sec)
    }

    pub fn state_interval(&self) -> Duration {
        Duration::from_secs(self.state_interval_sec)
    }

    pub fn reload_delay(&self) -> Duration {
        Duration::from_secs(self.reload_delay_sec)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }
}

impl From<&StoreArgs> for DatabaseConfig {
    fn from(args: &StoreArgs) -> Self {
        DatabaseConfig {
            db_type: args.db_type,
            sqlite_path: args.sqlite_path.clone(),
        }
    }
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Config::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.cattle.url.is_empty() {
            return Err(crate::Error::Config(
                "CATTLE_URL must be set for target discovery".to_string(),
            ));
        }
        if self.cattle.access_key.is_empty() || self.cattle.secret_key.is_empty() {
            tracing::warn!("CATTLE_ACCESS_KEY or CATTLE_SECRET_KEY is not set. Platform requests may be rejected.");
        }
        if self.sync.target_interval_sec == 0 || self.sync.state_interval_sec == 0 {
            return Err(crate::Error::Config(
                "sync intervals must be greater than zero".to_string(),
            ));
        }
        if self.sync.request_timeout_sec == 0 {
            return Err(crate::Error::Config(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        self.database_config()
            .validate()
            .map_err(crate::Error::Config)?;
        Ok(())
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::from(&self.database)
    }
}
