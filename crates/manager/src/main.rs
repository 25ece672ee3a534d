use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::join_all;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use monitoring_manager::{
    backend::{AlertmanagerClient, CattleClient, PrometheusClient},
    config::Config,
    server::Server,
    service::Service,
    signal::{shutdown_channel, SignalBus, Topic},
    store::create_store,
    sync::{
        target::ExporterPorts, RouteSynchronizer, RuleSynchronizer, StateReconciler, SyncLoop,
        TargetSynchronizer, Trigger,
    },
};

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("invalid configuration")?;
    init_logging(config.debug);
    info!(
        "Starting monitoring manager for {} with {:?} store",
        config.cattle.url, config.database.db_type
    );

    let store = create_store(&config.database_config())
        .await
        .context("failed to open object store")?;
    store.init().await.context("failed to initialize object store")?;
    let service = Service::new(store);

    let timeout = config.sync.request_timeout();
    let prometheus = Arc::new(PrometheusClient::new(config.prometheus.url.clone(), timeout)?);
    let alertmanager = Arc::new(AlertmanagerClient::new(config.alertmanager.url.clone(), timeout)?);
    let platform = Arc::new(CattleClient::new(
        &config.cattle.url,
        config.cattle.access_key.clone(),
        config.cattle.secret_key.clone(),
        timeout,
    )?);

    let (bus, subscriptions) = SignalBus::new();
    let (shutdown_handle, shutdown) = shutdown_channel();
    let reload_delay = config.sync.reload_delay();

    let mut tasks = vec![
        tokio::spawn(
            SyncLoop::new(
                TargetSynchronizer::new(
                    platform,
                    prometheus.clone(),
                    config.prometheus.config_file.clone(),
                    ExporterPorts::from(&config.prometheus),
                ),
                Trigger::Interval(config.sync.target_interval()),
                reload_delay,
                shutdown.clone(),
            )
            .run(),
        ),
        tokio::spawn(
            SyncLoop::new(
                RouteSynchronizer::new(
                    service.clone(),
                    alertmanager.clone(),
                    config.alertmanager.config_file.clone(),
                ),
                Trigger::Signal(subscriptions.alert_changed),
                reload_delay,
                shutdown.clone(),
            )
            .run(),
        ),
        tokio::spawn(
            SyncLoop::new(
                RuleSynchronizer::new(
                    service.clone(),
                    prometheus,
                    config.prometheus.rule_file.clone(),
                ),
                Trigger::Signal(subscriptions.metrics_changed),
                reload_delay,
                shutdown.clone(),
            )
            .run(),
        ),
        tokio::spawn(
            SyncLoop::new(
                StateReconciler::new(service.clone(), alertmanager),
                Trigger::Interval(config.sync.state_interval()),
                Duration::ZERO,
                shutdown.clone(),
            )
            .run(),
        ),
    ];

    let server = Server::new(service);
    let addr = config.server.addr.clone();
    let server_shutdown = shutdown.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = server.start(&addr, server_shutdown).await {
            error!("Server error: {}", e);
        }
    }));

    // Generate routes and rules from whatever the store already holds.
    bus.notify(Topic::AlertChanged);
    bus.notify(Topic::MetricsChanged);

    shutdown_signal().await;
    info!("Received shutdown signal, exiting gracefully...");
    shutdown_handle.trigger();

    for result in join_all(tasks).await {
        if let Err(e) = result {
            error!("Task failed: {}", e);
        }
    }
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
