use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry, Encoder,
    IntCounter, IntCounterVec, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref SYNC_RUNS_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "monitoring_manager_sync_runs_total",
        "Reconciliation cycles by synchronizer and outcome.",
        &["synchronizer", "outcome"],
        REGISTRY
    )
    .expect("sync_runs_total metric can be registered");
    pub static ref ALERT_STATE_TRANSITIONS_TOTAL: IntCounterVec =
        register_int_counter_vec_with_registry!(
            "monitoring_manager_alert_state_transitions_total",
            "Alert state changes applied by the state reconciler.",
            &["from", "to"],
            REGISTRY
        )
        .expect("alert_state_transitions_total metric can be registered");
    pub static ref SILENCES_REMOVED_TOTAL: IntCounter = register_int_counter_with_registry!(
        "monitoring_manager_silences_removed_total",
        "Silences removed automatically after the silenced alert resolved.",
        REGISTRY
    )
    .expect("silences_removed_total metric can be registered");
    pub static ref SIGNALS_COALESCED_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "monitoring_manager_signals_coalesced_total",
        "Change notifications dropped because one was already pending.",
        &["topic"],
        REGISTRY
    )
    .expect("signals_coalesced_total metric can be registered");
}

// Gather metrics in text exposition format
pub fn gather_metrics() -> String {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
