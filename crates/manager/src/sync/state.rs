//! Alert lifecycle state driven by what Alertmanager reports.
//!
//! Every tick the live alert list is matched against the stored alerts by
//! `alert_id` and `environment` labels. A match means the alert is firing
//! (active) or firing but silenced (suppressed); no match means it is back to
//! enabled. A silenced alert that stops firing has its silence removed so
//! that the next occurrence notifies again.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use super::{Outcome, Synchronizer};
use crate::{
    backend::{AlertingBackend, LiveAlert},
    metrics,
    model::{Alert, AlertState},
    service::Service,
    Result,
};

/// State implied by the live alert list, and the live alert it came from.
pub fn observe<'a>(alert: &Alert, live: &'a [LiveAlert]) -> (AlertState, Option<&'a LiveAlert>) {
    let found = live.iter().find(|l| {
        l.label("alert_id") == Some(alert.id.as_str())
            && l.label("environment") == Some(alert.environment.as_str())
    });

    match found {
        None => (AlertState::Enabled, None),
        Some(l) if l.is_suppressed() => (AlertState::Suppressed, Some(l)),
        Some(l) => (AlertState::Active, Some(l)),
    }
}

/// Changes to apply to one alert after an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub previous: AlertState,
    pub changed: bool,
    pub remove_silence: bool,
}

/// Applies the observed state and timestamps to `alert` in place.
pub fn reconcile(alert: &mut Alert, live: &[LiveAlert]) -> Reconciliation {
    let previous = alert.state;
    let (observed, matched) = observe(alert, live);
    let mut changed = false;
    let mut remove_silence = false;

    if observed != previous {
        remove_silence = previous == AlertState::Suppressed && observed == AlertState::Enabled;
        alert.state = observed;
        changed = true;
    }

    match matched {
        Some(l) => {
            changed |= set_timestamp(&mut alert.starts_at, l.starts_at);
            changed |= set_timestamp(&mut alert.ends_at, l.ends_at);
        }
        None => {
            changed |= set_timestamp(&mut alert.starts_at, None);
            changed |= set_timestamp(&mut alert.ends_at, None);
        }
    }

    Reconciliation {
        previous,
        changed,
        remove_silence,
    }
}

fn set_timestamp(slot: &mut Option<DateTime<Utc>>, value: Option<DateTime<Utc>>) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

pub struct StateReconciler {
    service: Service,
    alertmanager: Arc<dyn AlertingBackend>,
}

impl StateReconciler {
    pub fn new(service: Service, alertmanager: Arc<dyn AlertingBackend>) -> Self {
        Self {
            service,
            alertmanager,
        }
    }

    async fn reconcile_one(&self, mut alert: Alert, live: &[LiveAlert]) -> Result<()> {
        let outcome = reconcile(&mut alert, live);
        if !outcome.changed {
            return Ok(());
        }

        if outcome.previous != alert.state {
            info!(
                "Alert {} moved from {} to {}",
                alert.id, outcome.previous, alert.state
            );
            metrics::ALERT_STATE_TRANSITIONS_TOTAL
                .with_label_values(&[outcome.previous.as_str(), alert.state.as_str()])
                .inc();
        }

        if outcome.remove_silence {
            // The state change stands even when cleanup fails.
            match self.alertmanager.remove_silence(&alert).await {
                Ok(()) => metrics::SILENCES_REMOVED_TOTAL.inc(),
                Err(e) => error!("Error while removing silence for alert {}: {}", alert.id, e),
            }
        }

        self.service.update_alert(&alert).await
    }
}

#[async_trait]
impl Synchronizer for StateReconciler {
    fn name(&self) -> &'static str {
        "state"
    }

    async fn sync(&self) -> Result<Outcome> {
        let live = self.alertmanager.list_alerts().await?;
        let alerts = self.service.list_alerts(None).await?;
        debug!(
            "Reconciling {} alerts against {} live alerts",
            alerts.len(),
            live.len()
        );

        for alert in alerts.into_iter().filter(|a| !a.is_disabled()) {
            let id = alert.id.clone();
            if let Err(e) = self.reconcile_one(alert, &live).await {
                error!("Error occurred while syncing state of alert {}: {}", id, e);
            }
        }
        Ok(Outcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LiveAlertStatus, MockAlertingBackend};
    use crate::model::{Kind, TargetType};
    use crate::store::{MemoryStore, ObjectStore, StoredObject};
    use crate::testing::alert;
    use crate::Error;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn live(alert_id: &str, environment: &str, state: &str) -> LiveAlert {
        let mut labels = BTreeMap::new();
        labels.insert("alert_id".to_string(), alert_id.to_string());
        labels.insert("environment".to_string(), environment.to_string());
        LiveAlert {
            labels,
            starts_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()),
            ends_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap()),
            status: LiveAlertStatus {
                state: state.to_string(),
                ..LiveAlertStatus::default()
            },
            ..LiveAlert::default()
        }
    }

    async fn seeded(alerts: Vec<Alert>) -> (Service, Vec<Alert>) {
        let service = Service::new(Arc::new(MemoryStore::new()));
        let mut stored = Vec::new();
        for a in alerts {
            let state = a.state;
            let mut created = service.create_alert(a).await.unwrap();
            if state != created.state {
                created.state = state;
                service.update_alert(&created).await.unwrap();
            }
            stored.push(created);
        }
        (service, stored)
    }

    #[test]
    fn test_observe_requires_both_labels() {
        let a1 = alert("a1", "e1", TargetType::Host);

        let elsewhere = [live("a1", "e2", "active")];
        let (state, matched) = observe(&a1, &elsewhere);
        assert_eq!(state, AlertState::Enabled);
        assert!(matched.is_none());

        let firing = [live("a1", "e1", "active")];
        let (state, matched) = observe(&a1, &firing);
        assert_eq!(state, AlertState::Active);
        assert_eq!(matched, Some(&firing[0]));

        let silenced = [live("a1", "e1", "suppressed")];
        let (state, _) = observe(&a1, &silenced);
        assert_eq!(state, AlertState::Suppressed);
    }

    #[test]
    fn test_enabled_to_active_copies_timestamps() {
        let mut a1 = alert("a1", "e1", TargetType::Host);
        let firing = live("a1", "e1", "active");

        let outcome = reconcile(&mut a1, std::slice::from_ref(&firing));
        assert!(outcome.changed);
        assert!(!outcome.remove_silence);
        assert_eq!(a1.state, AlertState::Active);
        assert_eq!(a1.starts_at, firing.starts_at);
        assert_eq!(a1.ends_at, firing.ends_at);

        // Nothing new on the second look.
        let again = reconcile(&mut a1, &[firing]);
        assert!(!again.changed);
    }

    #[test]
    fn test_resolved_alert_clears_timestamps() {
        let mut a1 = alert("a1", "e1", TargetType::Host);
        reconcile(&mut a1, &[live("a1", "e1", "active")]);

        let outcome = reconcile(&mut a1, &[]);
        assert!(outcome.changed);
        assert!(!outcome.remove_silence);
        assert_eq!(a1.state, AlertState::Enabled);
        assert!(a1.starts_at.is_none());
        assert!(a1.ends_at.is_none());
    }

    #[test]
    fn test_active_to_suppressed_keeps_silence() {
        let mut a1 = alert("a1", "e1", TargetType::Host);
        a1.state = AlertState::Active;

        let outcome = reconcile(&mut a1, &[live("a1", "e1", "suppressed")]);
        assert_eq!(a1.state, AlertState::Suppressed);
        assert!(!outcome.remove_silence);
    }

    #[tokio::test]
    async fn test_resolved_silenced_alert_removes_silence_once() {
        let mut silenced = alert("ignored", "e1", TargetType::Host);
        silenced.state = AlertState::Suppressed;
        let (service, stored) = seeded(vec![silenced]).await;
        let id = stored[0].id.clone();

        let mut alertmanager = MockAlertingBackend::new();
        alertmanager
            .expect_list_alerts()
            .times(1)
            .returning(|| Ok(vec![]));
        let expected = id.clone();
        alertmanager
            .expect_remove_silence()
            .withf(move |a: &Alert| a.id == expected)
            .times(1)
            .returning(|_| Ok(()));

        let reconciler = StateReconciler::new(service.clone(), Arc::new(alertmanager));
        assert_eq!(reconciler.sync().await.unwrap(), Outcome::Done);

        let updated = service.get_alert(&id).await.unwrap();
        assert_eq!(updated.state, AlertState::Enabled);
    }

    #[tokio::test]
    async fn test_firing_alert_becomes_active_in_store() {
        let (service, stored) = seeded(vec![alert("ignored", "e1", TargetType::Metric)]).await;
        let id = stored[0].id.clone();
        let firing = live(&id, "e1", "active");
        let expected_start = firing.starts_at;

        let mut alertmanager = MockAlertingBackend::new();
        alertmanager
            .expect_list_alerts()
            .returning(move || Ok(vec![firing.clone()]));
        alertmanager.expect_remove_silence().times(0);

        let reconciler = StateReconciler::new(service.clone(), Arc::new(alertmanager));
        reconciler.sync().await.unwrap();

        let updated = service.get_alert(&id).await.unwrap();
        assert_eq!(updated.state, AlertState::Active);
        assert_eq!(updated.starts_at, expected_start);
    }

    #[tokio::test]
    async fn test_disabled_alerts_are_frozen() {
        let mut disabled = alert("ignored", "e1", TargetType::Host);
        disabled.state = AlertState::Disabled;
        let (service, stored) = seeded(vec![disabled]).await;
        let id = stored[0].id.clone();
        let firing = live(&id, "e1", "active");

        let mut alertmanager = MockAlertingBackend::new();
        alertmanager
            .expect_list_alerts()
            .returning(move || Ok(vec![firing.clone()]));

        StateReconciler::new(service.clone(), Arc::new(alertmanager))
            .sync()
            .await
            .unwrap();

        let unchanged = service.get_alert(&id).await.unwrap();
        assert_eq!(unchanged.state, AlertState::Disabled);
        assert!(unchanged.starts_at.is_none());
    }

    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        updates: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for CountingStore {
        async fn init(&self) -> Result<()> {
            self.inner.init().await
        }

        async fn list(&self, kind: Kind) -> Result<Vec<StoredObject>> {
            self.inner.list(kind).await
        }

        async fn get(&self, kind: Kind, id: &str) -> Result<Option<StoredObject>> {
            self.inner.get(kind, id).await
        }

        async fn create(&self, kind: Kind, id: &str, payload: String) -> Result<()> {
            self.inner.create(kind, id, payload).await
        }

        async fn update(&self, kind: Kind, id: &str, payload: String) -> Result<()> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.inner.update(kind, id, payload).await
        }

        async fn delete(&self, kind: Kind, id: &str) -> Result<()> {
            self.inner.delete(kind, id).await
        }
    }

    #[tokio::test]
    async fn test_unchanged_alert_is_not_written() {
        let store = Arc::new(CountingStore::default());
        let service = Service::new(store.clone());
        let created = service
            .create_alert(alert("ignored", "e1", TargetType::Host))
            .await
            .unwrap();
        let firing = live(&created.id, "e1", "active");

        let mut alertmanager = MockAlertingBackend::new();
        alertmanager
            .expect_list_alerts()
            .returning(move || Ok(vec![firing.clone()]));
        let reconciler = StateReconciler::new(service, Arc::new(alertmanager));

        // First tick moves it to active, the second has nothing to do.
        reconciler.sync().await.unwrap();
        assert_eq!(store.updates.load(Ordering::SeqCst), 1);
        reconciler.sync().await.unwrap();
        assert_eq!(store.updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_live_list_failure_fails_the_tick() {
        let mut alertmanager = MockAlertingBackend::new();
        alertmanager
            .expect_list_alerts()
            .returning(|| Err(Error::Backend("connection refused".to_string())));

        let reconciler = StateReconciler::new(
            Service::new(Arc::new(MemoryStore::new())),
            Arc::new(alertmanager),
        );
        assert!(reconciler.sync().await.is_err());
    }

    #[tokio::test]
    async fn test_failed_silence_cleanup_still_updates_state() {
        let mut silenced = alert("ignored", "e1", TargetType::Host);
        silenced.state = AlertState::Suppressed;
        let (service, stored) = seeded(vec![silenced]).await;
        let id = stored[0].id.clone();

        let mut alertmanager = MockAlertingBackend::new();
        alertmanager.expect_list_alerts().returning(|| Ok(vec![]));
        alertmanager
            .expect_remove_silence()
            .times(1)
            .returning(|_| Err(Error::Backend("timeout".to_string())));

        StateReconciler::new(service.clone(), Arc::new(alertmanager))
            .sync()
            .await
            .unwrap();

        assert_eq!(
            service.get_alert(&id).await.unwrap().state,
            AlertState::Enabled
        );
    }
}
