//! Typed access to domain objects.
//!
//! The store only knows kinds, ids and opaque payloads; this layer decodes them
//! into [`Resource`] variants and enforces the referential rules between them.

mod alert;
mod alert_config;
mod recipient;

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    model::{Kind, Resource},
    store::ObjectStore,
    Error, Result,
};

/// Fixed key of the singleton alert configuration.
pub const ALERT_CONFIG_KEY: &str = "alertConfig";

#[derive(Clone)]
pub struct Service {
    store: Arc<dyn ObjectStore>,
}

impl Service {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    async fn list_resources(&self, kind: Kind) -> Result<Vec<Resource>> {
        self.store
            .list(kind)
            .await?
            .iter()
            .map(|o| Resource::decode(o.kind, &o.payload))
            .collect()
    }

    async fn get_resource(&self, kind: Kind, id: &str) -> Result<Resource> {
        let object = self
            .store
            .get(kind, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("can not find the {} for id {}", kind, id)))?;
        Resource::decode(kind, &object.payload)
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{AlertConfig, AlertState, EmailConfig, RecipientType},
        store::MemoryStore,
        testing::{alert, recipient},
    };

    fn service() -> Service {
        Service::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_create_alert_assigns_id_and_enables() {
        let service = service();
        let mut input = alert("ignored", "e1", crate::model::TargetType::Host);
        input.state = AlertState::Active;

        let created = service.create_alert(input).await.unwrap();
        assert_eq!(created.id.len(), 32);
        assert_eq!(created.state, AlertState::Enabled);
        assert_eq!(service.get_alert(&created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_list_alerts_filters_by_environment() {
        let service = service();
        service
            .create_alert(alert("", "e1", crate::model::TargetType::Host))
            .await
            .unwrap();
        service
            .create_alert(alert("", "e2", crate::model::TargetType::Host))
            .await
            .unwrap();

        assert_eq!(service.list_alerts(None).await.unwrap().len(), 2);
        let e2 = service.list_alerts(Some("e2")).await.unwrap();
        assert_eq!(e2.len(), 1);
        assert_eq!(e2[0].environment, "e2");
    }

    #[tokio::test]
    async fn test_delete_alert_requires_disabled() {
        let service = service();
        let mut created = service
            .create_alert(alert("", "e1", crate::model::TargetType::Metric))
            .await
            .unwrap();

        assert!(matches!(
            service.delete_alert(&created.id).await,
            Err(Error::InvalidTransition(_))
        ));

        created.state = AlertState::Disabled;
        service.update_alert(&created).await.unwrap();
        service.delete_alert(&created.id).await.unwrap();
        assert!(matches!(
            service.get_alert(&created.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_recipient_rejected_while_referenced() {
        let service = service();
        let r = service
            .create_recipient(recipient("", RecipientType::Email))
            .await
            .unwrap();
        let mut a = alert("", "e1", crate::model::TargetType::Host);
        a.recipient_id = r.id.clone();
        let a = service.create_alert(a).await.unwrap();

        assert!(matches!(
            service.delete_recipient(&r.id).await,
            Err(Error::Validation(_))
        ));

        let mut a = a;
        a.state = AlertState::Disabled;
        service.update_alert(&a).await.unwrap();
        service.delete_alert(&a.id).await.unwrap();
        service.delete_recipient(&r.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_alert_config_is_a_singleton() {
        let service = service();
        assert!(service.alert_config().await.unwrap().is_none());

        let first = service
            .save_alert_config(AlertConfig {
                resolve_timeout: "5m".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let second = service
            .save_alert_config(AlertConfig {
                resolve_timeout: "10m".to_string(),
                email_config: EmailConfig {
                    smtp_smart_host: "smtp:25".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(service.store().list(Kind::AlertConfig).await.unwrap().len(), 1);
        let stored = service.alert_config().await.unwrap().unwrap();
        assert_eq!(stored.resolve_timeout, "10m");
    }

    #[tokio::test]
    async fn test_malformed_payload_fails_listing() {
        let service = service();
        service
            .store()
            .create(Kind::Alert, "bad", "not json".to_string())
            .await
            .unwrap();
        assert!(service.list_alerts(None).await.is_err());
    }
}
