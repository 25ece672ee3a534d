use tracing::debug;

use super::{new_id, Service};
use crate::{
    model::{Alert, AlertState, Kind, Resource},
    Error, Result,
};

impl Service {
    /// Lists alerts ordered by id, optionally restricted to one environment.
    pub async fn list_alerts(&self, environment: Option<&str>) -> Result<Vec<Alert>> {
        let alerts = self
            .list_resources(Kind::Alert)
            .await?
            .into_iter()
            .filter_map(|r| match r {
                Resource::Alert(a) => Some(a),
                _ => None,
            })
            .filter(|a| environment.map_or(true, |env| a.environment == env))
            .collect();
        Ok(alerts)
    }

    pub async fn get_alert(&self, id: &str) -> Result<Alert> {
        match self.get_resource(Kind::Alert, id).await? {
            Resource::Alert(a) => Ok(a),
            _ => Err(Error::Store(format!("object {} is not an alert", id))),
        }
    }

    /// Persists a new alert under a fresh id. New alerts always start enabled.
    pub async fn create_alert(&self, mut alert: Alert) -> Result<Alert> {
        alert.id = new_id();
        alert.state = AlertState::Enabled;
        alert.starts_at = None;
        alert.ends_at = None;

        let payload = Resource::Alert(alert.clone()).encode()?;
        self.store.create(Kind::Alert, &alert.id, payload).await?;
        debug!("Created alert {}", alert.id);
        Ok(alert)
    }

    pub async fn update_alert(&self, alert: &Alert) -> Result<()> {
        let payload = Resource::Alert(alert.clone()).encode()?;
        self.store.update(Kind::Alert, &alert.id, payload).await
    }

    /// Only disabled alerts may be deleted.
    pub async fn delete_alert(&self, id: &str) -> Result<Alert> {
        let alert = self.get_alert(id).await?;
        if alert.state != AlertState::Disabled {
            return Err(Error::InvalidTransition(
                "current state is not disabled, can not perform delete".to_string(),
            ));
        }
        self.store.delete(Kind::Alert, id).await?;
        Ok(alert)
    }
}
