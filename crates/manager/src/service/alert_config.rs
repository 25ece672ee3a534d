use super::{new_id, Service, ALERT_CONFIG_KEY};
use crate::{
    model::{AlertConfig, Kind, Resource},
    Error, Result,
};

impl Service {
    /// The singleton notification settings, if they have been saved.
    pub async fn alert_config(&self) -> Result<Option<AlertConfig>> {
        match self.store.get(Kind::AlertConfig, ALERT_CONFIG_KEY).await? {
            Some(object) => match Resource::decode(Kind::AlertConfig, &object.payload)? {
                Resource::AlertConfig(c) => Ok(Some(c)),
                _ => Err(Error::Store("alert config payload has wrong kind".to_string())),
            },
            None => Ok(None),
        }
    }

    /// Creates the singleton on first save and replaces it afterwards.
    pub async fn save_alert_config(&self, mut config: AlertConfig) -> Result<AlertConfig> {
        let existing = self.alert_config().await?;
        if config.id.is_empty() {
            config.id = existing
                .as_ref()
                .map(|c| c.id.clone())
                .unwrap_or_else(new_id);
        }

        let payload = Resource::AlertConfig(config.clone()).encode()?;
        match existing {
            Some(_) => {
                self.store
                    .update(Kind::AlertConfig, ALERT_CONFIG_KEY, payload)
                    .await?
            }
            None => {
                self.store
                    .create(Kind::AlertConfig, ALERT_CONFIG_KEY, payload)
                    .await?
            }
        }
        Ok(config)
    }
}
