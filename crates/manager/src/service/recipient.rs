use super::{new_id, Service};
use crate::{
    model::{Kind, Recipient, Resource},
    Error, Result,
};

impl Service {
    pub async fn list_recipients(&self, environment: Option<&str>) -> Result<Vec<Recipient>> {
        let recipients = self
            .list_resources(Kind::Recipient)
            .await?
            .into_iter()
            .filter_map(|r| match r {
                Resource::Recipient(r) => Some(r),
                _ => None,
            })
            .filter(|r| environment.map_or(true, |env| r.environment == env))
            .collect();
        Ok(recipients)
    }

    pub async fn get_recipient(&self, id: &str) -> Result<Recipient> {
        match self.get_resource(Kind::Recipient, id).await? {
            Resource::Recipient(r) => Ok(r),
            _ => Err(Error::Store(format!("object {} is not a recipient", id))),
        }
    }

    pub async fn create_recipient(&self, mut recipient: Recipient) -> Result<Recipient> {
        recipient.id = new_id();
        let payload = Resource::Recipient(recipient.clone()).encode()?;
        self.store.create(Kind::Recipient, &recipient.id, payload).await?;
        Ok(recipient)
    }

    pub async fn update_recipient(&self, recipient: &Recipient) -> Result<()> {
        let payload = Resource::Recipient(recipient.clone()).encode()?;
        self.store.update(Kind::Recipient, &recipient.id, payload).await
    }

    /// Rejected while any alert still routes to the recipient.
    pub async fn delete_recipient(&self, id: &str) -> Result<Recipient> {
        let recipient = self.get_recipient(id).await?;
        let referenced = self
            .list_alerts(None)
            .await?
            .iter()
            .any(|a| a.recipient_id == id);
        if referenced {
            return Err(Error::Validation(format!(
                "recipient {} is still used by an alert",
                id
            )));
        }
        self.store.delete(Kind::Recipient, id).await?;
        Ok(recipient)
    }
}
