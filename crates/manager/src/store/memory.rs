use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    model::Kind,
    store::{ObjectStore, StoredObject},
    Error, Result,
};

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<(Kind, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn list(&self, kind: Kind) -> Result<Vec<StoredObject>> {
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|((k, id), payload)| StoredObject {
                kind: *k,
                id: id.clone(),
                payload: payload.clone(),
            })
            .collect())
    }

    async fn get(&self, kind: Kind, id: &str) -> Result<Option<StoredObject>> {
        let objects = self.objects.read().await;
        Ok(objects
            .get(&(kind, id.to_string()))
            .map(|payload| StoredObject {
                kind,
                id: id.to_string(),
                payload: payload.clone(),
            }))
    }

    async fn create(&self, kind: Kind, id: &str, payload: String) -> Result<()> {
        debug!("Creating {} {}", kind, id);
        let mut objects = self.objects.write().await;
        let key = (kind, id.to_string());
        if objects.contains_key(&key) {
            return Err(Error::Conflict(format!("{} {} already exists", kind, id)));
        }
        objects.insert(key, payload);
        Ok(())
    }

    async fn update(&self, kind: Kind, id: &str, payload: String) -> Result<()> {
        debug!("Updating {} {}", kind, id);
        let mut objects = self.objects.write().await;
        match objects.get_mut(&(kind, id.to_string())) {
            Some(existing) => {
                *existing = payload;
                Ok(())
            }
            None => Err(Error::NotFound(format!("{} {}", kind, id))),
        }
    }

    async fn delete(&self, kind: Kind, id: &str) -> Result<()> {
        debug!("Deleting {} {}", kind, id);
        let mut objects = self.objects.write().await;
        objects
            .remove(&(kind, id.to_string()))
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("{} {}", kind, id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_is_scoped_by_kind_and_ordered() {
        let store = MemoryStore::new();
        store.create(Kind::Alert, "b", "{}".into()).await.unwrap();
        store.create(Kind::Alert, "a", "{}".into()).await.unwrap();
        store.create(Kind::Recipient, "c", "{}".into()).await.unwrap();

        let ids: Vec<String> = store
            .list(Kind::Alert)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let store = MemoryStore::new();
        store.create(Kind::Alert, "a", "1".into()).await.unwrap();
        assert!(matches!(
            store.create(Kind::Alert, "a", "2".into()).await,
            Err(Error::Conflict(_))
        ));

        store.update(Kind::Alert, "a", "3".into()).await.unwrap();
        assert_eq!(store.get(Kind::Alert, "a").await.unwrap().unwrap().payload, "3");

        store.delete(Kind::Alert, "a").await.unwrap();
        assert!(store.get(Kind::Alert, "a").await.unwrap().is_none());
        assert!(matches!(
            store.update(Kind::Alert, "a", "4".into()).await,
            Err(Error::NotFound(_))
        ));
    }
}
