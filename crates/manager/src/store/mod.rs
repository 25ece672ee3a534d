mod config;
mod factory;
mod memory;
mod sqlite;

pub use config::{DatabaseConfig, DatabaseType};
pub use factory::create_store;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::model::Kind;

/// A persisted domain object in its opaque form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: Kind,
    pub id: String,
    pub payload: String,
}

/// Key/value access to domain objects addressed by kind and id.
///
/// `list` returns objects ordered by id. `create` fails with `Conflict` when the
/// key exists; `update` and `delete` fail with `NotFound` when it does not.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    // Initialize schema, if the backend has one
    async fn init(&self) -> crate::Result<()>;

    async fn list(&self, kind: Kind) -> crate::Result<Vec<StoredObject>>;
    async fn get(&self, kind: Kind, id: &str) -> crate::Result<Option<StoredObject>>;
    async fn create(&self, kind: Kind, id: &str, payload: String) -> crate::Result<()>;
    async fn update(&self, kind: Kind, id: &str, payload: String) -> crate::Result<()>;
    async fn delete(&self, kind: Kind, id: &str) -> crate::Result<()>;
}
