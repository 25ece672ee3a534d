use crate::store::{DatabaseConfig, DatabaseType, MemoryStore, ObjectStore, SqliteStore};
use std::sync::Arc;

pub async fn create_store(config: &DatabaseConfig) -> crate::Result<Arc<dyn ObjectStore>> {
    match config.db_type {
        DatabaseType::Memory => Ok(Arc::new(MemoryStore::new())),
        DatabaseType::Sqlite => {
            let path = config
                .sqlite_path
                .as_ref()
                .ok_or_else(|| crate::Error::Config("SQLite path not configured".into()))?
                .to_str()
                .ok_or_else(|| crate::Error::Config("SQLite path is not valid UTF-8".into()))?;
            Ok(Arc::new(SqliteStore::new(path).await?))
        }
    }
}
