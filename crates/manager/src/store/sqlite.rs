use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use tracing::{debug, error, info};

use crate::{
    model::Kind,
    store::{ObjectStore, StoredObject},
    Error, Result,
};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(path: &str) -> Result<Self> {
        info!("Connecting to SQLite database: {}", path);

        // An in-memory database lives and dies with its connection, so the pool
        // must never hold more than one.
        let (options, max_connections) = if path == ":memory:" {
            (SqliteConnectOptions::from_str("sqlite::memory:")?, 1)
        } else {
            (
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true),
                5,
            )
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to connect to SQLite: {}", e);
                Error::Sqlx(e)
            })?;

        Ok(Self { pool })
    }

    fn row_to_object(row: &sqlx::sqlite::SqliteRow) -> Result<StoredObject> {
        Ok(StoredObject {
            kind: row.get::<String, _>("kind").parse()?,
            id: row.get("id"),
            payload: row.get("data"),
        })
    }
}

#[async_trait]
impl ObjectStore for SqliteStore {
    async fn init(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                Error::Store(e.to_string())
            })?;

        Ok(())
    }

    async fn list(&self, kind: Kind) -> Result<Vec<StoredObject>> {
        debug!("Listing {} objects", kind);

        let rows = sqlx::query("SELECT kind, id, data FROM objects WHERE kind = ?1 ORDER BY id")
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_object).collect()
    }

    async fn get(&self, kind: Kind, id: &str) -> Result<Option<StoredObject>> {
        debug!("Getting {}: {}", kind, id);

        let row = sqlx::query("SELECT kind, id, data FROM objects WHERE kind = ?1 AND id = ?2")
            .bind(kind.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_object).transpose()
    }

    async fn create(&self, kind: Kind, id: &str, payload: String) -> Result<()> {
        debug!("Creating {}: {}", kind, id);

        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO objects (kind, id, data, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
        )
        .bind(kind.as_str())
        .bind(id)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(Error::Conflict(format!("{} {} already exists", kind, id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, kind: Kind, id: &str, payload: String) -> Result<()> {
        debug!("Updating {}: {}", kind, id);

        let result = sqlx::query(
            "UPDATE objects SET data = ?1, updated_at = ?2 WHERE kind = ?3 AND id = ?4",
        )
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .bind(kind.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("{} {}", kind, id)));
        }
        Ok(())
    }

    async fn delete(&self, kind: Kind, id: &str) -> Result<()> {
        debug!("Deleting {}: {}", kind, id);

        let result = sqlx::query("DELETE FROM objects WHERE kind = ?1 AND id = ?2")
            .bind(kind.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("{} {}", kind, id)));
        }
        Ok(())
    }
}
