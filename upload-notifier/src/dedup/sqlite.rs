use crate::dedup::validate_item_id;
use crate::traits::DedupStore;
use crate::types::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::debug;

/// Dedup set kept in a SQLite table.
pub struct SqliteDedupStore {
    db: Pool<Sqlite>,
}

impl SqliteDedupStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notified_items (
                item_id TEXT PRIMARY KEY NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await?;

        debug!("SQLite dedup store ready at {}", path.as_ref().display());
        Ok(Self { db })
    }
}

#[async_trait]
impl DedupStore for SqliteDedupStore {
    async fn contains(&self, item_id: &str) -> Result<bool> {
        let row: Option<i64> = sqlx::query_scalar("SELECT 1 FROM notified_items WHERE item_id = ?")
            .bind(item_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.is_some())
    }

    async fn record(&self, item_id: &str) -> Result<()> {
        validate_item_id(item_id)?;
        sqlx::query(
            r#"
            INSERT INTO notified_items (item_id, recorded_at)
            VALUES (?, ?)
            ON CONFLICT (item_id) DO NOTHING
            "#,
        )
        .bind(item_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notified_items")
            .fetch_one(&self.db)
            .await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_are_durable_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dedup.db");

        {
            let store = SqliteDedupStore::open(&path).await.unwrap();
            store.record("v1").await.unwrap();
            store.record("v1").await.unwrap();
            assert_eq!(store.len().await.unwrap(), 1);
        }

        let reopened = SqliteDedupStore::open(&path).await.unwrap();
        assert!(reopened.contains("v1").await.unwrap());
        assert!(!reopened.contains("v2").await.unwrap());
    }
}
