// Postgres persistence: one JSONB row per document.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;

use waypoint_common::error::{StoreError, StoreResult};

use crate::document::{Document, DocumentStore};

pub struct PgDocumentStore {
    pool: PgPool,
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url).await.map_err(db_err)?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Document>> {
        let row = sqlx::query_scalar::<_, Json<Document>>(
            "SELECT body FROM documents WHERE collection = $1 AND key = $2",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|Json(doc)| doc))
    }

    async fn set(
        &self,
        collection: &str,
        key: &str,
        fields: Document,
        merge: bool,
    ) -> StoreResult<()> {
        // `||` on jsonb is a shallow merge, right side wins.
        sqlx::query(
            r#"
            INSERT INTO documents (collection, key, body, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (collection, key) DO UPDATE SET
                body = CASE WHEN $4 THEN documents.body || EXCLUDED.body ELSE EXCLUDED.body END,
                updated_at = now()
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(Value::Object(fields))
        .bind(merge)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<(String, Document)>> {
        let rows = sqlx::query_as::<_, (String, Json<Document>)>(
            "SELECT key, body FROM documents WHERE collection = $1 ORDER BY key",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|(key, Json(doc))| (key, doc)).collect())
    }

    async fn delete(&self, collection: &str, key: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND key = $2")
            .bind(collection)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self, collection: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1")
            .bind(collection)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected())
    }
}
