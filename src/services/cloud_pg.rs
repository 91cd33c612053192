use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::cloud::{CloudDocument, UploadReceipt};
use crate::models::document::Document;
use crate::services::cloud_store::{CloudError, CloudStore};

/// Server-side store: one `cloud_documents` row per user.
#[derive(Clone)]
pub struct PgCloudStore {
    pool: PgPool,
}

impl PgCloudStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_error(e: sqlx::Error) -> CloudError {
    tracing::error!("cloud_documents query failed: {}", e);
    CloudError::Backend(e.to_string())
}

impl CloudStore for PgCloudStore {
    async fn upload(&self, user_id: &str, doc: &Document) -> Result<UploadReceipt, CloudError> {
        let content_hash = doc.fingerprint();
        let last_updated: DateTime<Utc> = sqlx::query_scalar(
            "INSERT INTO cloud_documents (user_id, data, content_hash, last_updated)
             VALUES ($1, $2, $3, clock_timestamp())
             ON CONFLICT (user_id) DO UPDATE
             SET data = EXCLUDED.data,
                 content_hash = EXCLUDED.content_hash,
                 last_updated = GREATEST(
                     EXCLUDED.last_updated,
                     cloud_documents.last_updated + INTERVAL '1 millisecond'
                 )
             RETURNING last_updated",
        )
        .bind(user_id)
        .bind(Json(doc))
        .bind(&content_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(UploadReceipt {
            last_updated,
            content_hash,
        })
    }

    async fn download(&self, user_id: &str) -> Result<CloudDocument, CloudError> {
        let row: Option<(Json<Document>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT data, last_updated FROM cloud_documents WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let (Json(document), last_updated) = row.ok_or(CloudError::NotFound)?;
        Ok(CloudDocument {
            document,
            last_updated,
        })
    }

    async fn last_updated(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, CloudError> {
        sqlx::query_scalar("SELECT last_updated FROM cloud_documents WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)
    }
}
