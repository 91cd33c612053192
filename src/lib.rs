pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use models::cloud::{CloudDocument, UploadReceipt};
use models::document::Document;
use services::cloud_pg::PgCloudStore;
use services::cloud_store::{CloudError, CloudStore, MemoryCloudStore};

/// Where the sync API keeps documents.
#[derive(Clone)]
pub enum CloudBackend {
    /// Lost on restart. For local development and tests.
    Memory(MemoryCloudStore),
    Postgres(PgCloudStore),
}

impl CloudBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            CloudBackend::Memory(_) => "memory",
            CloudBackend::Postgres(_) => "postgres",
        }
    }

    /// Probes the storage behind the API.
    pub async fn health(&self) -> Result<(), String> {
        match self {
            CloudBackend::Memory(store) if store.is_offline() => Err("offline".into()),
            CloudBackend::Memory(_) => Ok(()),
            CloudBackend::Postgres(store) => sqlx::query("SELECT 1")
                .execute(store.pool())
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
        }
    }
}

impl CloudStore for CloudBackend {
    async fn upload(&self, user_id: &str, doc: &Document) -> Result<UploadReceipt, CloudError> {
        match self {
            CloudBackend::Memory(store) => store.upload(user_id, doc).await,
            CloudBackend::Postgres(store) => store.upload(user_id, doc).await,
        }
    }

    async fn download(&self, user_id: &str) -> Result<CloudDocument, CloudError> {
        match self {
            CloudBackend::Memory(store) => store.download(user_id).await,
            CloudBackend::Postgres(store) => store.download(user_id).await,
        }
    }

    async fn last_updated(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, CloudError> {
        match self {
            CloudBackend::Memory(store) => store.last_updated(user_id).await,
            CloudBackend::Postgres(store) => store.last_updated(user_id).await,
        }
    }
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: CloudBackend,
    pub jwt_secret: Arc<String>,
}

impl AppState {
    pub fn new(store: CloudBackend, jwt_secret: String) -> Self {
        Self {
            store,
            jwt_secret: Arc::new(jwt_secret),
        }
    }
}
