use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::models::cloud::{CloudDocument, UploadReceipt};
use crate::models::document::Document;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CloudError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("this account may not access that document")]
    Forbidden,
    #[error("no cloud copy exists yet")]
    NotFound,
    #[error("network error: {0}")]
    Network(String),
    #[error("cloud backend error: {0}")]
    Backend(String),
    #[error("another cloud operation is still running")]
    Busy,
}

/// Whole-document storage keyed by user id. Every write is an unconditional
/// overwrite; there is no merge.
pub trait CloudStore: Send + Sync {
    /// Replaces the user's record and returns the new `lastUpdated`, which is
    /// strictly later than any earlier value for the same user.
    fn upload(
        &self,
        user_id: &str,
        doc: &Document,
    ) -> impl Future<Output = Result<UploadReceipt, CloudError>> + Send;

    fn download(&self, user_id: &str)
        -> impl Future<Output = Result<CloudDocument, CloudError>> + Send;

    fn last_updated(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, CloudError>> + Send;
}

/// Next write time for a record: now, nudged forward if the clock has not
/// moved past the previous write.
pub fn next_write_time(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev + Duration::milliseconds(1),
        _ => now,
    }
}

#[derive(Clone, Default)]
pub struct MemoryCloudStore {
    records: Arc<Mutex<HashMap<String, CloudDocument>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryCloudStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates lost connectivity: every call fails with `Network`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), CloudError> {
        if self.is_offline() {
            return Err(CloudError::Network("connection refused".into()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CloudDocument>>, CloudError> {
        self.records
            .lock()
            .map_err(|_| CloudError::Backend("record store poisoned".into()))
    }
}

impl CloudStore for MemoryCloudStore {
    async fn upload(&self, user_id: &str, doc: &Document) -> Result<UploadReceipt, CloudError> {
        self.check_online()?;
        let mut records = self.lock()?;
        let previous = records.get(user_id).map(|r| r.last_updated);
        let last_updated = next_write_time(previous, Utc::now());
        records.insert(
            user_id.to_string(),
            CloudDocument {
                document: doc.clone(),
                last_updated,
            },
        );
        Ok(UploadReceipt {
            last_updated,
            content_hash: doc.fingerprint(),
        })
    }

    async fn download(&self, user_id: &str) -> Result<CloudDocument, CloudError> {
        self.check_online()?;
        self.lock()?.get(user_id).cloned().ok_or(CloudError::NotFound)
    }

    async fn last_updated(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, CloudError> {
        self.check_online()?;
        Ok(self.lock()?.get(user_id).map(|r| r.last_updated))
    }
}
