//! Local-first sync coordination.
//!
//! The coordinator owns the in-memory document. Reads go through accessors
//! and writes through intents, each of which schedules a debounced local
//! save. Cloud upload and download are manual, confirmed, whole-document
//! overwrites. Nothing here merges; whichever side is written last wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use crate::models::document::Document;
use crate::models::editor::{DocumentEditor, DocumentError};
use crate::services::cloud_store::{CloudError, CloudStore};
use crate::services::debounce::PendingWrite;
use crate::services::local_store::{LocalPersistence, LocalStoreError};
use crate::services::session::AuthSession;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Success,
    Error,
}

/// A line of feedback for the user. Every persistence or sync failure ends
/// up here instead of propagating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
}

impl StatusMessage {
    fn info(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Info,
            text: text.into(),
        }
    }

    fn success(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Success,
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAction {
    Upload,
    Download,
    ResetAll,
}

/// What the user is asked before a destructive or outward-facing action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub action: ConfirmAction,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Uploaded {
        last_updated: DateTime<Utc>,
    },
    /// The local document was replaced. Views must reload from scratch.
    Downloaded {
        last_updated: DateTime<Utc>,
        reload_generation: u64,
    },
    NoCloudCopy,
    Reset {
        reload_generation: u64,
    },
    Declined,
    Failed(CloudError),
    /// Local storage could not be erased; the document was left as it was.
    ResetFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub status: StatusMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Ready,
}

struct Inner {
    phase: Phase,
    document: Document,
    pending: PendingWrite,
    last_cloud_sync: Option<DateTime<Utc>>,
    reload_generation: u64,
    status: Option<StatusMessage>,
}

pub struct SyncCoordinator<L, C> {
    local: Arc<L>,
    cloud: C,
    auth: AuthSession,
    inner: Mutex<Inner>,
    /// Serializes writes to local storage. Never taken while `inner` is held.
    save_lock: tokio::sync::Mutex<()>,
    changed: Notify,
    cloud_op: AtomicU64,
    next_ticket: AtomicU64,
    loaded_from: Option<&'static str>,
}

/// Clears the in-flight marker when a cloud operation ends, unless the
/// marker was reset and taken by a newer operation meanwhile.
struct CloudTicket<'a> {
    slot: &'a AtomicU64,
    ticket: u64,
}

impl Drop for CloudTicket<'_> {
    fn drop(&mut self) {
        let _ = self
            .slot
            .compare_exchange(self.ticket, 0, Ordering::SeqCst, Ordering::SeqCst);
    }
}

impl<L, C> SyncCoordinator<L, C>
where
    L: LocalPersistence + 'static,
    C: CloudStore,
{
    /// Uninitialized → Ready. Loads the local document or starts empty.
    pub fn open(local: L, cloud: C, auth: AuthSession, quiet: Duration) -> Self {
        let mut inner = Inner {
            phase: Phase::Uninitialized,
            document: Document::default(),
            pending: PendingWrite::new(quiet),
            last_cloud_sync: None,
            reload_generation: 0,
            status: None,
        };

        let loaded = local.load();
        let loaded_from = loaded.as_ref().map(|l| l.source);
        match loaded {
            Some(loaded) => {
                tracing::info!(
                    "Opened document from {} ({} students)",
                    loaded.source,
                    loaded.document.students.len()
                );
                inner.document = loaded.document;
            }
            None => {
                tracing::info!("No local document found, starting empty");
                inner.document = Document::empty_today();
            }
        }

        // Data that came from the legacy keys moves to the structured file now.
        if loaded_from == Some("legacy-keys") {
            match local.save(&inner.document) {
                Ok(()) => tracing::info!("Migrated legacy keys to the structured file"),
                Err(e) => {
                    tracing::warn!("Legacy migration save failed, will retry on next edit: {}", e);
                    inner.pending.schedule(Instant::now());
                    let generation = inner.pending.generation();
                    inner.pending.mark_failed(generation);
                }
            }
        }
        inner.phase = Phase::Ready;

        Self {
            local: Arc::new(local),
            cloud,
            auth,
            inner: Mutex::new(inner),
            save_lock: tokio::sync::Mutex::new(()),
            changed: Notify::new(),
            cloud_op: AtomicU64::new(0),
            next_ticket: AtomicU64::new(1),
            loaded_from,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic inside an intent closure must not brick the session.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Which loader produced the startup document, if any.
    pub fn loaded_from(&self) -> Option<&'static str> {
        self.loaded_from
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn read<T>(&self, f: impl FnOnce(&Document) -> T) -> T {
        f(&self.lock().document)
    }

    pub fn snapshot(&self) -> Document {
        self.lock().document.clone()
    }

    pub fn fingerprint(&self) -> String {
        self.lock().document.fingerprint()
    }

    pub fn last_cloud_sync(&self) -> Option<DateTime<Utc>> {
        self.lock().last_cloud_sync
    }

    pub fn reload_generation(&self) -> u64 {
        self.lock().reload_generation
    }

    pub fn last_status(&self) -> Option<StatusMessage> {
        self.lock().status.clone()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.lock().pending.is_dirty()
    }

    pub fn next_save_deadline(&self) -> Option<Instant> {
        self.lock().pending.deadline()
    }

    /// Runs one intent against a draft copy. Nothing changes on error; on
    /// success the draft becomes the document and a save is scheduled.
    pub fn apply<T>(
        &self,
        intent: impl FnOnce(&mut DocumentEditor<'_>) -> Result<T, DocumentError>,
    ) -> Result<T, DocumentError> {
        let mut inner = self.lock();
        let mut draft = inner.document.clone();
        let value = intent(&mut DocumentEditor::new(&mut draft))?;
        inner.document = draft;
        inner.pending.schedule(Instant::now());
        drop(inner);
        self.changed.notify_one();
        Ok(value)
    }

    /// Writes if the quiet period has elapsed. Returns whether a write happened.
    pub async fn flush_due(&self) -> Result<bool, LocalStoreError> {
        self.write_if(|pending| pending.take_due(Instant::now())).await
    }

    /// Writes now if anything is unsaved.
    pub async fn flush(&self) -> Result<bool, LocalStoreError> {
        self.write_if(PendingWrite::take_dirty).await
    }

    /// The snapshot is taken after `save_lock` is acquired, so an older
    /// snapshot never lands on disk after a newer one. The document lock is
    /// held only for the clone; intents keep running during the write.
    async fn write_if(
        &self,
        take: impl FnOnce(&mut PendingWrite) -> bool,
    ) -> Result<bool, LocalStoreError> {
        let _serial = self.save_lock.lock().await;
        let (snapshot, generation, burst) = {
            let mut inner = self.lock();
            if !take(&mut inner.pending) {
                return Ok(false);
            }
            (
                inner.document.clone(),
                inner.pending.generation(),
                inner.pending.burst_len(),
            )
        };

        let local = Arc::clone(&self.local);
        let result = tokio::task::spawn_blocking(move || local.save(&snapshot))
            .await
            .unwrap_or_else(|e| Err(LocalStoreError::Io(std::io::Error::other(e))));

        let mut inner = self.lock();
        match result {
            Ok(()) => {
                inner.pending.mark_saved(generation);
                tracing::debug!("Saved document ({} edits collapsed)", burst);
                Ok(true)
            }
            Err(e) => {
                inner.pending.mark_failed(generation);
                tracing::warn!("Local save failed, will retry on next edit: {}", e);
                inner.status = Some(StatusMessage::error(format!(
                    "Could not save on this device: {e}"
                )));
                Err(e)
            }
        }
    }

    fn begin_cloud(&self) -> Option<CloudTicket<'_>> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        self.cloud_op
            .compare_exchange(0, ticket, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| CloudTicket {
                slot: &self.cloud_op,
                ticket,
            })
    }

    pub fn cloud_in_flight(&self) -> bool {
        self.cloud_op.load(Ordering::SeqCst) != 0
    }

    /// Manual escape hatch for a cloud call that never came back.
    pub fn reset_loading_state(&self) {
        if self.cloud_op.swap(0, Ordering::SeqCst) != 0 {
            tracing::warn!("Cloud in-flight flag reset by user");
        }
    }

    fn finish(&self, outcome: SyncOutcome, status: StatusMessage) -> SyncReport {
        match status.kind {
            StatusKind::Error => tracing::warn!("{}", status.text),
            _ => tracing::info!("{}", status.text),
        }
        self.lock().status = Some(status.clone());
        SyncReport { outcome, status }
    }

    fn failed(&self, error: CloudError) -> SyncReport {
        let text = match &error {
            CloudError::Unauthenticated => "Sign in to use cloud sync.".to_string(),
            CloudError::Busy => "A cloud operation is already running.".to_string(),
            CloudError::Network(_) => {
                format!("{error}. Your local data is unchanged; try again when online.")
            }
            other => format!("Cloud sync failed: {other}. Your local data is unchanged."),
        };
        self.finish(SyncOutcome::Failed(error), StatusMessage::error(text))
    }

    /// Overwrites the cloud copy with the local document.
    pub async fn upload(&self, confirm: impl FnOnce(&ConfirmRequest) -> bool) -> SyncReport {
        let Some(identity) = self.auth.current() else {
            return self.failed(CloudError::Unauthenticated);
        };
        let Some(_ticket) = self.begin_cloud() else {
            return self.failed(CloudError::Busy);
        };
        let request = ConfirmRequest {
            action: ConfirmAction::Upload,
            prompt: format!(
                "Replace the cloud copy for {} with the data on this device?",
                identity.display_name()
            ),
        };
        if !confirm(&request) {
            return self.finish(SyncOutcome::Declined, StatusMessage::info("Upload cancelled."));
        }

        let snapshot = self.snapshot();
        match self.cloud.upload(&identity.user_id, &snapshot).await {
            Ok(receipt) => {
                self.lock().last_cloud_sync = Some(receipt.last_updated);
                self.finish(
                    SyncOutcome::Uploaded {
                        last_updated: receipt.last_updated,
                    },
                    StatusMessage::success(format!(
                        "Uploaded {} students to the cloud.",
                        snapshot.students.len()
                    )),
                )
            }
            Err(e) => self.failed(e),
        }
    }

    /// Overwrites the local document with the cloud copy.
    pub async fn download(&self, confirm: impl FnOnce(&ConfirmRequest) -> bool) -> SyncReport {
        let Some(identity) = self.auth.current() else {
            return self.failed(CloudError::Unauthenticated);
        };
        let Some(_ticket) = self.begin_cloud() else {
            return self.failed(CloudError::Busy);
        };
        let request = ConfirmRequest {
            action: ConfirmAction::Download,
            prompt: format!(
                "Replace ALL data on this device with the cloud copy for {}? Unsynced local changes will be lost.",
                identity.display_name()
            ),
        };
        if !confirm(&request) {
            return self.finish(SyncOutcome::Declined, StatusMessage::info("Download cancelled."));
        }

        let record = match self.cloud.download(&identity.user_id).await {
            Ok(record) => record,
            Err(CloudError::NotFound) => {
                return self.finish(
                    SyncOutcome::NoCloudCopy,
                    StatusMessage::info("There is no cloud copy for this account yet."),
                );
            }
            Err(e) => return self.failed(e),
        };

        let reload_generation = {
            let mut inner = self.lock();
            inner.document = record.document;
            inner.pending.schedule(Instant::now());
            inner.last_cloud_sync = Some(record.last_updated);
            inner.reload_generation += 1;
            inner.reload_generation
        };
        let status = match self.flush().await {
            Ok(_) => StatusMessage::success("Downloaded the cloud copy. Reloading."),
            // The downloaded data stays dirty and is retried on the next flush.
            Err(e) => StatusMessage::error(format!(
                "Downloaded the cloud copy, but it could not be saved on this device: {e}"
            )),
        };
        self.finish(
            SyncOutcome::Downloaded {
                last_updated: record.last_updated,
                reload_generation,
            },
            status,
        )
    }

    /// `lastUpdated` of the user's cloud copy, for display.
    pub async fn cloud_last_updated(&self) -> Result<Option<DateTime<Utc>>, CloudError> {
        let identity = self.auth.current().ok_or(CloudError::Unauthenticated)?;
        self.cloud.last_updated(&identity.user_id).await
    }

    /// Last-resort recovery: wipe local storage and start from an empty document.
    pub async fn reset_all(&self, confirm: impl FnOnce(&ConfirmRequest) -> bool) -> SyncReport {
        let request = ConfirmRequest {
            action: ConfirmAction::ResetAll,
            prompt: "Erase ALL data stored on this device? This cannot be undone.".into(),
        };
        if !confirm(&request) {
            return self.finish(SyncOutcome::Declined, StatusMessage::info("Reset cancelled."));
        }

        // No save may land between the clear and the in-memory reset.
        let _serial = self.save_lock.lock().await;
        let local = Arc::clone(&self.local);
        let cleared = tokio::task::spawn_blocking(move || local.clear())
            .await
            .unwrap_or_else(|e| Err(LocalStoreError::Io(std::io::Error::other(e))));

        if let Err(e) = cleared {
            tracing::error!("Reset could not clear local storage: {}", e);
            // A partial clear may have removed the structured file; the next
            // flush writes the current document back.
            self.lock().pending.schedule(Instant::now());
            self.changed.notify_one();
            return self.finish(
                SyncOutcome::ResetFailed(e.to_string()),
                StatusMessage::error(format!(
                    "Could not erase local data: {e}. Your data was kept."
                )),
            );
        }

        let reload_generation = {
            let mut inner = self.lock();
            inner.document = Document::empty_today();
            inner.pending.cancel();
            inner.last_cloud_sync = None;
            inner.reload_generation += 1;
            inner.reload_generation
        };

        self.finish(
            SyncOutcome::Reset { reload_generation },
            StatusMessage::info("All local data was erased."),
        )
    }
}

impl<L, C> SyncCoordinator<L, C>
where
    L: LocalPersistence + 'static,
    C: CloudStore + 'static,
{
    /// Drives the debounced save on a tokio task. Abort the handle to stop it.
    pub fn spawn_autosave(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match this.next_save_deadline() {
                    None => this.changed.notified().await,
                    Some(deadline) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(deadline) => {
                                // Failures are reported through the status line.
                                let _ = this.flush_due().await;
                            }
                            _ = this.changed.notified() => {}
                        }
                    }
                }
            }
        })
    }
}
