//! Local-first evaluation session with best-effort remote mirroring.
//!
//! # Responsibility
//! - Validate submissions before any store mutation.
//! - Write locally first, then attempt exactly one remote create.
//! - Delete remotely first, then locally, only when the remote call succeeds.
//! - Hydrate the local collection from the remote collection at startup.
//! - Emit one user-facing notification per outcome.
//!
//! # Invariants
//! - The store lock is never held across a remote call.
//! - Remote failures never roll back or block local state.
//! - At most one delete is in flight per session.

use crate::model::entry::{EntryId, EntryPatch, EvaluationEntry, MirrorState, NewEntry};
use crate::repo::kv_repo::KeyValueStore;
use crate::service::entry_store::EntryStore;
use crate::sync::remote_mirror::{MirrorError, RemoteMirror, RemoteRecord};
use chrono::Local;
use log::{info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

/// Transient, dismissable message for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
        }
    }
}

/// Result of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Stored locally; no remote mirror is configured.
    LocalOnly(EvaluationEntry),
    /// Stored locally and mirrored; the entry carries its remote id.
    Mirrored(EvaluationEntry),
    /// Stored locally; the remote write failed and will not be retried.
    MirrorFailed {
        entry: EvaluationEntry,
        error: MirrorError,
    },
    /// The remote write succeeded after the entry had been deleted locally,
    /// leaving a remote document with no local counterpart.
    OrphanedRemote { entry_id: EntryId, remote_id: String },
}

/// Submission rejected before any mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    MissingEvaluatorName,
}

impl Display for SubmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEvaluatorName => write!(f, "evaluator name is required"),
        }
    }
}

impl Error for SubmitError {}

/// Delete failure; the local entry is left untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteError {
    NotFound(EntryId),
    /// Another delete is still waiting for the remote mirror.
    InProgress(EntryId),
    Mirror(MirrorError),
}

impl Display for DeleteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "entry not found: {id}"),
            Self::InProgress(id) => write!(f, "delete already in progress for entry {id}"),
            Self::Mirror(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DeleteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Mirror(err) => Some(err),
            _ => None,
        }
    }
}

/// Counts from one remote hydration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrateReport {
    pub imported: usize,
    pub already_present: usize,
    /// Remote documents that could not be decoded.
    pub rejected: usize,
}

/// Session owning the entry store and the optional remote mirror.
pub struct EvaluationSession<K: KeyValueStore> {
    store: Arc<Mutex<EntryStore<K>>>,
    mirror: Option<Arc<dyn RemoteMirror>>,
    notify_tx: flume::Sender<Notification>,
    notify_rx: flume::Receiver<Notification>,
    deleting: Mutex<Option<EntryId>>,
}

impl<K: KeyValueStore> EvaluationSession<K> {
    /// Creates a session; `mirror = None` runs in local-only mode.
    pub fn new(store: EntryStore<K>, mirror: Option<Arc<dyn RemoteMirror>>) -> Self {
        let (notify_tx, notify_rx) = flume::unbounded();
        Self {
            store: Arc::new(Mutex::new(store)),
            mirror,
            notify_tx,
            notify_rx,
            deleting: Mutex::new(None),
        }
    }

    pub fn has_mirror(&self) -> bool {
        self.mirror.is_some()
    }

    /// Receiver for user-facing notifications; clones share one queue.
    pub fn notifications(&self) -> flume::Receiver<Notification> {
        self.notify_rx.clone()
    }

    /// Runs `f` with exclusive access to the store.
    ///
    /// Must not be called from inside `f`.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut EntryStore<K>) -> R) -> R {
        f(&mut lock(&self.store))
    }

    /// Snapshot of the collection in canonical order.
    pub fn entries(&self) -> Vec<EvaluationEntry> {
        self.with_store(|store| store.entries().to_vec())
    }

    pub fn evaluator_names(&self) -> Vec<String> {
        self.with_store(|store| store.evaluator_names())
    }

    /// Validates, stores locally, then mirrors once.
    ///
    /// # Errors
    /// - `SubmitError::MissingEvaluatorName` when the trimmed name is empty;
    ///   nothing is stored.
    ///
    /// Remote failures are reported through `SubmitOutcome`, not as errors.
    pub async fn submit(&self, input: NewEntry) -> Result<SubmitOutcome, SubmitError> {
        if input.evaluator_name.trim().is_empty() {
            self.notify(Notification::error("Enter the evaluator name."));
            return Err(SubmitError::MissingEvaluatorName);
        }

        let entry = self.with_store(|store| store.add(input));
        info!(
            "event=entry_submit module=service status=stored entry_id={}",
            entry.id
        );

        let Some(mirror) = self.mirror.clone() else {
            self.notify(Notification::success("Saved on this device."));
            return Ok(SubmitOutcome::LocalOnly(entry));
        };

        match mirror.create(&RemoteRecord::from(&entry)).await {
            Ok(remote_id) => {
                let updated = self.with_store(|store| {
                    store.get(&entry.id)?;
                    store.update(&entry.id, EntryPatch::mirrored(remote_id.as_str()));
                    store.get(&entry.id).cloned()
                });
                match updated {
                    Some(updated) => {
                        info!(
                            "event=entry_mirror module=service status=ok mirror={} entry_id={} remote_id={}",
                            mirror.mirror_id(),
                            entry.id,
                            remote_id
                        );
                        self.notify(Notification::success("Saved and backed up remotely."));
                        Ok(SubmitOutcome::Mirrored(updated))
                    }
                    None => {
                        warn!(
                            "event=entry_mirror module=service status=orphaned mirror={} entry_id={} remote_id={}",
                            mirror.mirror_id(),
                            entry.id,
                            remote_id
                        );
                        self.notify(Notification::error(
                            "The entry was deleted before its remote copy was saved.",
                        ));
                        Ok(SubmitOutcome::OrphanedRemote {
                            entry_id: entry.id,
                            remote_id,
                        })
                    }
                }
            }
            Err(error) => {
                warn!(
                    "event=entry_mirror module=service status=error mirror={} entry_id={} error_code={} error={}",
                    mirror.mirror_id(),
                    entry.id,
                    error.code,
                    error
                );
                let failed = self.with_store(|store| {
                    store.update(&entry.id, EntryPatch::mirror_failed(error.to_string()));
                    store.get(&entry.id).cloned()
                });
                self.notify(Notification::error(
                    "Remote backup failed; the entry is saved on this device.",
                ));
                Ok(SubmitOutcome::MirrorFailed {
                    entry: failed.unwrap_or(entry),
                    error,
                })
            }
        }
    }

    /// Deletes remotely (by remote id, else local id), then locally.
    ///
    /// # Errors
    /// - `NotFound` when no local entry has `id`.
    /// - `InProgress` while another delete is waiting on the mirror.
    /// - `Mirror` when the remote delete fails; the local entry is kept.
    pub async fn delete(&self, id: &EntryId) -> Result<(), DeleteError> {
        let remote_key = self
            .with_store(|store| store.get(id).map(|entry| entry.remote_key().to_string()))
            .ok_or_else(|| DeleteError::NotFound(id.clone()))?;
        let _guard = DeleteGuard::acquire(&self.deleting, id)?;

        if let Some(mirror) = &self.mirror {
            if let Err(error) = mirror.delete(&remote_key).await {
                warn!(
                    "event=entry_delete module=service status=error mirror={} entry_id={} error_code={} error={}",
                    mirror.mirror_id(),
                    id,
                    error.code,
                    error
                );
                self.notify(Notification::error("Delete failed."));
                return Err(DeleteError::Mirror(error));
            }
        }

        self.with_store(|store| store.remove(id));
        info!("event=entry_delete module=service status=ok entry_id={id}");
        self.notify(Notification::success("Entry deleted."));
        Ok(())
    }

    /// Imports remote documents missing locally.
    ///
    /// Documents are added oldest first so the newest ends up first in the
    /// collection. A document is already present when its id matches a local
    /// id or remote id.
    ///
    /// Remote timestamps are re-expressed in the local offset, so imported
    /// entries land in the same month bucket as locally created ones.
    pub async fn hydrate_from_remote(&self) -> Result<HydrateReport, MirrorError> {
        let Some(mirror) = self.mirror.clone() else {
            return Ok(HydrateReport::default());
        };

        let listing = mirror.list_all().await.map_err(|error| {
            warn!(
                "event=mirror_hydrate module=service status=error mirror={} error_code={} error={}",
                mirror.mirror_id(),
                error.code,
                error
            );
            error
        })?;

        let mut documents = listing.documents;
        documents.sort_by_key(|document| document.record.created_at);

        let mut report = HydrateReport {
            rejected: listing.rejected.len(),
            ..HydrateReport::default()
        };
        self.with_store(|store| {
            let known = store
                .entries()
                .iter()
                .flat_map(|entry| {
                    std::iter::once(entry.id.as_str().to_string())
                        .chain(entry.remote_id().map(str::to_string))
                })
                .collect::<HashSet<_>>();

            for document in documents {
                if known.contains(&document.remote_id) {
                    report.already_present += 1;
                    continue;
                }
                let record = document.record;
                store.add(NewEntry {
                    evaluator_name: record.evaluator_name,
                    status_adpro: record.status_adpro,
                    status_vaseline: record.status_vaseline,
                    note: record.note,
                    id: Some(EntryId::new(document.remote_id.as_str())),
                    created_at: Some(record.created_at.with_timezone(&Local).fixed_offset()),
                    mirror: MirrorState::Mirrored {
                        remote_id: document.remote_id,
                    },
                });
                report.imported += 1;
            }
        });

        info!(
            "event=mirror_hydrate module=service status=ok mirror={} imported={} already_present={} rejected={}",
            mirror.mirror_id(),
            report.imported,
            report.already_present,
            report.rejected
        );
        Ok(report)
    }

    fn notify(&self, notification: Notification) {
        // The session holds a receiver, so the channel never disconnects.
        let _ = self.notify_tx.send(notification);
    }
}

/// Marks one delete as in flight; released on drop.
struct DeleteGuard<'a> {
    slot: &'a Mutex<Option<EntryId>>,
}

impl<'a> DeleteGuard<'a> {
    fn acquire(slot: &'a Mutex<Option<EntryId>>, id: &EntryId) -> Result<Self, DeleteError> {
        let mut current = lock(slot);
        if let Some(active) = current.as_ref() {
            return Err(DeleteError::InProgress(active.clone()));
        }
        *current = Some(id.clone());
        Ok(Self { slot })
    }
}

impl Drop for DeleteGuard<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
