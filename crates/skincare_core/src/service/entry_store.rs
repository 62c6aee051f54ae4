//! In-memory entry collection backed by the durable key-value store.
//!
//! # Responsibility
//! - Provide create/update/delete over the evaluation entry collection.
//! - Persist the whole collection after every mutation.
//! - Notify subscribers when the collection changes.
//!
//! # Invariants
//! - `entries` is ordered most-recent-insert first, regardless of
//!   `created_at`.
//! - Entry ids are unique within the collection.
//! - Storage failures are logged and never surface to callers; the store
//!   keeps working from memory.

use crate::model::entry::{EntryId, EntryPatch, EvaluationEntry, NewEntry};
use crate::repo::entry_repo::{decode_entries, EntryCollectionRepository};
use crate::repo::kv_repo::KeyValueStore;
use log::{info, warn};
use std::cmp::Ordering;
use unicode_normalization::UnicodeNormalization;

/// Collection change emitted to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Added(EntryId),
    Updated(EntryId),
    Removed(EntryId),
    /// Collection replaced by a value written by another session.
    Reloaded,
}

/// Owned entry collection with write-through persistence.
pub struct EntryStore<K: KeyValueStore> {
    repo: EntryCollectionRepository<K>,
    entries: Vec<EvaluationEntry>,
    /// Last raw value this store wrote or adopted.
    last_synced: Option<String>,
    subscribers: Vec<flume::Sender<StoreEvent>>,
}

impl<K: KeyValueStore> EntryStore<K> {
    /// Opens the store under the default storage key.
    pub fn open(kv: K) -> Self {
        Self::from_repository(EntryCollectionRepository::new(kv))
    }

    /// Loads the collection, falling back to empty when the key is absent,
    /// unparsable or the backing store is unavailable.
    pub fn from_repository(repo: EntryCollectionRepository<K>) -> Self {
        let (entries, last_synced) = match repo.load_raw() {
            Ok(Some(raw)) => match decode_entries(&raw) {
                Ok(entries) => (entries, Some(raw)),
                Err(err) => {
                    warn!(
                        "event=store_load module=service status=fallback reason=decode_failed key={} error={}",
                        repo.key(),
                        err
                    );
                    (Vec::new(), Some(raw))
                }
            },
            Ok(None) => (Vec::new(), None),
            Err(err) => {
                warn!(
                    "event=store_load module=service status=fallback reason=storage_unavailable key={} error={}",
                    repo.key(),
                    err
                );
                (Vec::new(), None)
            }
        };
        info!(
            "event=store_load module=service status=ok key={} count={}",
            repo.key(),
            entries.len()
        );

        Self {
            repo,
            entries,
            last_synced,
            subscribers: Vec::new(),
        }
    }

    /// Entries in canonical order (most recent insert first).
    pub fn entries(&self) -> &[EvaluationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &EntryId) -> Option<&EvaluationEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    /// The `limit` most recently inserted entries.
    pub fn recent(&self, limit: usize) -> &[EvaluationEntry] {
        &self.entries[..limit.min(self.entries.len())]
    }

    /// Registers a change subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> flume::Receiver<StoreEvent> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Constructs an entry, prepends it and persists the collection.
    ///
    /// Never fails; blank names or notes are stored as empty strings. A
    /// caller-supplied id that already exists replaces the old entry.
    pub fn add(&mut self, input: NewEntry) -> EvaluationEntry {
        let entry = EvaluationEntry::from_input(input);
        self.entries.retain(|existing| existing.id != entry.id);
        self.entries.insert(0, entry.clone());
        self.persist();
        self.notify(StoreEvent::Added(entry.id.clone()));
        entry
    }

    /// Applies `patch` to the entry with `id`. Missing ids are a no-op, but
    /// the collection is still re-persisted.
    pub fn update(&mut self, id: &EntryId, patch: EntryPatch) {
        let found = match self.entries.iter_mut().find(|entry| &entry.id == id) {
            Some(entry) => {
                entry.apply(patch);
                true
            }
            None => false,
        };
        self.persist();
        if found {
            self.notify(StoreEvent::Updated(id.clone()));
        }
    }

    /// Removes the entry with `id`. Missing ids are a no-op, but the
    /// collection is still re-persisted.
    pub fn remove(&mut self, id: &EntryId) {
        let before = self.entries.len();
        self.entries.retain(|entry| &entry.id != id);
        let removed = self.entries.len() != before;
        self.persist();
        if removed {
            self.notify(StoreEvent::Removed(id.clone()));
        }
    }

    /// Distinct non-empty evaluator names in collation order.
    pub fn evaluator_names(&self) -> Vec<String> {
        let mut names = self
            .entries
            .iter()
            .filter(|entry| !entry.evaluator_name.is_empty())
            .map(|entry| entry.evaluator_name.clone())
            .collect::<Vec<_>>();
        names.sort_by(|a, b| collate(a, b));
        names.dedup();
        names
    }

    /// Adopts a collection written by another session sharing the store.
    ///
    /// Returns `true` when the in-memory collection was replaced. Absent or
    /// unparsable foreign values are ignored.
    pub fn reload_if_changed(&mut self) -> bool {
        let raw = match self.repo.load_raw() {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(err) => {
                warn!(
                    "event=store_reload module=service status=error key={} error={}",
                    self.repo.key(),
                    err
                );
                return false;
            }
        };
        if self.last_synced.as_deref() == Some(raw.as_str()) {
            return false;
        }

        match decode_entries(&raw) {
            Ok(entries) => {
                info!(
                    "event=store_reload module=service status=ok key={} count={}",
                    self.repo.key(),
                    entries.len()
                );
                self.entries = entries;
                self.last_synced = Some(raw);
                self.notify(StoreEvent::Reloaded);
                true
            }
            Err(err) => {
                warn!(
                    "event=store_reload module=service status=ignored key={} error={}",
                    self.repo.key(),
                    err
                );
                self.last_synced = Some(raw);
                false
            }
        }
    }

    fn persist(&mut self) {
        match self.repo.save(&self.entries) {
            Ok(raw) => self.last_synced = Some(raw),
            Err(err) => warn!(
                "event=store_persist module=service status=error key={} count={} error={}",
                self.repo.key(),
                self.entries.len(),
                err
            ),
        }
    }

    fn notify(&mut self, event: StoreEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

/// Orders names the way a Japanese-locale collator roughly would: width and
/// case insensitive, hiragana and katakana equal, raw text as tie-break.
fn collate(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.cmp(b))
}

fn collation_key(value: &str) -> String {
    value
        .nfkc()
        .flat_map(char::to_lowercase)
        .map(fold_katakana)
        .collect()
}

fn fold_katakana(c: char) -> char {
    match c {
        '\u{30A1}'..='\u{30F6}' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
        _ => c,
    }
}
