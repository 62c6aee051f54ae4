//! Entry collection persistence over the durable key-value store.
//!
//! # Responsibility
//! - Encode the full entry collection as one JSON array under a fixed key.
//! - Decode stored collections record by record.
//!
//! # Invariants
//! - Writes always replace the whole collection.
//! - A record holding values no entry may carry is skipped; its neighbours
//!   still load.
//! - Stored `monthKey` is kept as written; it is only derived when absent.

use crate::model::entry::{
    CareStatus, EntryId, EntryValidationError, EvaluationEntry, MirrorState, MonthKey,
};
use crate::repo::kv_repo::{KeyValueStore, KvError};
use chrono::{DateTime, SecondsFormat};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Fixed storage key holding the serialized entry collection.
pub const STORAGE_KEY: &str = "skin-care-tracker/evaluations";

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence error for the entry collection.
#[derive(Debug)]
pub enum RepoError {
    Kv(KvError),
    /// Stored text is not a JSON entry array.
    Parse(serde_json::Error),
    /// JSON is well-formed but holds values an entry cannot carry.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kv(err) => write!(f, "{err}"),
            Self::Parse(err) => write!(f, "stored entries are not valid JSON: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted entry data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Kv(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<KvError> for RepoError {
    fn from(value: KvError) -> Self {
        Self::Kv(value)
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl From<EntryValidationError> for RepoError {
    fn from(value: EntryValidationError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// Wire shape of one stored entry.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    id: EntryId,
    created_at: String,
    #[serde(default)]
    month_key: Option<MonthKey>,
    #[serde(default)]
    evaluator_name: String,
    status_adpro: CareStatus,
    status_vaseline: CareStatus,
    #[serde(default)]
    note: String,
    #[serde(default, alias = "firestoreId")]
    remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mirror_error: Option<String>,
}

impl From<&EvaluationEntry> for StoredEntry {
    fn from(entry: &EvaluationEntry) -> Self {
        let (remote_id, mirror_error) = match &entry.mirror {
            MirrorState::NotMirrored => (None, None),
            MirrorState::Mirrored { remote_id } => (Some(remote_id.clone()), None),
            MirrorState::Failed { reason } => (None, Some(reason.clone())),
        };
        Self {
            id: entry.id.clone(),
            created_at: format_timestamp(&entry.created_at),
            month_key: Some(entry.month_key),
            evaluator_name: entry.evaluator_name.clone(),
            status_adpro: entry.status_adpro,
            status_vaseline: entry.status_vaseline,
            note: entry.note.clone(),
            remote_id,
            mirror_error,
        }
    }
}

impl TryFrom<StoredEntry> for EvaluationEntry {
    type Error = RepoError;

    fn try_from(stored: StoredEntry) -> RepoResult<Self> {
        if stored.id.as_str().trim().is_empty() {
            return Err(EntryValidationError::EmptyId.into());
        }
        let created_at = DateTime::parse_from_rfc3339(&stored.created_at)
            .map_err(|_| EntryValidationError::InvalidTimestamp(stored.created_at.clone()))?;
        let month_key = stored
            .month_key
            .unwrap_or_else(|| MonthKey::from_timestamp(&created_at));
        let mirror = match (stored.remote_id, stored.mirror_error) {
            (Some(remote_id), _) if !remote_id.is_empty() => MirrorState::Mirrored { remote_id },
            (_, Some(reason)) => MirrorState::Failed { reason },
            _ => MirrorState::NotMirrored,
        };

        Ok(Self {
            id: stored.id,
            created_at,
            month_key,
            evaluator_name: stored.evaluator_name,
            status_adpro: stored.status_adpro,
            status_vaseline: stored.status_vaseline,
            note: stored.note,
            mirror,
        })
    }
}

/// Serializes the full collection in canonical order.
pub fn encode_entries(entries: &[EvaluationEntry]) -> RepoResult<String> {
    let stored = entries.iter().map(StoredEntry::from).collect::<Vec<_>>();
    Ok(serde_json::to_string(&stored)?)
}

/// Parses a stored collection.
///
/// Fails only when `raw` is not a JSON array. Records that do not decode are
/// skipped with a warning, and a repeated id keeps its first (most recent)
/// occurrence.
pub fn decode_entries(raw: &str) -> RepoResult<Vec<EvaluationEntry>> {
    let records: Vec<serde_json::Value> = serde_json::from_str(raw)?;
    let mut seen = HashSet::with_capacity(records.len());
    let mut entries = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let entry = match decode_record(record) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    "event=entries_decode module=repo status=skipped reason=invalid_record index={} error={}",
                    index, err
                );
                continue;
            }
        };
        if !seen.insert(entry.id.clone()) {
            warn!(
                "event=entries_decode module=repo status=warn reason=duplicate_id entry_id={}",
                entry.id
            );
            continue;
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Repository for the entry collection stored under one key.
pub struct EntryCollectionRepository<K: KeyValueStore> {
    kv: K,
    key: String,
}

impl<K: KeyValueStore> EntryCollectionRepository<K> {
    /// Uses the default `STORAGE_KEY`.
    pub fn new(kv: K) -> Self {
        Self::with_key(kv, STORAGE_KEY)
    }

    pub fn with_key(kv: K, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reads the raw stored value without decoding it.
    pub fn load_raw(&self) -> RepoResult<Option<String>> {
        Ok(self.kv.read(&self.key)?)
    }

    /// Reads and decodes the stored collection; `None` when the key is absent.
    pub fn load(&self) -> RepoResult<Option<Vec<EvaluationEntry>>> {
        self.load_raw()?
            .map(|raw| decode_entries(&raw))
            .transpose()
    }

    /// Replaces the stored collection and returns the written text.
    pub fn save(&self, entries: &[EvaluationEntry]) -> RepoResult<String> {
        let raw = encode_entries(entries)?;
        self.kv.write(&self.key, &raw)?;
        Ok(raw)
    }
}

fn decode_record(record: serde_json::Value) -> RepoResult<EvaluationEntry> {
    let stored: StoredEntry = serde_json::from_value(record)?;
    EvaluationEntry::try_from(stored)
}

fn format_timestamp(at: &DateTime<chrono::FixedOffset>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
