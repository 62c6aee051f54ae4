//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the entry store, mirror bridge and dashboard to Dart via FRB.
//! - Flatten domain types into string-keyed response envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - One process-wide session backs every call; it is created lazily.
//! - Status and month values cross the boundary as their wire strings.

use log::warn;
use skincare_core::{
    core_version as core_version_inner, group_by_month, init_logging as init_logging_inner,
    ping as ping_inner, select_month, summarize_month, Bmi, CareStatus, DeleteError, EntryId,
    EntryStore, EvaluationEntry, EvaluationSession, FirestoreMirror, MirrorConfig, MirrorState,
    MonthKey, NewEntry, Notification, NotificationKind, RemoteMirror, SqliteKeyValueStore,
    StatusCounts, SubmitOutcome,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

const DB_PATH_ENV: &str = "SKINCARE_DB_PATH";
const DB_FILE_NAME: &str = "skincare_tracker.sqlite3";

type Session = EvaluationSession<SqliteKeyValueStore>;

static DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static SESSION: OnceLock<Session> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// One entry as shown in the recent-entries list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryItem {
    pub entry_id: String,
    /// RFC 3339 with the offset the entry was recorded in.
    pub created_at: String,
    /// `YYYY-MM`.
    pub month_key: String,
    pub evaluator_name: String,
    /// `done|not_done|not_applicable`.
    pub status_adpro: String,
    pub status_vaseline: String,
    pub note: String,
    /// Set once the remote mirror accepted the entry.
    pub remote_id: Option<String>,
    /// Set when the single remote write attempt failed.
    pub mirror_error: Option<String>,
}

/// Action response envelope for submit/delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryActionResponse {
    pub ok: bool,
    pub entry_id: Option<String>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl EntryActionResponse {
    fn success(message: impl Into<String>, entry_id: String) -> Self {
        Self {
            ok: true,
            entry_id: Some(entry_id),
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            entry_id: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCountsItem {
    pub done: u32,
    pub not_done: u32,
    pub not_applicable: u32,
}

/// Chart data for one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlySummaryResponse {
    /// Selected month; empty when there are no entries.
    pub month_key: String,
    pub adpro: StatusCountsItem,
    pub vaseline: StatusCountsItem,
    pub total: StatusCountsItem,
    pub target_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationItem {
    /// `success|error`.
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydrateResponse {
    pub ok: bool,
    pub imported: u32,
    pub already_present: u32,
    pub rejected: u32,
    pub message: String,
}

/// BMI check result for the record form.
#[derive(Debug, Clone, PartialEq)]
pub struct BmiResponse {
    pub value: Option<f64>,
    /// One decimal place, or `--` when no value.
    pub formatted: String,
    pub underweight: bool,
}

/// Pins the store file and opens the session.
///
/// # FFI contract
/// - Sync call; opens SQLite and creates the `kv_entries` schema when missing.
/// - Calling again with the same path is a no-op.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn store_init(db_path: String) -> String {
    let trimmed = db_path.trim();
    if trimmed.is_empty() {
        return "db_path must not be empty".to_string();
    }
    let requested = PathBuf::from(trimmed);
    let active = DB_PATH.get_or_init(|| requested.clone());
    if *active != requested {
        return format!("store already initialized at {}", active.display());
    }
    match session() {
        Ok(_) => String::new(),
        Err(err) => err,
    }
}

/// Validates and stores one evaluation, then mirrors it once.
///
/// # FFI contract
/// - Async call; the remote write runs off the UI thread.
/// - `ok` is true whenever the entry was stored locally, even if the
///   remote write failed.
/// - Never panics.
pub async fn entry_submit(
    evaluator_name: String,
    status_adpro: String,
    status_vaseline: String,
    note: String,
) -> EntryActionResponse {
    let (adpro, vaseline) = match (parse_status(&status_adpro), parse_status(&status_vaseline)) {
        (Ok(adpro), Ok(vaseline)) => (adpro, vaseline),
        (Err(err), _) | (_, Err(err)) => return EntryActionResponse::failure(err),
    };
    let session = match session() {
        Ok(session) => session,
        Err(err) => return EntryActionResponse::failure(err),
    };

    match session
        .submit(NewEntry::new(evaluator_name, adpro, vaseline, note))
        .await
    {
        Ok(SubmitOutcome::LocalOnly(entry)) => {
            EntryActionResponse::success("stored locally", entry.id.to_string())
        }
        Ok(SubmitOutcome::Mirrored(entry)) => {
            EntryActionResponse::success("stored and mirrored", entry.id.to_string())
        }
        Ok(SubmitOutcome::MirrorFailed { entry, error }) => EntryActionResponse::success(
            format!("stored locally; {error}"),
            entry.id.to_string(),
        ),
        Ok(SubmitOutcome::OrphanedRemote { entry_id, remote_id }) => EntryActionResponse {
            ok: false,
            entry_id: Some(entry_id.to_string()),
            message: format!("entry deleted before remote document {remote_id} was recorded"),
        },
        Err(err) => EntryActionResponse::failure(err.to_string()),
    }
}

/// Deletes one entry remotely, then locally.
///
/// # FFI contract
/// - Async call.
/// - On failure the entry stays in the list.
/// - Never panics.
pub async fn entry_delete(entry_id: String) -> EntryActionResponse {
    let session = match session() {
        Ok(session) => session,
        Err(err) => return EntryActionResponse::failure(err),
    };
    let id = EntryId::new(entry_id.trim());
    match session.delete(&id).await {
        Ok(()) => EntryActionResponse::success("deleted", id.to_string()),
        Err(DeleteError::NotFound(_)) => {
            EntryActionResponse::failure(format!("entry not found: {id}"))
        }
        Err(err) => EntryActionResponse::failure(err.to_string()),
    }
}

/// Most recently inserted entries first; `None` returns all.
///
/// # FFI contract
/// - Sync call, reads memory only.
/// - Returns an empty list when the store cannot be opened.
#[flutter_rust_bridge::frb(sync)]
pub fn entries_list(limit: Option<u32>) -> Vec<EntryItem> {
    let Ok(session) = session() else {
        return Vec::new();
    };
    session.with_store(|store| {
        let limit = limit.map_or(store.len(), |value| value as usize);
        store.recent(limit).iter().map(to_entry_item).collect()
    })
}

/// Distinct evaluator names for the name suggestions.
#[flutter_rust_bridge::frb(sync)]
pub fn evaluator_names() -> Vec<String> {
    session()
        .map(|session| session.evaluator_names())
        .unwrap_or_default()
}

/// Months with at least one entry, newest first.
#[flutter_rust_bridge::frb(sync)]
pub fn month_keys() -> Vec<String> {
    let Ok(session) = session() else {
        return Vec::new();
    };
    session.with_store(|store| {
        group_by_month(store.entries())
            .iter()
            .map(|group| group.month.to_string())
            .collect()
    })
}

/// Tally for `month_key`, or for the newest month when it is absent,
/// unparsable or has no entries.
///
/// # FFI contract
/// - Sync call, pure computation over the current collection.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn monthly_summary(month_key: Option<String>) -> MonthlySummaryResponse {
    let previous = month_key.and_then(|value| MonthKey::parse(&value).ok());
    let Ok(session) = session() else {
        return empty_summary();
    };
    session.with_store(|store| {
        let entries = store.entries();
        let groups = group_by_month(entries);
        match select_month(&groups, previous) {
            Some(month) => {
                let tally = summarize_month(entries, month);
                MonthlySummaryResponse {
                    month_key: month.to_string(),
                    adpro: to_counts_item(tally.adpro),
                    vaseline: to_counts_item(tally.vaseline),
                    total: to_counts_item(tally.total),
                    target_count: tally.target_count,
                }
            }
            None => empty_summary(),
        }
    })
}

/// Adopts changes written by another session sharing the store file.
#[flutter_rust_bridge::frb(sync)]
pub fn store_reload() -> bool {
    session()
        .map(|session| session.with_store(|store| store.reload_if_changed()))
        .unwrap_or(false)
}

/// Imports remote documents missing locally.
///
/// # FFI contract
/// - Async call; intended once at startup.
/// - Local-only sessions return `ok` with zero counts.
pub async fn hydrate_from_remote() -> HydrateResponse {
    let session = match session() {
        Ok(session) => session,
        Err(err) => return hydrate_failure(err),
    };
    match session.hydrate_from_remote().await {
        Ok(report) => HydrateResponse {
            ok: true,
            imported: clamp_u32(report.imported),
            already_present: clamp_u32(report.already_present),
            rejected: clamp_u32(report.rejected),
            message: String::new(),
        },
        Err(err) => hydrate_failure(err.to_string()),
    }
}

/// Drains pending user-facing notifications in emission order.
#[flutter_rust_bridge::frb(sync)]
pub fn take_notifications() -> Vec<NotificationItem> {
    session()
        .map(|session| {
            session
                .notifications()
                .try_iter()
                .map(to_notification_item)
                .collect()
        })
        .unwrap_or_default()
}

/// Computes the BMI from the height (cm) and weight (kg) form fields.
///
/// # FFI contract
/// - Sync call, pure; does not touch the session.
/// - Blank, non-numeric, zero or otherwise unusable input yields
///   `value: None`, `formatted: "--"`.
#[flutter_rust_bridge::frb(sync)]
pub fn bmi_check(height_cm: String, weight_kg: String) -> BmiResponse {
    match Bmi::from_text(&height_cm, &weight_kg) {
        Some(bmi) => BmiResponse {
            value: Some(bmi.value()),
            formatted: bmi.to_string(),
            underweight: bmi.is_underweight(),
        },
        None => BmiResponse {
            value: None,
            formatted: "--".to_string(),
            underweight: false,
        },
    }
}

fn session() -> Result<&'static Session, String> {
    if let Some(session) = SESSION.get() {
        return Ok(session);
    }
    let built = build_session(resolve_db_path())?;
    Ok(SESSION.get_or_init(|| built))
}

fn build_session(db_path: &Path) -> Result<Session, String> {
    let kv = SqliteKeyValueStore::open(db_path)
        .map_err(|err| format!("store open failed: {err}"))?;
    Ok(EvaluationSession::new(EntryStore::open(kv), build_mirror()))
}

fn build_mirror() -> Option<Arc<dyn RemoteMirror>> {
    let config = match MirrorConfig::from_env() {
        Ok(Some(config)) => config,
        Ok(None) => return None,
        Err(err) => {
            warn!("event=mirror_config module=ffi status=error error={err}");
            return None;
        }
    };
    match FirestoreMirror::new(config) {
        Ok(mirror) => Some(Arc::new(mirror)),
        Err(err) => {
            warn!(
                "event=mirror_config module=ffi status=error error_code={} error={}",
                err.code, err
            );
            None
        }
    }
}

fn resolve_db_path() -> &'static PathBuf {
    DB_PATH.get_or_init(|| {
        if let Ok(raw) = std::env::var(DB_PATH_ENV) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return PathBuf::from(trimmed);
            }
        }
        std::env::temp_dir().join(DB_FILE_NAME)
    })
}

fn parse_status(value: &str) -> Result<CareStatus, String> {
    CareStatus::parse(value.trim()).ok_or_else(|| {
        format!("unsupported status `{value}`; expected done|not_done|not_applicable")
    })
}

fn to_entry_item(entry: &EvaluationEntry) -> EntryItem {
    EntryItem {
        entry_id: entry.id.to_string(),
        created_at: entry.created_at.to_rfc3339(),
        month_key: entry.month_key.to_string(),
        evaluator_name: entry.evaluator_name.clone(),
        status_adpro: entry.status_adpro.as_str().to_string(),
        status_vaseline: entry.status_vaseline.as_str().to_string(),
        note: entry.note.clone(),
        remote_id: entry.remote_id().map(str::to_string),
        mirror_error: match &entry.mirror {
            MirrorState::Failed { reason } => Some(reason.clone()),
            _ => None,
        },
    }
}

fn to_counts_item(counts: StatusCounts) -> StatusCountsItem {
    StatusCountsItem {
        done: counts.done,
        not_done: counts.not_done,
        not_applicable: counts.not_applicable,
    }
}

fn to_notification_item(notification: Notification) -> NotificationItem {
    let kind = match notification.kind {
        NotificationKind::Success => "success",
        NotificationKind::Error => "error",
    };
    NotificationItem {
        kind: kind.to_string(),
        message: notification.message,
    }
}

fn empty_summary() -> MonthlySummaryResponse {
    MonthlySummaryResponse {
        month_key: String::new(),
        adpro: StatusCountsItem::default(),
        vaseline: StatusCountsItem::default(),
        total: StatusCountsItem::default(),
        target_count: 0,
    }
}

fn hydrate_failure(message: String) -> HydrateResponse {
    HydrateResponse {
        ok: false,
        imported: 0,
        already_present: 0,
        rejected: 0,
        message,
    }
}

fn clamp_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
