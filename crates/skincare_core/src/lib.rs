//! Core domain logic for the skin-care tracker.
//! This crate owns the entry collection, its durable storage, the remote
//! mirror bridge and the dashboard aggregation.

pub mod config;
pub mod dashboard;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sync;

pub use config::{ConfigError, MirrorConfig};
pub use dashboard::monthly::{
    group_by_month, select_month, summarize_month, tally, MonthGroup, MonthlyTally, StatusCounts,
};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use model::bmi::{Bmi, UNDERWEIGHT_THRESHOLD};
pub use model::entry::{
    CareStatus, ChecklistItem, EntryId, EntryPatch, EntryValidationError, EvaluationEntry,
    MirrorState, MonthKey, NewEntry,
};
pub use repo::entry_repo::{
    decode_entries, encode_entries, EntryCollectionRepository, RepoError, RepoResult, STORAGE_KEY,
};
pub use repo::kv_repo::{
    KeyValueStore, KvError, KvResult, MemoryKeyValueStore, SqliteKeyValueStore,
};
pub use service::entry_store::{EntryStore, StoreEvent};
pub use service::mirror_bridge::{
    DeleteError, EvaluationSession, HydrateReport, Notification, NotificationKind, SubmitError,
    SubmitOutcome,
};
pub use sync::firestore::FirestoreMirror;
pub use sync::remote_mirror::{
    MirrorError, MirrorResult, MirrorStage, RemoteDocument, RemoteListing, RemoteMirror,
    RemoteRecord,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
