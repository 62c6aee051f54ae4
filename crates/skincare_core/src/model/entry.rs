//! Evaluation entry domain model.
//!
//! # Responsibility
//! - Define the record produced by one skin-care evaluation.
//! - Provide the single construction path that assigns identity, timestamp
//!   and month bucket.
//!
//! # Invariants
//! - `id` is stable and never reused for another entry.
//! - `month_key` is computed from `created_at` once, at construction.
//! - `created_at` carries millisecond precision so it survives persistence
//!   unchanged.
//! - `mirror` is the source of truth for remote identity; `remote_id()` is a
//!   projection of it.

use chrono::{DateTime, Datelike, FixedOffset, Local, SubsecRound};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static MONTH_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("valid month key regex"));

/// Stable identifier of one evaluation entry.
///
/// Locally created entries use UUID v4 text; entries hydrated from the remote
/// mirror reuse the remote document id, so this is not a `Uuid`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Completion state of one checklist item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareStatus {
    /// Care was performed.
    Done,
    /// Care was due but not performed.
    NotDone,
    /// Care does not apply to this patient.
    NotApplicable,
}

impl CareStatus {
    /// All statuses in display order.
    pub const ALL: [CareStatus; 3] = [Self::Done, Self::NotDone, Self::NotApplicable];

    /// Stable wire value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::NotDone => "not_done",
            Self::NotApplicable => "not_applicable",
        }
    }

    /// Parses a wire value; unknown values are rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "done" => Some(Self::Done),
            "not_done" => Some(Self::NotDone),
            "not_applicable" => Some(Self::NotApplicable),
            _ => None,
        }
    }

    /// Whether this status counts toward the dashboard target count.
    pub fn is_actionable(self) -> bool {
        self != Self::NotApplicable
    }
}

/// One of the two tracked care tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecklistItem {
    Adpro,
    Vaseline,
}

impl ChecklistItem {
    pub const ALL: [ChecklistItem; 2] = [Self::Adpro, Self::Vaseline];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Adpro => "adpro",
            Self::Vaseline => "vaseline",
        }
    }
}

/// Calendar-month bucket rendered as zero-padded `YYYY-MM`.
///
/// Ordering is chronological, which matches the ordering of the text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Builds a month key; `month` must be in `1..=12`.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (0..=9999).contains(&year) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// Month bucket of a timestamp, evaluated in the timestamp's own offset.
    pub fn from_timestamp(at: &DateTime<FixedOffset>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    /// Parses `YYYY-MM`.
    pub fn parse(value: &str) -> Result<Self, EntryValidationError> {
        let invalid = || EntryValidationError::InvalidMonthKey(value.to_string());
        let caps = MONTH_KEY_RE.captures(value.trim()).ok_or_else(invalid)?;
        let year = caps[1].parse::<i32>().map_err(|_| invalid())?;
        let month = caps[2].parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month).ok_or_else(invalid)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl Display for MonthKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Replication state of an entry against the remote mirror.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MirrorState {
    /// No remote write has completed (not configured, or still in flight).
    #[default]
    NotMirrored,
    /// Remote write succeeded and assigned `remote_id`.
    Mirrored { remote_id: String },
    /// Remote write failed; it is never retried automatically.
    Failed { reason: String },
}

impl MirrorState {
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Self::Mirrored { remote_id } => Some(remote_id.as_str()),
            _ => None,
        }
    }

    pub fn is_mirrored(&self) -> bool {
        matches!(self, Self::Mirrored { .. })
    }
}

/// Domain validation errors for entry-adjacent values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryValidationError {
    InvalidMonthKey(String),
    InvalidTimestamp(String),
    EmptyId,
}

impl Display for EntryValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMonthKey(value) => {
                write!(f, "month key `{value}` must match YYYY-MM")
            }
            Self::InvalidTimestamp(value) => {
                write!(f, "timestamp `{value}` is not valid RFC 3339")
            }
            Self::EmptyId => write!(f, "entry id cannot be empty"),
        }
    }
}

impl Error for EntryValidationError {}

/// Input for the single entry construction path.
///
/// `id`, `created_at` and `mirror` are normally left empty; import paths
/// (remote hydration) supply them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub evaluator_name: String,
    pub status_adpro: CareStatus,
    pub status_vaseline: CareStatus,
    pub note: String,
    pub id: Option<EntryId>,
    pub created_at: Option<DateTime<FixedOffset>>,
    pub mirror: MirrorState,
}

impl NewEntry {
    pub fn new(
        evaluator_name: impl Into<String>,
        status_adpro: CareStatus,
        status_vaseline: CareStatus,
        note: impl Into<String>,
    ) -> Self {
        Self {
            evaluator_name: evaluator_name.into(),
            status_adpro,
            status_vaseline,
            note: note.into(),
            id: None,
            created_at: None,
            mirror: MirrorState::NotMirrored,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<FixedOffset>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_id(mut self, id: EntryId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Partial field set for `EntryStore::update`.
///
/// Identity and timestamp fields are absent: `id`, `created_at`
/// and `month_key` are immutable after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub evaluator_name: Option<String>,
    pub status_adpro: Option<CareStatus>,
    pub status_vaseline: Option<CareStatus>,
    pub note: Option<String>,
    pub mirror: Option<MirrorState>,
}

impl EntryPatch {
    /// Patch that records a successful remote write.
    pub fn mirrored(remote_id: impl Into<String>) -> Self {
        Self {
            mirror: Some(MirrorState::Mirrored {
                remote_id: remote_id.into(),
            }),
            ..Self::default()
        }
    }

    /// Patch that records a failed remote write.
    pub fn mirror_failed(reason: impl Into<String>) -> Self {
        Self {
            mirror: Some(MirrorState::Failed {
                reason: reason.into(),
            }),
            ..Self::default()
        }
    }
}

/// One recorded skin-care assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationEntry {
    pub id: EntryId,
    pub created_at: DateTime<FixedOffset>,
    pub month_key: MonthKey,
    pub evaluator_name: String,
    pub status_adpro: CareStatus,
    pub status_vaseline: CareStatus,
    pub note: String,
    pub mirror: MirrorState,
}

impl EvaluationEntry {
    /// Builds an entry from caller input.
    ///
    /// # Invariants
    /// - Missing `id` is generated; missing `created_at` is "now" in the
    ///   local offset.
    /// - `created_at` is truncated to milliseconds.
    /// - Text fields are trimmed; empty results are kept as-is.
    pub fn from_input(input: NewEntry) -> Self {
        let created_at = input
            .created_at
            .unwrap_or_else(|| Local::now().fixed_offset())
            .trunc_subsecs(3);
        Self {
            id: input.id.unwrap_or_else(EntryId::generate),
            month_key: MonthKey::from_timestamp(&created_at),
            created_at,
            evaluator_name: input.evaluator_name.trim().to_string(),
            status_adpro: input.status_adpro,
            status_vaseline: input.status_vaseline,
            note: input.note.trim().to_string(),
            mirror: input.mirror,
        }
    }

    /// Remote identifier, present only after a successful mirror write.
    pub fn remote_id(&self) -> Option<&str> {
        self.mirror.remote_id()
    }

    /// Key used for the remote delete call: remote id when known, local id
    /// otherwise.
    pub fn remote_key(&self) -> &str {
        self.remote_id().unwrap_or(self.id.as_str())
    }

    pub fn status_of(&self, item: ChecklistItem) -> CareStatus {
        match item {
            ChecklistItem::Adpro => self.status_adpro,
            ChecklistItem::Vaseline => self.status_vaseline,
        }
    }

    /// Number of checklist items (0..=2) that are actionable for this entry.
    pub fn target_count(&self) -> u32 {
        ChecklistItem::ALL
            .iter()
            .filter(|item| self.status_of(**item).is_actionable())
            .count() as u32
    }

    /// Applies a partial update in place. Fields absent from the patch keep
    /// their values.
    pub fn apply(&mut self, patch: EntryPatch) {
        if let Some(name) = patch.evaluator_name {
            self.evaluator_name = name.trim().to_string();
        }
        if let Some(status) = patch.status_adpro {
            self.status_adpro = status;
        }
        if let Some(status) = patch.status_vaseline {
            self.status_vaseline = status;
        }
        if let Some(note) = patch.note {
            self.note = note.trim().to_string();
        }
        if let Some(mirror) = patch.mirror {
            self.mirror = mirror;
        }
    }
}
