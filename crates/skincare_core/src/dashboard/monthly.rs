//! Monthly grouping and status tallies for the dashboard.
//!
//! # Responsibility
//! - Group entries by month bucket.
//! - Count checklist statuses for one month.
//!
//! # Invariants
//! - Everything here is a pure function of its input; nothing is cached.
//! - Groups are ordered newest month first; entries keep collection order
//!   inside a group.

use crate::model::entry::{CareStatus, ChecklistItem, EvaluationEntry, MonthKey};
use std::collections::BTreeMap;

/// Entries sharing one month bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGroup<'a> {
    pub month: MonthKey,
    pub entries: Vec<&'a EvaluationEntry>,
}

/// Per-status counts for one checklist item (or a combination).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub done: u32,
    pub not_done: u32,
    pub not_applicable: u32,
}

impl StatusCounts {
    pub fn get(&self, status: CareStatus) -> u32 {
        match status {
            CareStatus::Done => self.done,
            CareStatus::NotDone => self.not_done,
            CareStatus::NotApplicable => self.not_applicable,
        }
    }

    pub fn total(&self) -> u32 {
        self.done + self.not_done + self.not_applicable
    }

    /// Status/count pairs with a positive count, in display order.
    pub fn nonzero(&self) -> Vec<(CareStatus, u32)> {
        CareStatus::ALL
            .iter()
            .map(|status| (*status, self.get(*status)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    fn record(&mut self, status: CareStatus) {
        match status {
            CareStatus::Done => self.done += 1,
            CareStatus::NotDone => self.not_done += 1,
            CareStatus::NotApplicable => self.not_applicable += 1,
        }
    }

    fn plus(self, other: Self) -> Self {
        Self {
            done: self.done + other.done,
            not_done: self.not_done + other.not_done,
            not_applicable: self.not_applicable + other.not_applicable,
        }
    }
}

/// Status counts for one month's entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonthlyTally {
    pub adpro: StatusCounts,
    pub vaseline: StatusCounts,
    /// Sum of both items.
    pub total: StatusCounts,
    /// Number of (entry, item) pairs whose status is not `not_applicable`.
    pub target_count: u32,
}

impl MonthlyTally {
    pub fn item(&self, item: ChecklistItem) -> StatusCounts {
        match item {
            ChecklistItem::Adpro => self.adpro,
            ChecklistItem::Vaseline => self.vaseline,
        }
    }
}

/// Groups entries by exact month key, newest month first.
pub fn group_by_month(entries: &[EvaluationEntry]) -> Vec<MonthGroup<'_>> {
    let mut buckets: BTreeMap<MonthKey, Vec<&EvaluationEntry>> = BTreeMap::new();
    for entry in entries {
        buckets.entry(entry.month_key).or_default().push(entry);
    }
    buckets
        .into_iter()
        .rev()
        .map(|(month, entries)| MonthGroup { month, entries })
        .collect()
}

/// Tallies checklist statuses over `entries`.
pub fn tally<'a>(entries: impl IntoIterator<Item = &'a EvaluationEntry>) -> MonthlyTally {
    let mut result = MonthlyTally::default();
    for entry in entries {
        result.adpro.record(entry.status_adpro);
        result.vaseline.record(entry.status_vaseline);
        result.target_count += entry.target_count();
    }
    result.total = result.adpro.plus(result.vaseline);
    result
}

/// Tally of the entries in `month`; all zero when the month has none.
pub fn summarize_month(entries: &[EvaluationEntry], month: MonthKey) -> MonthlyTally {
    tally(entries.iter().filter(|entry| entry.month_key == month))
}

/// Month the dashboard should show: the previous choice while it still has
/// entries, otherwise the newest month.
pub fn select_month(groups: &[MonthGroup<'_>], previous: Option<MonthKey>) -> Option<MonthKey> {
    previous
        .filter(|month| groups.iter().any(|group| group.month == *month))
        .or_else(|| groups.first().map(|group| group.month))
}
