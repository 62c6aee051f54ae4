//! Domain model for skin-care evaluation records.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep derived fields (`month_key`, `remote_id`) consistent with their
//!   sources at construction time.
//!
//! # Invariants
//! - Every entry is identified by a stable `EntryId`.
//! - Status values are closed enums; no free-form status is representable.

pub mod bmi;
pub mod entry;
