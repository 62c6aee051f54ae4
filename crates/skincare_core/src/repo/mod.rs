//! Repository layer: durable key-value storage and entry collection codec.
//!
//! # Responsibility
//! - Define the storage contract the entry store persists through.
//! - Isolate SQLite and JSON wire details from service orchestration.
//!
//! # Invariants
//! - The entry collection is always read and written as a whole.

pub mod entry_repo;
pub mod kv_repo;
