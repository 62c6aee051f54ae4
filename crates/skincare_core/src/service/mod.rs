//! Core use-case services.
//!
//! # Responsibility
//! - Own the in-memory entry collection and its persistence.
//! - Orchestrate local writes with the optional remote mirror.

pub mod entry_store;
pub mod mirror_bridge;
