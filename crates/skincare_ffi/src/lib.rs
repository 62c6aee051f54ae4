//! Flutter-facing bindings for the skin-care tracker core.

pub mod api;
