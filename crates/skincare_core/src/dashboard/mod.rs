//! Dashboard aggregation over the entry collection.

pub mod monthly;
