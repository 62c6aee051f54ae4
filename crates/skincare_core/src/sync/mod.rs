//! Remote mirror contract and adapters.

pub mod firestore;
pub mod remote_mirror;
