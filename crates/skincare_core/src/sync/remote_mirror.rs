//! Remote mirror collaborator contract.
//!
//! # Responsibility
//! - Describe the minimal document-collection API the bridge depends on.
//! - Carry errors as a uniform envelope with stage and stable code.
//!
//! # Invariants
//! - Remote records never carry local-only fields (`id`, `month_key`).
//! - Implementations must be callable from several tasks at once.

use crate::model::entry::{CareStatus, EvaluationEntry};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type MirrorResult<T> = Result<T, MirrorError>;

/// Remote operation that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorStage {
    Auth,
    List,
    Create,
    Delete,
}

impl MirrorStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::List => "list",
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}

/// Uniform remote failure envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorError {
    pub stage: MirrorStage,
    /// Stable machine-readable code (`transport`, `http_503`, ...).
    pub code: String,
    pub message: String,
    /// Informational only; the bridge never retries.
    pub retryable: bool,
}

impl MirrorError {
    pub fn new(
        stage: MirrorStage,
        code: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            stage,
            code: code.into(),
            message: message.into(),
            retryable,
        }
    }
}

impl Display for MirrorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "remote {} failed ({}): {}",
            self.stage.as_str(),
            self.code,
            self.message
        )
    }
}

impl Error for MirrorError {}

/// Field set written to and read from the remote collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub evaluator_name: String,
    pub status_adpro: CareStatus,
    pub status_vaseline: CareStatus,
    pub note: String,
    pub created_at: DateTime<FixedOffset>,
}

impl From<&EvaluationEntry> for RemoteRecord {
    fn from(entry: &EvaluationEntry) -> Self {
        Self {
            evaluator_name: entry.evaluator_name.clone(),
            status_adpro: entry.status_adpro,
            status_vaseline: entry.status_vaseline,
            note: entry.note.clone(),
            created_at: entry.created_at,
        }
    }
}

/// One remote document with its assigned identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDocument {
    pub remote_id: String,
    pub record: RemoteRecord,
}

/// Result of listing the whole remote collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteListing {
    pub documents: Vec<RemoteDocument>,
    /// Ids of documents whose fields could not be decoded.
    pub rejected: Vec<String>,
}

/// Minimal document-collection API.
#[async_trait]
pub trait RemoteMirror: Send + Sync {
    /// Short stable name used in logs.
    fn mirror_id(&self) -> &str;

    /// Lists every document in the collection.
    async fn list_all(&self) -> MirrorResult<RemoteListing>;

    /// Creates one document and returns its assigned identifier.
    async fn create(&self, record: &RemoteRecord) -> MirrorResult<String>;

    /// Deletes one document by identifier.
    async fn delete(&self, remote_id: &str) -> MirrorResult<()>;
}
