// Error taxonomy for the ingestion engine
//
// Every failure that can end a queue item is an IngestError. Each variant maps
// to the audit-log tag it is recorded under, and only store contention is
// considered transient (retried by crate::retry).

use rusqlite::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

use crate::audit::AuditKind;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    // ========================================================================
    // STRUCTURAL (fatal to the item only)
    // ========================================================================
    #[error("archive unreadable: {path}: {reason}")]
    ArchiveUnreadable { path: PathBuf, reason: String },

    #[error("no result document in archive {path} (entries: {entries:?})")]
    MissingResultDocument { path: PathBuf, entries: Vec<String> },

    #[error("result document has no valid meet header record: {path}")]
    MissingMeetHeader { path: PathBuf },

    // ========================================================================
    // QUEUE / REGISTRY
    // ========================================================================
    #[error("meet {0} not found")]
    MeetNotFound(i64),

    #[error("meet {0} has no local file path")]
    MissingFilePath(i64),

    #[error("no meet discovered at {0}")]
    UnknownUrl(String),

    #[error("file {file_path} already belongs to meet {existing_meet_id}, cannot assign it to meet {meet_id}")]
    FilePathInUse {
        file_path: String,
        meet_id: i64,
        existing_meet_id: i64,
    },

    // ========================================================================
    // CONCURRENCY
    // ========================================================================
    #[error("store still locked after {attempts} attempts during {operation}: {last_error}")]
    LockRetryExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    // ========================================================================
    // WRAPPED
    // ========================================================================
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl IngestError {
    /// True when the store reported a busy/locked condition worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            IngestError::Store(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Audit tag this error is recorded under when it fails an item.
    pub fn kind(&self) -> AuditKind {
        match self {
            IngestError::ArchiveUnreadable { .. } => AuditKind::ArchiveUnreadable,
            IngestError::MissingResultDocument { .. } => AuditKind::MissingResultDocument,
            IngestError::MissingMeetHeader { .. } | IngestError::MissingFilePath(_) => {
                AuditKind::MissingRequiredField
            }
            IngestError::LockRetryExhausted { .. } => AuditKind::LockRetryExhausted,
            _ => AuditKind::IngestError,
        }
    }
}

#[cfg(test)]
pub(crate) fn busy_error() -> IngestError {
    IngestError::Store(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        Some("database is locked".to_string()),
    ))
}
