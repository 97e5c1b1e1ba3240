// 📒 Audit Log - append-only structured error/warning sink
//
// Entries are never updated or deleted. Writing is best-effort from the
// pipeline's point of view: `record` swallows store failures after reporting
// them through tracing, so a broken audit table never fails a parse.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================================================
// AUDIT KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditKind {
    /// Archive could not be opened or extracted
    ArchiveUnreadable,

    /// Archive holds no result document
    MissingResultDocument,

    /// Archive holds more than one result document (first one used)
    MultipleResultDocuments,

    /// Required field absent (meet header, local file path)
    MissingRequiredField,

    /// Malformed or out-of-context record line, skipped
    FormatWarning,

    /// Gap in otherwise valid data (unknown region, blank gender/name)
    DataQualityWarning,

    /// Store stayed busy past the retry ceiling
    LockRetryExhausted,

    /// Two meets share the same canonical identity
    DuplicateMeet,

    /// Anything else that failed an item
    IngestError,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::ArchiveUnreadable => "ArchiveUnreadable",
            AuditKind::MissingResultDocument => "MissingResultDocument",
            AuditKind::MultipleResultDocuments => "MultipleResultDocuments",
            AuditKind::MissingRequiredField => "MissingRequiredField",
            AuditKind::FormatWarning => "FormatWarning",
            AuditKind::DataQualityWarning => "DataQualityWarning",
            AuditKind::LockRetryExhausted => "LockRetryExhausted",
            AuditKind::DuplicateMeet => "DuplicateMeet",
            AuditKind::IngestError => "IngestError",
        }
    }

    pub fn parse(s: &str) -> Option<AuditKind> {
        let kind = match s {
            "ArchiveUnreadable" => AuditKind::ArchiveUnreadable,
            "MissingResultDocument" => AuditKind::MissingResultDocument,
            "MultipleResultDocuments" => AuditKind::MultipleResultDocuments,
            "MissingRequiredField" => AuditKind::MissingRequiredField,
            "FormatWarning" => AuditKind::FormatWarning,
            "DataQualityWarning" => AuditKind::DataQualityWarning,
            "LockRetryExhausted" => AuditKind::LockRetryExhausted,
            "DuplicateMeet" => AuditKind::DuplicateMeet,
            "IngestError" => AuditKind::IngestError,
            _ => return None,
        };
        Some(kind)
    }
}

// ============================================================================
// AUDIT ENTRY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    pub message: String,
    pub context: Option<serde_json::Value>,
    pub meet_id: Option<i64>,
}

impl AuditEntry {
    pub fn new(kind: AuditKind, message: impl Into<String>) -> Self {
        AuditEntry {
            entry_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            message: message.into(),
            context: None,
            meet_id: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn for_meet(mut self, meet_id: i64) -> Self {
        self.meet_id = Some(meet_id);
        self
    }
}

// ============================================================================
// SINK
// ============================================================================

/// Append one entry. Errors propagate; use `record` from the pipeline.
pub fn append(conn: &Connection, entry: &AuditEntry) -> Result<()> {
    let context_json = entry
        .context
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO audit_log (entry_id, timestamp, kind, message, context, meet_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.entry_id,
            entry.timestamp.to_rfc3339(),
            entry.kind.as_str(),
            entry.message,
            context_json,
            entry.meet_id,
        ],
    )?;

    Ok(())
}

/// Best-effort append. A failed write is surfaced via tracing and dropped.
pub fn record(conn: &Connection, entry: &AuditEntry) -> bool {
    match append(conn, entry) {
        Ok(()) => true,
        Err(err) => {
            tracing::error!(
                kind = entry.kind.as_str(),
                meet_id = ?entry.meet_id,
                message = %entry.message,
                error = %err,
                "Failed to write audit entry"
            );
            false
        }
    }
}

/// Best-effort append of a batch; returns how many entries were written.
pub fn record_all(conn: &Connection, entries: &[AuditEntry]) -> usize {
    entries.iter().filter(|entry| record(conn, entry)).count()
}

fn query_entries(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map(args, |row| {
            let timestamp_str: String = row.get(1)?;
            let kind_str: String = row.get(2)?;
            let context_json: Option<String> = row.get(4)?;

            Ok(AuditEntry {
                entry_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                kind: AuditKind::parse(&kind_str).unwrap_or(AuditKind::IngestError),
                message: row.get(3)?,
                context: context_json.and_then(|s| serde_json::from_str(&s).ok()),
                meet_id: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Entries referencing a meet, oldest first.
pub fn entries_for_meet(conn: &Connection, meet_id: i64) -> Result<Vec<AuditEntry>> {
    query_entries(
        conn,
        "SELECT entry_id, timestamp, kind, message, context, meet_id
         FROM audit_log WHERE meet_id = ?1 ORDER BY id",
        &[&meet_id as &dyn rusqlite::ToSql],
    )
}

/// Entries of one kind, oldest first.
pub fn entries_by_kind(conn: &Connection, kind: AuditKind) -> Result<Vec<AuditEntry>> {
    query_entries(
        conn,
        "SELECT entry_id, timestamp, kind, message, context, meet_id
         FROM audit_log WHERE kind = ?1 ORDER BY id",
        &[&kind.as_str() as &dyn rusqlite::ToSql],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    #[test]
    fn test_append_and_query() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let entry = AuditEntry::new(AuditKind::FormatWarning, "line 4: bad date token")
            .with_context(serde_json::json!({"line": 4}));
        append(&conn, &entry).unwrap();

        let found = entries_by_kind(&conn, AuditKind::FormatWarning).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entry_id, entry.entry_id);
        assert_eq!(found[0].context, Some(serde_json::json!({"line": 4})));
        assert_eq!(found[0].meet_id, None);
    }

    #[test]
    fn test_record_swallows_store_failure() {
        // No schema: the insert fails, record reports false instead of erroring
        let conn = Connection::open_in_memory().unwrap();
        let entry = AuditEntry::new(AuditKind::DuplicateMeet, "dup");
        assert!(!record(&conn, &entry));
    }

    #[test]
    fn test_kind_round_trips_through_tag() {
        for kind in [
            AuditKind::ArchiveUnreadable,
            AuditKind::MissingResultDocument,
            AuditKind::LockRetryExhausted,
            AuditKind::DuplicateMeet,
        ] {
            assert_eq!(AuditKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AuditKind::parse("Nope"), None);
    }
}
