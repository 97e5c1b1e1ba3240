// 🔍 Meet Upsert & Canonicalizer - apply parsed facts, flag canonical duplicates
//
// The archive is authoritative: a parsed meet header overwrites whatever the
// discovery stage guessed. Canonical identity (display name, start date) is
// advisory. A collision is reported as a DuplicateMeet audit entry naming
// both rows; the rows themselves are never merged.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEntry, AuditKind};
use crate::dates::{display_range, to_iso, year_of};
use crate::entities::{MeetLedger, ParsedMeetFacts};
use crate::error::{IngestError, Result};
use crate::parser::MeetHeader;

// ============================================================================
// DUPLICATE PAIR
// ============================================================================

/// Two meet rows sharing one canonical identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicatePair {
    pub existing_meet_id: i64,
    pub new_meet_id: i64,
}

impl DuplicatePair {
    fn to_audit_entry(&self, facts: &ParsedMeetFacts) -> AuditEntry {
        AuditEntry::new(
            AuditKind::DuplicateMeet,
            format!(
                "meet {} has the same name and start date as meet {}: '{}' on {}",
                self.new_meet_id,
                self.existing_meet_id,
                facts.meet_name,
                to_iso(facts.meet_start)
            ),
        )
        .with_context(serde_json::json!({
            "existing_meet_id": self.existing_meet_id,
            "new_meet_id": self.new_meet_id,
            "meet_name": facts.meet_name,
            "meet_start": to_iso(facts.meet_start),
        }))
        .for_meet(self.new_meet_id)
    }
}

/// Whether a DuplicateMeet entry already names this pair, in either order.
fn pair_already_reported(conn: &Connection, a: i64, b: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM audit_log
         WHERE kind = ?1
           AND ((json_extract(context, '$.existing_meet_id') = ?2
                 AND json_extract(context, '$.new_meet_id') = ?3)
             OR (json_extract(context, '$.existing_meet_id') = ?3
                 AND json_extract(context, '$.new_meet_id') = ?2))",
        rusqlite::params![AuditKind::DuplicateMeet.as_str(), a, b],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ============================================================================
// CANONICALIZER
// ============================================================================

/// Facts to write for a parsed header.
pub fn facts_from_header(header: &MeetHeader) -> ParsedMeetFacts {
    ParsedMeetFacts {
        meet_name: header.name.clone(),
        meet_date: display_range(header.start, header.end),
        meet_start: header.start,
        meet_end: header.end,
        meet_year: year_of(header.start),
        course: header.course_code.clone(),
    }
}

#[derive(Debug, Clone)]
pub struct CanonicalOutcome {
    pub facts: ParsedMeetFacts,
    pub duplicates: Vec<DuplicatePair>,
    /// DuplicateMeet entries not yet in the audit log
    pub findings: Vec<AuditEntry>,
}

/// Check `meet_id`'s new canonical identity against every other meet, then
/// overwrite the row at `file_path` with the parsed header.
pub fn canonicalize(
    conn: &Connection,
    meet_id: i64,
    file_path: &str,
    header: &MeetHeader,
) -> Result<CanonicalOutcome> {
    let ledger = MeetLedger::new(conn);
    let facts = facts_from_header(header);

    let mut duplicates = Vec::new();
    let mut findings = Vec::new();
    for existing_meet_id in ledger.find_canonical_matches(&facts.meet_name, facts.meet_start, meet_id)? {
        let pair = DuplicatePair {
            existing_meet_id,
            new_meet_id: meet_id,
        };
        tracing::warn!(
            meet_id,
            existing_meet_id,
            meet_name = %facts.meet_name,
            "Canonical meet identity collision"
        );
        if !pair_already_reported(conn, existing_meet_id, meet_id)? {
            findings.push(pair.to_audit_entry(&facts));
        }
        duplicates.push(pair);
    }

    if !ledger.apply_parsed(file_path, &facts)? {
        return Err(IngestError::MeetNotFound(meet_id));
    }

    Ok(CanonicalOutcome {
        facts,
        duplicates,
        findings,
    })
}
