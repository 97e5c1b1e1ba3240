// ⚙️ Ingest Pipeline - one queue item, end to end
//
//   archive → extract → parse → [resolve + canonicalize in one transaction]
//
// Extraction and parsing touch no store state. All registry writes of an
// attempt share a single IMMEDIATE transaction: either the whole document
// lands or nothing does, so a retried attempt starts clean.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;

use crate::archive::extract_result_document;
use crate::audit::AuditEntry;
use crate::deduplication::{canonicalize, DuplicatePair};
use crate::entities::MeetLedger;
use crate::error::{IngestError, Result};
use crate::parser::parse_lines;
use crate::queue::QueueItem;
use crate::regions::RegionDirectory;
use crate::resolver::{EntityResolver, ResolveStats};

/// Result of processing one item successfully.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub meet_id: i64,
    pub document: PathBuf,
    pub stats: ResolveStats,
    pub duplicates: Vec<DuplicatePair>,
    /// Non-fatal findings to append to the audit log after commit
    #[serde(skip)]
    pub findings: Vec<AuditEntry>,
}

/// Processes one claimed queue item against the store.
///
/// Implementations must leave the store unchanged when they return an error.
pub trait ItemProcessor {
    fn process(&self, conn: &Connection, item: &QueueItem) -> Result<IngestReport>;
}

impl<P: ItemProcessor + ?Sized> ItemProcessor for &P {
    fn process(&self, conn: &Connection, item: &QueueItem) -> Result<IngestReport> {
        (**self).process(conn, item)
    }
}

/// Production processor: reads the meet's archive from disk.
pub struct ArchiveIngestor {
    regions: RegionDirectory,
}

impl ArchiveIngestor {
    pub fn new(regions: RegionDirectory) -> Self {
        ArchiveIngestor { regions }
    }

    pub fn regions(&self) -> &RegionDirectory {
        &self.regions
    }

    /// Ingest the archive at `file_path` into meet `meet_id`.
    pub fn ingest_file(&self, conn: &Connection, meet_id: i64, file_path: &str) -> Result<IngestReport> {
        let mut extracted = extract_result_document(Path::new(file_path))?;
        let mut findings: Vec<AuditEntry> = extracted
            .take_warnings()
            .into_iter()
            .map(|entry| entry.for_meet(meet_id))
            .collect();

        let lines = extracted.read_lines()?;
        let doc = parse_lines(&lines);
        let document_name = extracted
            .path()
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_default();

        let header = doc.meet.as_ref().ok_or_else(|| IngestError::MissingMeetHeader {
            path: PathBuf::from(file_path),
        })?;

        findings.extend(
            doc.warnings
                .iter()
                .map(|warning| warning.to_audit_entry().for_meet(meet_id)),
        );

        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let resolved = EntityResolver::new(&tx, &self.regions).resolve(meet_id, &doc)?;
        let canonical = canonicalize(&tx, meet_id, file_path, header)?;
        tx.commit()?;

        findings.extend(resolved.warnings);
        findings.extend(canonical.findings);

        Ok(IngestReport {
            meet_id,
            document: document_name,
            stats: resolved.stats,
            duplicates: canonical.duplicates,
            findings,
        })
        // `extracted` drops here, removing its working directory
    }
}

impl ItemProcessor for ArchiveIngestor {
    fn process(&self, conn: &Connection, item: &QueueItem) -> Result<IngestReport> {
        let meet = MeetLedger::new(conn)
            .get(item.meet_id)?
            .ok_or(IngestError::MeetNotFound(item.meet_id))?;
        let file_path = meet
            .file_path
            .ok_or(IngestError::MissingFilePath(item.meet_id))?;

        self.ingest_file(conn, meet.id, &file_path)
    }
}
