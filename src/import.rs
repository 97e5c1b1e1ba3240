// 📥 Import - where meets enter the ledger
//
// Three doors, each idempotent on its identity key:
// - discovery: a candidate keyed by source URL
// - download: the URL's row gains a local file path
// - manual import: an external archive copied into the managed layout,
//   keyed by file path from the start

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Serialize;

use crate::dates::{clean_stem, extract_date_token};
use crate::entities::{DiscoveredMeet, MeetLedger};
use crate::error::{IngestError, Result};
use crate::queue::enqueue;

/// Upsert a discovered meet by URL. Returns the meet id.
pub fn record_discovered(conn: &Connection, meet: &DiscoveredMeet) -> Result<i64> {
    let id = MeetLedger::new(conn).upsert_discovered(meet)?;
    tracing::debug!(meet_id = id, url = %meet.url, "Recorded discovered meet");
    Ok(id)
}

/// Register the local copy of a discovered meet and queue it for parsing.
pub fn record_download(conn: &Connection, url: &str, file_path: &str) -> Result<i64> {
    let ledger = MeetLedger::new(conn);
    let meet = ledger
        .find_by_url(url)?
        .ok_or_else(|| IngestError::UnknownUrl(url.to_string()))?;

    if meet.parsed && meet.file_path.as_deref() == Some(file_path) {
        tracing::debug!(meet_id = meet.id, "Download already parsed, not requeued");
        return Ok(meet.id);
    }

    ledger.set_downloaded(meet.id, file_path)?;
    enqueue(conn, meet.id)?;
    tracing::info!(meet_id = meet.id, path = file_path, "Recorded download");
    Ok(meet.id)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportedArchive {
    pub meet_id: i64,
    pub queue_item_id: i64,
    pub file_path: PathBuf,
}

/// Copy `source` to `results_dir/<region>/<file name>`, create a placeholder
/// meet for it and queue it.
pub fn import_archive(
    conn: &Connection,
    source: &Path,
    results_dir: &Path,
    region: &str,
) -> Result<ImportedArchive> {
    let file_name = source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::ArchiveUnreadable {
            path: source.to_path_buf(),
            reason: "no usable file name".to_string(),
        })?;

    let target_dir = results_dir.join(region);
    std::fs::create_dir_all(&target_dir)?;
    let target = target_dir.join(file_name);

    let same_file = match (source.canonicalize(), target.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if !same_file {
        std::fs::copy(source, &target)?;
    }

    let meet_name = clean_stem(file_name);
    let meet_year = extract_date_token(&meet_name).map(|(_, year)| year);
    let file_path = target.to_string_lossy().to_string();

    let meet_id = MeetLedger::new(conn).insert_placeholder(region, &file_path, &meet_name, meet_year)?;
    let queue_item_id = enqueue(conn, meet_id)?;

    tracing::info!(meet_id, path = %file_path, "Imported archive");
    Ok(ImportedArchive {
        meet_id,
        queue_item_id,
        file_path: target,
    })
}
