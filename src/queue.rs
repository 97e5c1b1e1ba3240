// 📋 Parse Queue - persistent per-meet work items
//
//   pending → processing → done
//                        ↘ error
//
// One item per meet. Claiming moves the oldest pending item to processing
// inside an IMMEDIATE transaction, so no other writer can claim it twice.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::entities::MeetLedger;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Done => "done",
            QueueStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<QueueStatus> {
        match s {
            "pending" => Some(QueueStatus::Pending),
            "processing" => Some(QueueStatus::Processing),
            "done" => Some(QueueStatus::Done),
            "error" => Some(QueueStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    pub meet_id: i64,
    pub status: QueueStatus,
    pub attempts: i64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
    pub done: i64,
    pub error: i64,
}

const SELECT_COLUMNS: &str = "SELECT id, meet_id, status, attempts, error FROM parse_queue";

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueItem> {
    let status: String = row.get(2)?;
    Ok(QueueItem {
        id: row.get(0)?,
        meet_id: row.get(1)?,
        // CHECK constraint keeps this to the four known values
        status: QueueStatus::parse(&status).unwrap_or(QueueStatus::Error),
        attempts: row.get(3)?,
        error: row.get(4)?,
    })
}

// ============================================================================
// ENQUEUE
// ============================================================================

/// Queue a meet for parsing. A finished item (done or error) goes back to
/// pending; an item already pending or processing is left alone.
pub fn enqueue(conn: &Connection, meet_id: i64) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO parse_queue (meet_id, status, attempts, created_at, updated_at)
         VALUES (?1, 'pending', 0, ?2, ?2)
         ON CONFLICT(meet_id) DO UPDATE SET
            status = 'pending', error = NULL, updated_at = excluded.updated_at
         WHERE parse_queue.status IN ('done', 'error')",
        params![meet_id, now],
    )?;

    let id = conn.query_row(
        "SELECT id FROM parse_queue WHERE meet_id = ?1",
        [meet_id],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn enqueue_all(conn: &Connection, meet_ids: &[i64]) -> Result<usize> {
    for meet_id in meet_ids {
        enqueue(conn, *meet_id)?;
    }
    Ok(meet_ids.len())
}

/// Queue every downloaded meet that has not been parsed yet.
pub fn enqueue_unparsed(conn: &Connection) -> Result<usize> {
    let count = enqueue_all(conn, &MeetLedger::new(conn).unparsed_downloaded()?)?;
    tracing::info!(count, "Enqueued unparsed meets");
    Ok(count)
}

/// Queue (or requeue) every downloaded meet of a region, parsed ones included.
pub fn enqueue_region(conn: &Connection, region: &str) -> Result<usize> {
    let count = enqueue_all(conn, &MeetLedger::new(conn).downloaded_in_region(region)?)?;
    tracing::info!(count, region, "Enqueued region");
    Ok(count)
}

/// Queue (or requeue) downloaded meets with exactly this name, parsed ones included.
pub fn enqueue_meet_named(conn: &Connection, meet_name: &str) -> Result<usize> {
    let count = enqueue_all(conn, &MeetLedger::new(conn).downloaded_named(meet_name)?)?;
    tracing::info!(count, meet_name, "Enqueued meet by name");
    Ok(count)
}

// ============================================================================
// STATE TRANSITIONS
// ============================================================================

/// Crash recovery: items left in processing by an interrupted run go back to
/// pending. Returns how many were reset.
pub fn reset_stale_processing(conn: &Connection) -> Result<usize> {
    let reset = conn.execute(
        "UPDATE parse_queue SET status = 'pending', updated_at = ?1 WHERE status = 'processing'",
        [Utc::now().to_rfc3339()],
    )?;
    if reset > 0 {
        tracing::warn!(count = reset, "Reset items left in processing by a previous run");
    }
    Ok(reset)
}

/// Move the oldest pending item to processing and count the attempt.
pub fn claim_next(conn: &Connection) -> Result<Option<QueueItem>> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let sql = format!("{} WHERE status = 'pending' ORDER BY id LIMIT 1", SELECT_COLUMNS);
    let Some(mut item) = tx.query_row(&sql, [], row_to_item).optional()? else {
        tx.commit()?;
        return Ok(None);
    };

    tx.execute(
        "UPDATE parse_queue SET status = 'processing', attempts = attempts + 1, updated_at = ?1
         WHERE id = ?2",
        params![Utc::now().to_rfc3339(), item.id],
    )?;
    tx.commit()?;

    item.status = QueueStatus::Processing;
    item.attempts += 1;
    Ok(Some(item))
}

pub fn mark_done(conn: &Connection, item_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE parse_queue SET status = 'done', error = NULL, updated_at = ?1 WHERE id = ?2",
        params![Utc::now().to_rfc3339(), item_id],
    )?;
    Ok(())
}

pub fn mark_error(conn: &Connection, item_id: i64, message: &str) -> Result<()> {
    conn.execute(
        "UPDATE parse_queue SET status = 'error', error = ?1, updated_at = ?2 WHERE id = ?3",
        params![message, Utc::now().to_rfc3339(), item_id],
    )?;
    Ok(())
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn get_item(conn: &Connection, item_id: i64) -> Result<Option<QueueItem>> {
    let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
    Ok(conn.query_row(&sql, [item_id], row_to_item).optional()?)
}

pub fn item_for_meet(conn: &Connection, meet_id: i64) -> Result<Option<QueueItem>> {
    let sql = format!("{} WHERE meet_id = ?1", SELECT_COLUMNS);
    Ok(conn.query_row(&sql, [meet_id], row_to_item).optional()?)
}

pub fn status_counts(conn: &Connection) -> Result<QueueCounts> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM parse_queue GROUP BY status")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

    let mut counts = QueueCounts::default();
    for row in rows {
        let (status, count) = row?;
        match QueueStatus::parse(&status) {
            Some(QueueStatus::Pending) => counts.pending = count,
            Some(QueueStatus::Processing) => counts.processing = count,
            Some(QueueStatus::Done) => counts.done = count,
            Some(QueueStatus::Error) => counts.error = count,
            None => {}
        }
    }
    Ok(counts)
}
