// 🗄️ Persistent store - SQLite + WAL
//
// One file holds the meet ledger, the global team/participant registries, the
// link tables, the parse queue and the audit log. Uniqueness invariants are
// enforced here, at the storage layer, not only in application code.

use anyhow::Context;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Open (or create) the database file, apply pragmas and the schema.
pub fn open_database(path: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }
    }

    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.busy_timeout(busy_timeout)?;

    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    setup_database(&conn).context("Failed to apply schema")?;

    tracing::debug!(path = %path.display(), "Database ready");
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Meets
    // url       = identity before download
    // file_path = identity once a local copy exists
    // (meet_name, meet_start) = canonical identity after parse, advisory only
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            region TEXT NOT NULL,
            url TEXT UNIQUE,
            file_path TEXT UNIQUE,
            meet_name TEXT NOT NULL,
            meet_date TEXT,
            meet_start TEXT,
            meet_end TEXT,
            meet_year INTEGER,
            course TEXT,
            downloaded INTEGER NOT NULL DEFAULT 0,
            parsed INTEGER NOT NULL DEFAULT 0,
            discovered_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Global registries
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            team_code TEXT NOT NULL,
            team_name TEXT NOT NULL,
            team_type TEXT NOT NULL DEFAULT '',
            region_code TEXT NOT NULL DEFAULT '',
            region TEXT NOT NULL DEFAULT '',
            UNIQUE(team_code, team_name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS participants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            gender TEXT NOT NULL,
            birth_date TEXT,
            registry_number TEXT,
            team_id INTEGER REFERENCES teams(id)
        )",
        [],
    )?;

    // ==========================================================================
    // Link tables (full key tuple is the primary key)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meet_teams (
            meet_id INTEGER NOT NULL REFERENCES meets(id),
            team_id INTEGER NOT NULL REFERENCES teams(id),
            PRIMARY KEY (meet_id, team_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meet_participants (
            meet_id INTEGER NOT NULL REFERENCES meets(id),
            participant_id INTEGER NOT NULL REFERENCES participants(id),
            PRIMARY KEY (meet_id, participant_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meet_team_participants (
            meet_id INTEGER NOT NULL REFERENCES meets(id),
            team_id INTEGER NOT NULL REFERENCES teams(id),
            participant_id INTEGER NOT NULL REFERENCES participants(id),
            PRIMARY KEY (meet_id, team_id, participant_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Parse queue
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS parse_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meet_id INTEGER NOT NULL UNIQUE REFERENCES meets(id),
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'done', 'error')),
            attempts INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Audit log (append-only)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            kind TEXT NOT NULL,
            message TEXT NOT NULL,
            context TEXT,
            meet_id INTEGER REFERENCES meets(id)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_participants_registry
         ON participants(registry_number) WHERE registry_number IS NOT NULL",
        [],
    )?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_participants_identity
         ON participants(first_name, last_name, gender, birth_date)
         WHERE registry_number IS NULL",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meets_canonical ON meets(meet_name, meet_start)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_parse_queue_status ON parse_queue(status)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_meet ON audit_log(meet_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_kind ON audit_log(kind)",
        [],
    )?;

    Ok(())
}

/// Row count of a known table.
pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    const TABLES: [&str; 8] = [
        "meets",
        "teams",
        "participants",
        "meet_teams",
        "meet_participants",
        "meet_team_participants",
        "parse_queue",
        "audit_log",
    ];
    if !TABLES.contains(&table) {
        return Err(crate::error::IngestError::Config(format!(
            "unknown table: {}",
            table
        )));
    }

    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;

    Ok(count)
}

/// Snapshot of registry sizes, used for run reporting and idempotence checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryCounts {
    pub meets: i64,
    pub teams: i64,
    pub participants: i64,
    pub meet_teams: i64,
    pub meet_participants: i64,
    pub meet_team_participants: i64,
}

pub fn registry_counts(conn: &Connection) -> Result<RegistryCounts> {
    Ok(RegistryCounts {
        meets: count_rows(conn, "meets")?,
        teams: count_rows(conn, "teams")?,
        participants: count_rows(conn, "participants")?,
        meet_teams: count_rows(conn, "meet_teams")?,
        meet_participants: count_rows(conn, "meet_participants")?,
        meet_team_participants: count_rows(conn, "meet_team_participants")?,
    })
}
