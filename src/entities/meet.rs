// 🏁 Meet Entity - one scheduled event, identity evolving over its lifecycle
//
//   discovered  → identity is the source URL
//   downloaded  → identity is the local file path
//   parsed      → canonical identity (display name, start date), advisory only
//
// Rows are created on discovery or manual import, mutated on download and on
// parse, and never deleted.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::dates::{from_iso, to_iso};
use crate::error::{IngestError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meet {
    pub id: i64,
    pub region: String,
    pub url: Option<String>,
    pub file_path: Option<String>,
    pub meet_name: String,
    /// Display range, e.g. "07 Mar 2025 - 09 Mar 2025"
    pub meet_date: Option<String>,
    pub meet_start: Option<NaiveDate>,
    pub meet_end: Option<NaiveDate>,
    pub meet_year: Option<i32>,
    pub course: Option<String>,
    pub downloaded: bool,
    pub parsed: bool,
}

impl Meet {
    /// (display name, start date) once parsed.
    pub fn canonical_identity(&self) -> Option<(&str, NaiveDate)> {
        if !self.parsed {
            return None;
        }
        self.meet_start.map(|start| (self.meet_name.as_str(), start))
    }
}

/// Facts taken from a parsed meet header; authoritative over discovery guesses.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMeetFacts {
    pub meet_name: String,
    pub meet_date: String,
    pub meet_start: NaiveDate,
    pub meet_end: NaiveDate,
    pub meet_year: i32,
    pub course: String,
}

/// Candidate produced by the discovery provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredMeet {
    pub region: String,
    pub url: String,
    pub meet_name: String,
    pub meet_date: Option<String>,
    pub meet_year: Option<i32>,
}

const SELECT_COLUMNS: &str = "SELECT id, region, url, file_path, meet_name, meet_date, meet_start,
        meet_end, meet_year, course, downloaded, parsed FROM meets";

pub struct MeetLedger<'c> {
    conn: &'c Connection,
}

impl<'c> MeetLedger<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        MeetLedger { conn }
    }

    fn query_one(&self, filter: &str, value: &dyn rusqlite::ToSql) -> Result<Option<Meet>> {
        let sql = format!("{} WHERE {} = ?1", SELECT_COLUMNS, filter);
        let meet = self
            .conn
            .query_row(&sql, [value], row_to_meet)
            .optional()?;
        Ok(meet)
    }

    pub fn get(&self, id: i64) -> Result<Option<Meet>> {
        self.query_one("id", &id)
    }

    pub fn find_by_url(&self, url: &str) -> Result<Option<Meet>> {
        self.query_one("url", &url)
    }

    pub fn find_by_file_path(&self, file_path: &str) -> Result<Option<Meet>> {
        self.query_one("file_path", &file_path)
    }

    pub fn all(&self) -> Result<Vec<Meet>> {
        let sql = format!("{} ORDER BY region, meet_start, id", SELECT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let meets = stmt
            .query_map([], row_to_meet)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(meets)
    }

    /// Upsert keyed by URL. Guessed name/date/year only apply while unparsed.
    pub fn upsert_discovered(&self, meet: &DiscoveredMeet) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO meets (region, url, meet_name, meet_date, meet_year, discovered_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(url) DO UPDATE SET
                region = excluded.region,
                meet_name = CASE WHEN meets.parsed THEN meets.meet_name ELSE excluded.meet_name END,
                meet_date = CASE WHEN meets.parsed THEN meets.meet_date
                                 ELSE COALESCE(excluded.meet_date, meets.meet_date) END,
                meet_year = CASE WHEN meets.parsed THEN meets.meet_year
                                 ELSE COALESCE(excluded.meet_year, meets.meet_year) END,
                updated_at = excluded.updated_at",
            params![
                meet.region,
                meet.url,
                meet.meet_name,
                meet.meet_date,
                meet.meet_year,
                now
            ],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM meets WHERE url = ?1",
            [&meet.url],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Record a local copy for the meet and mark it downloaded. A path is
    /// owned by one meet only.
    pub fn set_downloaded(&self, id: i64, file_path: &str) -> Result<()> {
        if let Some(owner) = self.find_by_file_path(file_path)? {
            if owner.id != id {
                return Err(IngestError::FilePathInUse {
                    file_path: file_path.to_string(),
                    meet_id: id,
                    existing_meet_id: owner.id,
                });
            }
        }

        self.conn.execute(
            "UPDATE meets SET file_path = ?1, downloaded = 1, updated_at = ?2 WHERE id = ?3",
            params![file_path, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Placeholder for a manually imported archive, keyed by file path.
    pub fn insert_placeholder(
        &self,
        region: &str,
        file_path: &str,
        meet_name: &str,
        meet_year: Option<i32>,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO meets (region, file_path, meet_name, meet_year, downloaded, parsed,
                                discovered_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, 0, ?5, ?5)
             ON CONFLICT(file_path) DO NOTHING",
            params![region, file_path, meet_name, meet_year, now],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM meets WHERE file_path = ?1",
            [file_path],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Overwrite the meet at `file_path` with parsed facts and mark it parsed.
    /// Returns false when no row has that path.
    pub fn apply_parsed(&self, file_path: &str, facts: &ParsedMeetFacts) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE meets SET
                meet_name = ?1, meet_date = ?2, meet_start = ?3, meet_end = ?4,
                meet_year = ?5, course = ?6, parsed = 1, updated_at = ?7
             WHERE file_path = ?8",
            params![
                facts.meet_name,
                facts.meet_date,
                to_iso(facts.meet_start),
                to_iso(facts.meet_end),
                facts.meet_year,
                facts.course,
                Utc::now().to_rfc3339(),
                file_path
            ],
        )?;
        Ok(changed > 0)
    }

    /// Other meets already carrying this canonical identity.
    pub fn find_canonical_matches(
        &self,
        meet_name: &str,
        meet_start: NaiveDate,
        excluding_id: i64,
    ) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM meets
             WHERE meet_name = ?1 AND meet_start = ?2 AND id != ?3
             ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![meet_name, to_iso(meet_start), excluding_id], |row| {
                row.get(0)
            })?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn downloaded_ids(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT id FROM meets
             WHERE downloaded = 1 AND file_path IS NOT NULL AND {}
             ORDER BY id",
            filter
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map(args, |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Downloaded meets still waiting to be parsed.
    pub fn unparsed_downloaded(&self) -> Result<Vec<i64>> {
        self.downloaded_ids("parsed = 0", &[])
    }

    /// Downloaded meets of one region label, parsed or not.
    pub fn downloaded_in_region(&self, region: &str) -> Result<Vec<i64>> {
        self.downloaded_ids("region = ?1", &[&region as &dyn rusqlite::ToSql])
    }

    /// Downloaded meets with exactly this display name, parsed or not.
    pub fn downloaded_named(&self, meet_name: &str) -> Result<Vec<i64>> {
        self.downloaded_ids("meet_name = ?1", &[&meet_name as &dyn rusqlite::ToSql])
    }
}

fn row_to_meet(row: &rusqlite::Row<'_>) -> rusqlite::Result<Meet> {
    let meet_start: Option<String> = row.get(6)?;
    let meet_end: Option<String> = row.get(7)?;
    Ok(Meet {
        id: row.get(0)?,
        region: row.get(1)?,
        url: row.get(2)?,
        file_path: row.get(3)?,
        meet_name: row.get(4)?,
        meet_date: row.get(5)?,
        meet_start: meet_start.as_deref().and_then(from_iso),
        meet_end: meet_end.as_deref().and_then(from_iso),
        meet_year: row.get(8)?,
        course: row.get(9)?,
        downloaded: row.get(10)?,
        parsed: row.get(11)?,
    })
}
