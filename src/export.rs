// 📤 Export - read-only CSV dump of meet rows

use std::path::Path;

use rusqlite::Connection;
use serde::Serialize;

use crate::dates::to_iso;
use crate::entities::{Meet, MeetLedger};
use crate::error::Result;

#[derive(Debug, Serialize)]
struct MeetRow<'a> {
    id: i64,
    region: &'a str,
    meet_name: &'a str,
    meet_date: &'a str,
    meet_start: String,
    meet_end: String,
    meet_year: Option<i32>,
    course: &'a str,
    url: &'a str,
    file_path: &'a str,
    downloaded: bool,
    parsed: bool,
}

impl<'a> From<&'a Meet> for MeetRow<'a> {
    fn from(meet: &'a Meet) -> Self {
        MeetRow {
            id: meet.id,
            region: &meet.region,
            meet_name: &meet.meet_name,
            meet_date: meet.meet_date.as_deref().unwrap_or(""),
            meet_start: meet.meet_start.map(to_iso).unwrap_or_default(),
            meet_end: meet.meet_end.map(to_iso).unwrap_or_default(),
            meet_year: meet.meet_year,
            course: meet.course.as_deref().unwrap_or(""),
            url: meet.url.as_deref().unwrap_or(""),
            file_path: meet.file_path.as_deref().unwrap_or(""),
            downloaded: meet.downloaded,
            parsed: meet.parsed,
        }
    }
}

/// Write every meet to `path` as CSV with a header row. Returns the row count.
pub fn export_meets_csv(conn: &Connection, path: &Path) -> Result<usize> {
    let meets = MeetLedger::new(conn).all()?;

    let mut writer = csv::Writer::from_path(path)?;
    for meet in &meets {
        writer.serialize(MeetRow::from(meet))?;
    }
    writer.flush()?;

    tracing::info!(path = %path.display(), rows = meets.len(), "Exported meets");
    Ok(meets.len())
}
