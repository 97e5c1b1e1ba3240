// Link records: team@meet, participant@meet, participant-for-team@meet
//
// Each link's full key tuple is its primary key; inserting an existing tuple
// is a no-op, so re-parsing a file never duplicates links.

use rusqlite::{params, Connection};

use crate::error::Result;

/// Returns true when a new link row was written.
pub fn link_meet_team(conn: &Connection, meet_id: i64, team_id: i64) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO meet_teams (meet_id, team_id) VALUES (?1, ?2)",
        params![meet_id, team_id],
    )?;
    Ok(changed > 0)
}

pub fn link_meet_participant(conn: &Connection, meet_id: i64, participant_id: i64) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO meet_participants (meet_id, participant_id) VALUES (?1, ?2)",
        params![meet_id, participant_id],
    )?;
    Ok(changed > 0)
}

pub fn link_meet_team_participant(
    conn: &Connection,
    meet_id: i64,
    team_id: i64,
    participant_id: i64,
) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO meet_team_participants (meet_id, team_id, participant_id)
         VALUES (?1, ?2, ?3)",
        params![meet_id, team_id, participant_id],
    )?;
    Ok(changed > 0)
}

/// Team ids that competed at a meet.
pub fn teams_at_meet(conn: &Connection, meet_id: i64) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT team_id FROM meet_teams WHERE meet_id = ?1 ORDER BY team_id")?;
    let ids = stmt
        .query_map([meet_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Participant ids that appeared at a meet.
pub fn participants_at_meet(conn: &Connection, meet_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT participant_id FROM meet_participants WHERE meet_id = ?1 ORDER BY participant_id",
    )?;
    let ids = stmt
        .query_map([meet_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}
